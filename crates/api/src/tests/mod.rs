//! Test modules

mod helpers;



#[cfg(test)]
mod pipeline_tests;



#[cfg(test)]
mod wallet_api_tests;
