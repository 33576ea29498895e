//! Store module
//!
//! Contains domain models and repository ports. Repositories are the only
//! shared mutable state in the system; each aggregate gets a trait port and
//! an in-memory implementation guarded by `tokio::sync::RwLock`.

pub mod event_models;
pub mod event_repos;
pub mod reward_models;
pub mod reward_repos;
pub mod rule_models;
pub mod rule_repos;
pub mod user_models;
pub mod user_repos;
pub mod wallet_models;
pub mod wallet_repos;
