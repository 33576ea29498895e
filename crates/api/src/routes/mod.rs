//! HTTP route modules
//!
//! Thin adapters mapping requests to core operations. Each module exposes a
//! `router()` assembled under `/api` by `api::router()`.

pub mod api;
pub mod events;
pub mod health;
pub mod leaderboards;
pub mod rules;
pub mod users;
pub mod wallets;
