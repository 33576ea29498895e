//! Engine module
//!
//! The asynchronous event-to-reward pipeline and the leaderboard engine:
//! bounded ingestion queue, background processor, condition evaluator, rule
//! engine, reward applier, dry-run sandbox, and leaderboard aggregation.

pub mod conditions;
pub mod leaderboard;
pub mod processor;
pub mod queue;
pub mod rewards;
pub mod rules;
pub mod sandbox;
