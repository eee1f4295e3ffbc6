//! Recommendation Service Library
//!
//! Computes, evaluates and caches product recommendations per user.
//! External models are reached through an inference process; an in-process
//! heuristic scorer covers every model that is disabled or failing.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{RecomputeOrchestrator, RecomputeOutcome};
