//! Shared utilities

pub mod rate_limit;
pub mod scheduler;
pub mod time;
