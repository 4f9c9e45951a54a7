//! DataWatch - background directory-size telemetry and resource liveness
//!
//! This library measures on-disk storage directories, pushes the sizes to a
//! remote time-series sink on a self-scheduling timer, and keeps an "active"
//! resource selected from the set of databases that are online with data.

pub mod app;
pub mod cli;
pub mod collector;
pub mod config;
pub mod control;
pub mod core;
pub mod discovery;
pub mod error;
pub mod health;
pub mod internal_metrics;
pub mod line_protocol;
pub mod settings;
pub mod size;
pub mod task_manager;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export core types for convenience
pub use core::*;
