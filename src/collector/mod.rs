//! The background directory-size collector.
//!
//! A [`cycle::DirectorySizeCycle`] performs one measurement and write; the
//! [`supervisor::CollectorSupervisor`] owns the single timer that repeats it.

pub mod cycle;
pub mod supervisor;

use serde::{Deserialize, Serialize};

pub use cycle::{CollectionCycle, CycleOutcome, DirectorySizeCycle};
pub use supervisor::{
    ControlAction, ControlRequest, ControlResponse, CollectorSupervisor, SupervisorStatus,
    TimerRegistry,
};

/// What the timer does after a tick was skipped because configuration was
/// incomplete or no data directory was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SkipPolicy {
    /// Keep the timer armed; the next tick retries.
    #[default]
    Continue,
    /// Stop the collector until it is started again.
    Stop,
}
