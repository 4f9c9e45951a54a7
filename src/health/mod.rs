//! Resource liveness: the SQL health probe, the status map, and the
//! reconciliation loop that keeps an eligible resource active.

pub mod monitor;
pub mod probe;
pub mod status;

pub use monitor::{LivenessMonitor, LivenessSnapshot};
pub use probe::SqlHealthProbe;
pub use status::{select_active, StatusMap};
