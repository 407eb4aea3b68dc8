// Decision cycle and its schedule
pub mod cycle;
pub mod scheduler;

use serde::Serialize;

pub use cycle::{run_cycle, CycleError, CycleReport};
pub use scheduler::{Scheduler, SchedulerSnapshot, SchedulerStatus};

/// Mutable state carried from one cycle to the next
///
/// In memory only; a restarted process begins from the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleState {
    /// Cycles started since the last `start()`
    pub loop_counter: u64,
    /// Last ATR actually observed
    pub previous_atr: Option<f64>,
    pub running: bool,
}
