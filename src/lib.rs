// Core modules
pub mod config;
pub mod engine;
pub mod errors;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod risk;
pub mod venue;

// Re-export commonly used types
pub use config::{LadderConfig, OverlapPolicy, TimingConfig};
pub use engine::{CycleReport, Scheduler, SchedulerSnapshot, SchedulerStatus};
pub use errors::{ConfigError, VenueError};
pub use models::*;
pub use venue::{PaperVenue, PaperVenueConfig, VenueAdapter};
