//! Queue engine: the service façade, its statistics, and the stale-claim
//! reaper.

pub mod reaper;
pub mod service;
pub mod stats;

pub use reaper::ReaperHandle;
pub use service::QueueService;
pub use stats::{PriorityBand, PriorityBands, QueueStats, StatsReport, ThroughputTracker};
