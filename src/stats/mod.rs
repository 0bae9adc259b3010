//! Pipeline activity counters.
//!
//! Every stage records what it did here so the query service and the
//! shutdown summary can report it without touching the pipeline itself.

pub mod counters;

// Re-export commonly used types
pub use counters::{create_shared_stats, PipelineStats, SharedStats, StatsSnapshot};
