//! Core functionality for the onewired daemon.
//!
//! This module contains:
//! - Sample types passed between pipeline stages
//! - Location aggregation with outlier rejection
//! - Bounded per-location rolling history

pub mod aggregate;
pub mod history;
pub mod sample;

// Re-export commonly used types
pub use aggregate::{normalize, AggregateOutcome, Aggregator, OUTLIER_TOLERANCE};
pub use history::{
    HistoryError, HistoryPoint, HistoryRegistry, HistorySettings, LocationHistory, SharedHistory,
};
pub use sample::{LocationMap, NormalizedSample, RawSample, Readings};
