//! mint-trending crate
//!
//! Windowed aggregation of qualifying mints, ranking with history-based
//! deduplication, and the cycle driver that ties the pipeline together.

pub mod cycle;
pub mod trending;

pub use cycle::{build_payload, CycleDriver, CyclePhase, CycleReport, CycleState};
pub use trending::{CandidateContract, History, TrendingEntry, TrendingWindow, HISTORY_KEY};
