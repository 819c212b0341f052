//! Core trust state for the console.
//!
//! This module contains:
//! - Data types for scores, timelines and change events
//! - The synchronizer that merges snapshot, timeline and live inputs
//! - Pure projections of that state for display

pub mod projection;
pub mod synchronizer;
pub mod types;

// Re-export commonly used types
pub use projection::{RankingRow, TrustView, DEFAULT_WINDOW_LIMIT};
pub use synchronizer::{
    ChangeCause, SharedTrustState, StateChange, SyncLimits, TimelineOutcome, TrustSynchronizer,
    DEFAULT_ACTIVITY_CAPACITY, DEFAULT_TIMELINE_CAPACITY,
};
pub use types::{
    AgentId, ChangeEvent, ScoreMap, Timeline, TimelinePoint, TimelineResponse, TrustScore,
};
