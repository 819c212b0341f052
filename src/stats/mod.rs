//! Session statistics for the trust console.
//!
//! Counters describe what the synchronizer and its sources did during the
//! current session: how many pulls succeeded or failed, how many live events
//! were applied or dropped, and how often the push channel reconnected.

pub mod counters;

pub use counters::{create_shared_stats, SharedSyncStats, SyncStats, SyncStatsSnapshot};
