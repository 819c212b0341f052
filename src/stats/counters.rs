//! Lock-free sync counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Counters for the current console session.
#[derive(Debug)]
pub struct SyncStats {
    /// Identifier attached to this session's log lines
    session_id: Uuid,
    snapshots_applied: AtomicU64,
    snapshot_failures: AtomicU64,
    timelines_applied: AtomicU64,
    timeline_failures: AtomicU64,
    /// Timeline responses dropped because the selection moved on
    timelines_stale: AtomicU64,
    events_applied: AtomicU64,
    /// Push messages that could not be decoded
    messages_dropped: AtomicU64,
    connections_opened: AtomicU64,
    reconnect_attempts: AtomicU64,
    session_start: DateTime<Utc>,
}

impl SyncStats {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            snapshots_applied: AtomicU64::new(0),
            snapshot_failures: AtomicU64::new(0),
            timelines_applied: AtomicU64::new(0),
            timeline_failures: AtomicU64::new(0),
            timelines_stale: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            session_start: Utc::now(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn record_snapshot_applied(&self) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot_failure(&self) {
        self.snapshot_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeline_applied(&self) {
        self.timelines_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeline_failure(&self) {
        self.timeline_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeline_stale(&self) {
        self.timelines_stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            session_id: self.session_id,
            snapshots_applied: self.snapshots_applied.load(Ordering::Relaxed),
            snapshot_failures: self.snapshot_failures.load(Ordering::Relaxed),
            timelines_applied: self.timelines_applied.load(Ordering::Relaxed),
            timeline_failures: self.timeline_failures.load(Ordering::Relaxed),
            timelines_stale: self.timelines_stale.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics ({}):\n\
             - Snapshots applied: {} ({} failed)\n\
             - Timelines applied: {} ({} failed, {} stale)\n\
             - Live events applied: {}\n\
             - Live messages dropped: {}\n\
             - Connections opened: {} ({} reconnect attempts)\n\
             - Session duration: {} seconds",
            stats.session_id,
            stats.snapshots_applied,
            stats.snapshot_failures,
            stats.timelines_applied,
            stats.timeline_failures,
            stats.timelines_stale,
            stats.events_applied,
            stats.messages_dropped,
            stats.connections_opened,
            stats.reconnect_attempts,
            stats.session_duration_secs
        )
    }
}

impl Default for SyncStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatsSnapshot {
    pub session_id: Uuid,
    pub snapshots_applied: u64,
    pub snapshot_failures: u64,
    pub timelines_applied: u64,
    pub timeline_failures: u64,
    pub timelines_stale: u64,
    pub events_applied: u64,
    pub messages_dropped: u64,
    pub connections_opened: u64,
    pub reconnect_attempts: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Thread-safe shared stats.
pub type SharedSyncStats = Arc<SyncStats>;

pub fn create_shared_stats() -> SharedSyncStats {
    Arc::new(SyncStats::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = SyncStats::new();

        stats.record_snapshot_applied();
        stats.record_snapshot_applied();
        stats.record_snapshot_failure();
        stats.record_message_dropped();

        let snapshot = stats.stats();
        assert_eq!(snapshot.snapshots_applied, 2);
        assert_eq!(snapshot.snapshot_failures, 1);
        assert_eq!(snapshot.messages_dropped, 1);
        assert_eq!(snapshot.events_applied, 0);
    }

    #[test]
    fn test_summary_format() {
        let stats = SyncStats::new();
        stats.record_timeline_stale();
        let summary = stats.summary();

        assert!(summary.contains("Snapshots applied"));
        assert!(summary.contains("1 stale"));
        assert!(summary.contains(&stats.session_id().to_string()));
    }
}
