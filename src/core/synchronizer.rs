//! Canonical trust state and the rules for merging the three input sources.
//!
//! Two rules govern every mutation:
//!
//! - **Last writer wins by arrival.** A score for an agent is replaced by
//!   whichever update reaches the synchronizer later, whether it came from a
//!   snapshot or from a live event. Snapshots never remove agents.
//! - **Selection staleness.** A pulled timeline is applied only if it was
//!   requested for the agent that is still selected when it arrives.
//!
//! [`TrustSynchronizer`] is the plain state machine. [`SharedTrustState`] is
//! the handle the rest of the crate holds: it serializes mutations behind a
//! lock and notifies observers after each one.

use super::projection::{self, RankingRow, TrustView};
use super::types::{AgentId, ChangeEvent, ScoreMap, TimelinePoint, TrustScore};
use crate::stats::SharedSyncStats;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::watch;

/// Default number of points kept in the backing timeline buffer.
pub const DEFAULT_TIMELINE_CAPACITY: usize = 500;

/// Default number of live events kept in the activity feed.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 50;

/// What caused the most recent state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeCause {
    /// Initial state, nothing applied yet
    Initial,
    Snapshot { agents: usize },
    Timeline { agent: AgentId, points: usize },
    Event { agent: AgentId },
    Selection { agent: AgentId },
}

/// Notification sent to observers after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub revision: u64,
    pub cause: ChangeCause,
}

/// Result of offering a pulled timeline to the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineOutcome {
    Applied,
    /// The response was for an agent that is no longer selected.
    Stale,
}

/// Buffer sizes for the synchronizer.
#[derive(Debug, Clone, Copy)]
pub struct SyncLimits {
    pub timeline_capacity: usize,
    pub activity_capacity: usize,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            timeline_capacity: DEFAULT_TIMELINE_CAPACITY,
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
        }
    }
}

/// Canonical view model: scores, the selected agent, its timeline buffer and
/// a feed of recent live events.
#[derive(Debug)]
pub struct TrustSynchronizer {
    scores: ScoreMap,
    selected: Option<AgentId>,
    /// Owner of `timeline`. Lags behind `selected` until the next timeline
    /// pull for the new selection completes.
    timeline_agent: Option<AgentId>,
    timeline: Vec<TimelinePoint>,
    activity: VecDeque<ChangeEvent>,
    limits: SyncLimits,
    revision: u64,
}

impl TrustSynchronizer {
    pub fn new(limits: SyncLimits) -> Self {
        Self {
            scores: ScoreMap::new(),
            selected: None,
            timeline_agent: None,
            timeline: Vec::new(),
            activity: VecDeque::new(),
            limits,
            revision: 0,
        }
    }

    /// Merge a full score snapshot.
    ///
    /// Every agent named in the snapshot is overwritten; agents missing from
    /// it are kept, since they may only be known from live events so far.
    /// With nothing selected, the top-ranked agent becomes the selection.
    pub fn apply_snapshot(&mut self, snapshot: &ScoreMap) -> ChangeCause {
        for (agent, score) in snapshot.iter() {
            self.scores.upsert(agent, score);
        }

        if self.selected.is_none() {
            self.selected = projection::rank(&self.scores)
                .into_iter()
                .next()
                .map(|row| row.agent);
        }

        self.revision += 1;
        ChangeCause::Snapshot {
            agents: snapshot.len(),
        }
    }

    /// Replace the timeline buffer with `points`, pulled for `agent`.
    ///
    /// `agent` must be the selection captured when the request was issued.
    /// If the operator has selected someone else since, the response is
    /// dropped.
    pub fn apply_timeline(&mut self, agent: &str, points: Vec<TimelinePoint>) -> TimelineOutcome {
        if self.selected.as_deref() != Some(agent) {
            return TimelineOutcome::Stale;
        }

        self.timeline = points;
        self.trim_timeline();
        self.timeline_agent = Some(agent.to_string());
        self.revision += 1;
        TimelineOutcome::Applied
    }

    /// Apply one live change event.
    ///
    /// Returns `false` without touching state if the event carries no
    /// absolute score.
    pub fn apply_change_event(&mut self, event: &ChangeEvent) -> bool {
        let Some(point) = event.timeline_point() else {
            return false;
        };

        self.scores.upsert(event.agent.as_str(), point.trust);

        if self.selected.is_none() {
            self.selected = Some(event.agent.clone());
        }

        if self.selected.as_deref() == Some(event.agent.as_str()) {
            // The buffer may still hold a previous selection's history.
            if self.timeline_agent.as_deref() != Some(event.agent.as_str()) {
                self.timeline.clear();
                self.timeline_agent = Some(event.agent.clone());
            }
            self.timeline.push(point);
            self.trim_timeline();
        }

        self.activity.push_back(event.clone());
        while self.activity.len() > self.limits.activity_capacity {
            self.activity.pop_front();
        }

        self.revision += 1;
        true
    }

    /// Select `agent`. The timeline buffer is left alone until the next
    /// timeline pull for the new selection replaces it.
    pub fn select_agent(&mut self, agent: impl Into<AgentId>) {
        self.selected = Some(agent.into());
        self.revision += 1;
    }

    pub fn current_ranking(&self) -> Vec<RankingRow> {
        projection::rank(&self.scores)
    }

    /// The last `limit` buffered points, most recent first. Empty when no
    /// agent is selected.
    pub fn current_window(&self, limit: usize) -> Vec<TimelinePoint> {
        if self.selected.is_none() {
            return Vec::new();
        }
        projection::recent_window(&self.timeline, limit)
    }

    pub fn view(&self, limit: usize) -> TrustView {
        TrustView {
            revision: self.revision,
            ranking: self.current_ranking(),
            selected: self.selected.clone(),
            window_agent: self.timeline_agent.clone(),
            window: self.current_window(limit),
        }
    }

    pub fn selected_agent(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn timeline_agent(&self) -> Option<&str> {
        self.timeline_agent.as_deref()
    }

    pub fn score_of(&self, agent: &str) -> Option<TrustScore> {
        self.scores.get(agent)
    }

    pub fn scores(&self) -> &ScoreMap {
        &self.scores
    }

    /// Up to `limit` most recent live events, newest first.
    pub fn recent_activity(&self, limit: usize) -> Vec<ChangeEvent> {
        self.activity.iter().rev().take(limit).cloned().collect()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn trim_timeline(&mut self) {
        let excess = self
            .timeline
            .len()
            .saturating_sub(self.limits.timeline_capacity);
        if excess > 0 {
            self.timeline.drain(..excess);
        }
    }
}

impl Default for TrustSynchronizer {
    fn default() -> Self {
        Self::new(SyncLimits::default())
    }
}

/// Cloneable handle to the synchronizer.
///
/// Mutations take the write lock, apply, release it and then notify
/// subscribers, so readers never observe a half-applied update.
#[derive(Clone)]
pub struct SharedTrustState {
    inner: Arc<RwLock<TrustSynchronizer>>,
    changes: Arc<watch::Sender<StateChange>>,
    stats: SharedSyncStats,
}

impl SharedTrustState {
    pub fn new(limits: SyncLimits, stats: SharedSyncStats) -> Self {
        let (changes, _) = watch::channel(StateChange {
            revision: 0,
            cause: ChangeCause::Initial,
        });

        Self {
            inner: Arc::new(RwLock::new(TrustSynchronizer::new(limits))),
            changes: Arc::new(changes),
            stats,
        }
    }

    /// Subscribe to state-changed notifications.
    pub fn subscribe(&self) -> watch::Receiver<StateChange> {
        self.changes.subscribe()
    }

    pub fn stats(&self) -> &SharedSyncStats {
        &self.stats
    }

    pub fn apply_snapshot(&self, snapshot: &ScoreMap) {
        let mut sync = self.write();
        let cause = sync.apply_snapshot(snapshot);
        self.notify(sync.revision(), cause);
        drop(sync);
        self.stats.record_snapshot_applied();
    }

    pub fn apply_timeline(&self, agent: &str, points: Vec<TimelinePoint>) -> TimelineOutcome {
        let count = points.len();
        let mut sync = self.write();
        let outcome = sync.apply_timeline(agent, points);

        match outcome {
            TimelineOutcome::Applied => {
                self.notify(
                    sync.revision(),
                    ChangeCause::Timeline {
                        agent: agent.to_string(),
                        points: count,
                    },
                );
                drop(sync);
                self.stats.record_timeline_applied();
            }
            TimelineOutcome::Stale => {
                drop(sync);
                self.stats.record_timeline_stale();
                tracing::debug!(agent, "Discarding timeline for deselected agent");
            }
        }
        outcome
    }

    pub fn apply_change_event(&self, event: &ChangeEvent) -> bool {
        let mut sync = self.write();
        let applied = sync.apply_change_event(event);
        if applied {
            self.notify(
                sync.revision(),
                ChangeCause::Event {
                    agent: event.agent.clone(),
                },
            );
        }
        drop(sync);

        if applied {
            self.stats.record_event_applied();
        }
        applied
    }

    pub fn select_agent(&self, agent: impl Into<AgentId>) {
        let agent = agent.into();
        let mut sync = self.write();
        sync.select_agent(agent.clone());
        self.notify(sync.revision(), ChangeCause::Selection { agent });
    }

    pub fn current_ranking(&self) -> Vec<RankingRow> {
        self.read().current_ranking()
    }

    pub fn current_window(&self, limit: usize) -> Vec<TimelinePoint> {
        self.read().current_window(limit)
    }

    pub fn view(&self, limit: usize) -> TrustView {
        self.read().view(limit)
    }

    pub fn selected_agent(&self) -> Option<AgentId> {
        self.read().selected_agent().map(str::to_string)
    }

    pub fn score_of(&self, agent: &str) -> Option<TrustScore> {
        self.read().score_of(agent)
    }

    pub fn recent_activity(&self, limit: usize) -> Vec<ChangeEvent> {
        self.read().recent_activity(limit)
    }

    /// Run `f` against a consistent view of the synchronizer.
    pub fn with<R>(&self, f: impl FnOnce(&TrustSynchronizer) -> R) -> R {
        f(&*self.read())
    }

    /// Publish a change. Called with the write lock held so revisions go out in order.
    fn notify(&self, revision: u64, cause: ChangeCause) {
        self.changes.send_replace(StateChange { revision, cause });
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TrustSynchronizer> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TrustSynchronizer> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::create_shared_stats;

    fn scores(entries: &[(&str, f64)]) -> ScoreMap {
        entries.iter().copied().collect()
    }

    fn event(agent: &str, trust: f64, timestamp: i64) -> ChangeEvent {
        ChangeEvent::new(agent, trust, 0.0, "test", timestamp)
    }

    fn agents(sync: &TrustSynchronizer) -> Vec<String> {
        sync.current_ranking().into_iter().map(|r| r.agent).collect()
    }

    #[test]
    fn test_snapshot_then_event_reorders_ranking() {
        let mut sync = TrustSynchronizer::default();
        sync.apply_snapshot(&scores(&[("a", 0.5), ("b", 0.9)]));

        let ranking = sync.current_ranking();
        assert_eq!(agents(&sync), vec!["b", "a"]);
        assert_eq!(ranking[0].trust, 0.9);

        sync.apply_change_event(&event("a", 0.95, 1000));
        let ranking = sync.current_ranking();
        assert_eq!(agents(&sync), vec!["a", "b"]);
        assert_eq!(ranking[0].trust, 0.95);
        assert_eq!(ranking[1].trust, 0.9);
    }

    #[test]
    fn test_snapshot_never_removes_agents() {
        let mut sync = TrustSynchronizer::default();
        sync.apply_snapshot(&scores(&[("a", 0.1), ("b", 0.2)]));
        sync.apply_change_event(&event("live-only", 0.3, 10));
        sync.apply_snapshot(&scores(&[("c", 0.4)]));
        sync.apply_snapshot(&ScoreMap::new());

        let mut keys: Vec<&str> = sync.scores().agents().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b", "c", "live-only"]);
    }

    #[test]
    fn test_later_arrival_wins_regardless_of_source() {
        let mut sync = TrustSynchronizer::default();
        sync.apply_change_event(&event("a", 0.8, 2000));
        // An older snapshot that arrives later still supersedes the event.
        sync.apply_snapshot(&scores(&[("a", 0.6)]));
        assert_eq!(sync.score_of("a"), Some(0.6));

        sync.apply_change_event(&event("a", 0.7, 1000));
        assert_eq!(sync.score_of("a"), Some(0.7));
    }

    #[test]
    fn test_event_placement_after_any_snapshot() {
        let mut sync = TrustSynchronizer::default();
        sync.apply_snapshot(&scores(&[("a", 0.2), ("b", 0.4), ("c", 0.6)]));
        sync.apply_change_event(&event("b", -3.5, 1));

        let ranking = sync.current_ranking();
        let row = ranking.iter().find(|r| r.agent == "b").unwrap();
        assert_eq!(row.trust, -3.5);
        assert_eq!(ranking.last().unwrap().agent, "b");
    }

    #[test]
    fn test_first_event_selects_and_seeds_timeline() {
        let mut sync = TrustSynchronizer::default();
        assert!(sync.apply_change_event(&event("x", 0.4, 1000)));

        assert_eq!(sync.selected_agent(), Some("x"));
        assert_eq!(sync.current_window(10), vec![TimelinePoint::new(1000, 0.4)]);
    }

    #[test]
    fn test_snapshot_selects_top_agent() {
        let mut sync = TrustSynchronizer::default();
        sync.apply_snapshot(&ScoreMap::new());
        assert_eq!(sync.selected_agent(), None);

        sync.apply_snapshot(&scores(&[("a", 0.5), ("b", 0.9)]));
        assert_eq!(sync.selected_agent(), Some("b"));

        // Selection survives later snapshots.
        sync.apply_snapshot(&scores(&[("c", 1.5)]));
        assert_eq!(sync.selected_agent(), Some("b"));
    }

    #[test]
    fn test_stale_timeline_is_discarded() {
        let mut sync = TrustSynchronizer::default();
        sync.select_agent("a");
        let issued_for = sync.selected_agent().unwrap().to_string();

        sync.select_agent("b");
        sync.apply_change_event(&event("b", 0.3, 50));
        let before = sync.current_window(10);

        let outcome = sync.apply_timeline(&issued_for, vec![TimelinePoint::new(1, 0.9)]);
        assert_eq!(outcome, TimelineOutcome::Stale);
        assert_eq!(sync.current_window(10), before);
        assert_eq!(sync.timeline_agent(), Some("b"));
    }

    #[test]
    fn test_timeline_replaces_buffer_for_selection() {
        let mut sync = TrustSynchronizer::default();
        sync.select_agent("a");
        sync.apply_change_event(&event("a", 0.5, 100));

        let pulled = vec![TimelinePoint::new(10, 0.1), TimelinePoint::new(20, 0.2)];
        assert_eq!(sync.apply_timeline("a", pulled), TimelineOutcome::Applied);
        assert_eq!(
            sync.current_window(10),
            vec![TimelinePoint::new(20, 0.2), TimelinePoint::new(10, 0.1)]
        );
    }

    #[test]
    fn test_events_for_other_agents_do_not_touch_timeline() {
        let mut sync = TrustSynchronizer::default();
        sync.select_agent("a");
        sync.apply_timeline("a", vec![TimelinePoint::new(1, 0.1)]);
        sync.apply_change_event(&event("b", 0.9, 2));

        assert_eq!(sync.current_window(10), vec![TimelinePoint::new(1, 0.1)]);
        assert_eq!(sync.score_of("b"), Some(0.9));
    }

    #[test]
    fn test_duplicate_points_are_kept() {
        let mut sync = TrustSynchronizer::default();
        sync.select_agent("a");
        sync.apply_timeline("a", vec![TimelinePoint::new(5, 0.5)]);
        sync.apply_change_event(&event("a", 0.5, 5));

        assert_eq!(sync.current_window(10).len(), 2);
    }

    #[test]
    fn test_select_keeps_previous_buffer_until_pull() {
        let mut sync = TrustSynchronizer::default();
        sync.select_agent("a");
        sync.apply_timeline("a", vec![TimelinePoint::new(1, 0.1)]);
        sync.select_agent("b");

        let view = sync.view(10);
        assert_eq!(view.selected.as_deref(), Some("b"));
        assert_eq!(view.window_agent.as_deref(), Some("a"));
        assert!(view.window_is_stale());
        assert_eq!(view.window.len(), 1);

        sync.apply_timeline("b", vec![]);
        assert!(!sync.view(10).window_is_stale());
        assert!(sync.current_window(10).is_empty());
    }

    #[test]
    fn test_event_for_new_selection_replaces_previous_buffer() {
        let mut sync = TrustSynchronizer::default();
        sync.select_agent("a");
        sync.apply_timeline("a", vec![TimelinePoint::new(1, 0.1), TimelinePoint::new(2, 0.2)]);
        sync.select_agent("b");

        sync.apply_change_event(&event("b", 0.8, 50));

        assert_eq!(sync.timeline_agent(), Some("b"));
        assert_eq!(sync.current_window(10), vec![TimelinePoint::new(50, 0.8)]);
        assert!(!sync.view(10).window_is_stale());

        // The pull that follows replaces the seeded point wholesale.
        sync.apply_timeline("b", vec![TimelinePoint::new(40, 0.7), TimelinePoint::new(50, 0.8)]);
        assert_eq!(sync.current_window(10)[1], TimelinePoint::new(40, 0.7));
    }

    #[test]
    fn test_window_never_exceeds_limit() {
        let mut sync = TrustSynchronizer::default();
        for ts in 0..25 {
            sync.apply_change_event(&event("a", ts as f64, ts));
        }

        let window = sync.current_window(10);
        assert_eq!(window.len(), 10);
        assert!(window.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        assert_eq!(window[0].timestamp, 24);
    }

    #[test]
    fn test_no_selection_means_empty_window() {
        let sync = TrustSynchronizer::default();
        assert!(sync.current_window(10).is_empty());
    }

    #[test]
    fn test_buffers_are_bounded() {
        let mut sync = TrustSynchronizer::new(SyncLimits {
            timeline_capacity: 3,
            activity_capacity: 2,
        });
        for ts in 0..6 {
            sync.apply_change_event(&event("a", 0.1, ts));
        }

        assert_eq!(sync.current_window(10).len(), 3);
        assert_eq!(sync.current_window(10)[2].timestamp, 3);
        let activity = sync.recent_activity(10);
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].timestamp, 5);
    }

    #[test]
    fn test_event_without_score_is_ignored() {
        let mut sync = TrustSynchronizer::default();
        let mut delta_only = event("a", 0.1, 1);
        delta_only.trust = None;

        assert!(!sync.apply_change_event(&delta_only));
        assert_eq!(sync.revision(), 0);
        assert_eq!(sync.selected_agent(), None);
    }

    #[test]
    fn test_shared_state_notifies_subscribers() {
        let state = SharedTrustState::new(SyncLimits::default(), create_shared_stats());
        let mut changes = state.subscribe();
        assert!(!changes.has_changed().unwrap());

        state.apply_change_event(&event("x", 0.4, 1000));
        assert!(changes.has_changed().unwrap());
        let change = changes.borrow_and_update().clone();
        assert_eq!(change.revision, 1);
        assert_eq!(
            change.cause,
            ChangeCause::Event {
                agent: "x".to_string()
            }
        );

        // Stale timelines are not state changes.
        state.select_agent("y");
        changes.borrow_and_update();
        assert_eq!(
            state.apply_timeline("x", vec![TimelinePoint::new(1, 0.1)]),
            TimelineOutcome::Stale
        );
        assert!(!changes.has_changed().unwrap());

        let stats = state.stats().stats();
        assert_eq!(stats.events_applied, 1);
        assert_eq!(stats.timelines_stale, 1);
    }
}
