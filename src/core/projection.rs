//! Render-ready projections of the canonical trust state.
//!
//! Everything here is derived: functions take the canonical structures by
//! reference and return fresh values, so a projection never holds state of
//! its own.

use super::types::{AgentId, ScoreMap, TimelinePoint, TrustScore};
use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// Default number of timeline points shown for the selected agent.
pub const DEFAULT_WINDOW_LIMIT: usize = 10;

/// One row of the score ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingRow {
    pub agent: AgentId,
    pub trust: TrustScore,
}

/// Sort scores descending. Equal scores keep the map's insertion order
/// because `sort_by` is stable.
pub fn rank(scores: &ScoreMap) -> Vec<RankingRow> {
    let mut rows: Vec<RankingRow> = scores
        .iter()
        .map(|(agent, trust)| RankingRow {
            agent: agent.to_string(),
            trust,
        })
        .collect();

    rows.sort_by(|a, b| b.trust.total_cmp(&a.trust));
    rows
}

/// The last `limit` points, most recent first.
pub fn recent_window(points: &[TimelinePoint], limit: usize) -> Vec<TimelinePoint> {
    points.iter().rev().take(limit).copied().collect()
}

/// Everything a presenter needs for one frame.
#[derive(Debug, Clone, Serialize)]
pub struct TrustView {
    pub revision: u64,
    pub ranking: Vec<RankingRow>,
    pub selected: Option<AgentId>,
    /// Agent the window points were fetched for. Differs from `selected`
    /// while a timeline fetch for a new selection is still in flight.
    pub window_agent: Option<AgentId>,
    pub window: Vec<TimelinePoint>,
}

impl TrustView {
    /// True while the displayed window belongs to a previous selection.
    pub fn window_is_stale(&self) -> bool {
        self.window_agent.is_some() && self.window_agent != self.selected
    }
}

/// Format an epoch-seconds timestamp for display.
///
/// This is the only place seconds are turned into a calendar time. With no
/// time zone the local zone is used.
pub fn format_timestamp(secs: i64, tz: Option<Tz>) -> String {
    if secs == 0 {
        return "—".to_string();
    }

    let Some(utc) = DateTime::<Utc>::from_timestamp(secs, 0) else {
        return "—".to_string();
    };

    match tz {
        Some(tz) => tz
            .from_utc_datetime(&utc.naive_utc())
            .format("%Y-%m-%d %H:%M:%S %Z")
            .to_string(),
        None => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
    }
}

/// Scores are shown with three decimals.
pub fn format_trust(trust: TrustScore) -> String {
    format!("{trust:.3}")
}

/// Signed delta, e.g. `+0.050` or `-0.120`.
pub fn format_change(change: f64) -> String {
    format!("{change:+.3}")
}
