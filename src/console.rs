//! Plain-text rendering of the trust view.

use crate::core::projection::{format_change, format_timestamp, format_trust};
use crate::core::{ChangeEvent, RankingRow, TimelinePoint, TrustView};
use crate::sources::ChannelState;
use chrono_tz::Tz;
use std::fmt::Write;

/// Rendering options.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub timezone: Option<Tz>,
    /// Maximum ranking rows shown (all when `None`)
    pub max_rows: Option<usize>,
}

/// Render a full frame: ranking, selected timeline and recent activity.
pub fn render_frame(
    view: &TrustView,
    activity: &[ChangeEvent],
    channel: ChannelState,
    options: &RenderOptions,
) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Trust View  (rev {}, live channel: {channel})",
        view.revision
    );
    let _ = writeln!(out);

    out.push_str(&render_ranking(&view.ranking, view.selected.as_deref(), options.max_rows));
    let _ = writeln!(out);

    match &view.selected {
        Some(agent) => {
            let _ = write!(out, "Timeline for {agent}");
            if view.window_is_stale() {
                if let Some(previous) = &view.window_agent {
                    let _ = write!(out, " (loading, showing {previous})");
                }
            }
            let _ = writeln!(out);
            out.push_str(&render_window(&view.window, options.timezone));
        }
        None => {
            let _ = writeln!(out, "No agent selected");
        }
    }

    if !activity.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Recent Activity");
        out.push_str(&render_events(activity, options.timezone));
    }

    out
}

/// Score table, highest first. The selected agent is marked with `*`.
pub fn render_ranking(rows: &[RankingRow], selected: Option<&str>, max_rows: Option<usize>) -> String {
    let mut out = String::new();
    if rows.is_empty() {
        out.push_str("  (no scores yet)\n");
        return out;
    }

    let width = rows
        .iter()
        .map(|r| r.agent.chars().count())
        .max()
        .unwrap_or(0)
        .max("Agent".len());

    let _ = writeln!(out, "  {:<width$}  {:>8}", "Agent", "Trust");
    for row in rows.iter().take(max_rows.unwrap_or(usize::MAX)) {
        let marker = if selected == Some(row.agent.as_str()) {
            '*'
        } else {
            ' '
        };
        let _ = writeln!(
            out,
            "{marker} {:<width$}  {:>8}",
            row.agent,
            format_trust(row.trust)
        );
    }

    let hidden = rows.len().saturating_sub(max_rows.unwrap_or(usize::MAX));
    if hidden > 0 {
        let _ = writeln!(out, "  … {hidden} more");
    }
    out
}

/// Timeline window, most recent first.
pub fn render_window(points: &[TimelinePoint], tz: Option<Tz>) -> String {
    let mut out = String::new();
    if points.is_empty() {
        out.push_str("  (no history)\n");
        return out;
    }

    for point in points {
        let _ = writeln!(
            out,
            "  {}  {:>8}",
            format_timestamp(point.timestamp, tz),
            format_trust(point.trust)
        );
    }
    out
}

/// Change events with delta and reason.
pub fn render_events(events: &[ChangeEvent], tz: Option<Tz>) -> String {
    let mut out = String::new();
    for event in events {
        let trust = event
            .trust
            .map(format_trust)
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {}  {}  {:>8}  {}  {}",
            format_timestamp(event.timestamp, tz),
            event.agent,
            trust,
            format_change(event.change),
            event.reason
        );
    }
    out
}
