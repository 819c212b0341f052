//! Scheduled pulls feeding the synchronizer.
//!
//! Both fetchers pull on a fixed period, starting immediately. A failed pull
//! is logged and counted, leaves the canonical state as it was, and is simply
//! retried on the next tick.

use crate::client::{ApiError, TrustSource};
use crate::core::{AgentId, SharedTrustState, TimelineOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Result of one successful timeline cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelinePoll {
    /// Nothing is selected yet, so nothing was requested
    NoSelection,
    Applied { agent: AgentId },
    /// The selection changed while the request was in flight
    Stale { agent: AgentId },
}

/// Periodically pulls the full score snapshot.
pub struct SnapshotFetcher {
    source: Arc<dyn TrustSource>,
    state: SharedTrustState,
    period: Duration,
}

impl SnapshotFetcher {
    pub fn new(source: Arc<dyn TrustSource>, state: SharedTrustState, period: Duration) -> Self {
        Self {
            source,
            state,
            period,
        }
    }

    /// Run one pull. On error the state is untouched.
    pub async fn poll_once(&self) -> Result<usize, ApiError> {
        match self.source.fetch_scores().await {
            Ok(snapshot) => {
                self.state.apply_snapshot(&snapshot);
                Ok(snapshot.len())
            }
            Err(e) => {
                self.state.stats().record_snapshot_failure();
                Err(e)
            }
        }
    }

    /// Pull until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.poll_once() => match result {
                    Ok(agents) => tracing::debug!(agents, "Score snapshot applied"),
                    Err(e) => tracing::warn!("Score snapshot pull failed: {e}"),
                },
            }
        }

        tracing::debug!("Snapshot fetcher stopped");
    }
}

/// Periodically pulls the selected agent's timeline.
pub struct TimelineFetcher {
    source: Arc<dyn TrustSource>,
    state: SharedTrustState,
    period: Duration,
}

impl TimelineFetcher {
    pub fn new(source: Arc<dyn TrustSource>, state: SharedTrustState, period: Duration) -> Self {
        Self {
            source,
            state,
            period,
        }
    }

    /// Run one pull for whichever agent is selected right now.
    ///
    /// The selection is captured before the request is issued and handed to
    /// the synchronizer with the response, so a response that outlives its
    /// selection is discarded rather than shown under another agent.
    pub async fn poll_once(&self) -> Result<TimelinePoll, ApiError> {
        let Some(agent) = self.state.selected_agent() else {
            return Ok(TimelinePoll::NoSelection);
        };

        let points = match self.source.fetch_timeline(&agent).await {
            Ok(points) => points,
            Err(e) => {
                self.state.stats().record_timeline_failure();
                return Err(e);
            }
        };

        Ok(match self.state.apply_timeline(&agent, points) {
            TimelineOutcome::Applied => TimelinePoll::Applied { agent },
            TimelineOutcome::Stale => TimelinePoll::Stale { agent },
        })
    }

    /// Pull until `cancel` fires. A change of selection triggers an
    /// immediate pull and restarts the period.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut changes = self.state.subscribe();
        let mut polled_for = self.state.selected_agent();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if self.state.selected_agent() == polled_for {
                        continue;
                    }
                    ticker.reset();
                }
            }

            polled_for = self.state.selected_agent();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.poll_once() => match result {
                    Ok(TimelinePoll::Applied { agent }) => {
                        tracing::debug!(%agent, "Timeline applied");
                    }
                    Ok(TimelinePoll::Stale { agent }) => {
                        tracing::debug!(%agent, "Timeline arrived after selection changed");
                    }
                    Ok(TimelinePoll::NoSelection) => {}
                    Err(e) => tracing::warn!("Timeline pull failed: {e}"),
                },
            }
        }

        tracing::debug!("Timeline fetcher stopped");
    }
}
