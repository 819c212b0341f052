//! Wiring for a live console session.
//!
//! A session owns one synchronizer and spawns its three sources against it.
//! Cancelling the session token tears everything down.

use crate::client::{ApiConfig, ApiError, TrustApiClient, TrustSource};
use crate::config::Config;
use crate::core::SharedTrustState;
use crate::sources::{ChannelState, LiveEventChannel, SnapshotFetcher, TimelineFetcher};
use crate::stats::create_shared_stats;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A running session.
pub struct LiveSession {
    state: SharedTrustState,
    channel_status: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl LiveSession {
    /// Start a session against the API described by `config`.
    pub fn start(config: &Config) -> Result<Self, ApiError> {
        let api = ApiConfig::from_config(config);
        let stream_url = api.stream_url()?;
        let client: Arc<dyn TrustSource> = Arc::new(TrustApiClient::new(api)?);
        Ok(Self::start_with(config, client, stream_url))
    }

    /// Start a session with an explicit pull source and stream URL.
    pub fn start_with(
        config: &Config,
        source: Arc<dyn TrustSource>,
        stream_url: impl Into<String>,
    ) -> Self {
        let stats = create_shared_stats();
        let state = SharedTrustState::new(config.sync_limits(), stats);
        let cancel = CancellationToken::new();

        tracing::info!(
            session = %state.stats().session_id(),
            api = %config.api_base_url,
            "Starting live session"
        );

        let snapshots = SnapshotFetcher::new(source.clone(), state.clone(), config.snapshot_interval);
        let timelines = TimelineFetcher::new(source, state.clone(), config.timeline_interval);
        let channel = LiveEventChannel::new(stream_url, config.reconnect, state.clone());
        let channel_status = channel.status();

        let tasks = vec![
            tokio::spawn(snapshots.run(cancel.clone())),
            tokio::spawn(timelines.run(cancel.clone())),
            tokio::spawn(channel.run(cancel.clone())),
        ];

        Self {
            state,
            channel_status,
            cancel,
            tasks,
        }
    }

    pub fn state(&self) -> &SharedTrustState {
        &self.state
    }

    pub fn channel_status(&self) -> watch::Receiver<ChannelState> {
        self.channel_status.clone()
    }

    /// Token that tears the session down when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every source and wait for them to stop.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Session task failed: {e}");
            }
        }
        tracing::info!("Live session stopped");
    }
}
