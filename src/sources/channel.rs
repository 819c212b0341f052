//! Live event channel: a WebSocket subscription to trust changes.
//!
//! ```text
//! Disconnected ──▶ Connecting ──▶ Open ──▶ Closed | Errored
//!                      ▲                         │
//!                      └──────── backoff ────────┘
//! ```
//!
//! On entering `Open` the channel sends one `subscribe` frame. Each text
//! frame after that is decoded as a [`ChangeEvent`] and applied to the
//! synchronizer; frames that fail to decode are dropped without leaving
//! `Open`. Cancellation is the only way out of the loop and always ends in
//! `Disconnected`.

use crate::core::{ChangeEvent, SharedTrustState};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tokio_util::sync::CancellationToken;

/// Handshake frame sent once per connection.
pub const SUBSCRIBE_MESSAGE: &str = "subscribe";

/// Connection state of the live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    /// The server closed the connection
    Closed,
    /// The connection failed or broke
    Errored,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
            ChannelState::Errored => "errored",
        };
        f.write_str(label)
    }
}

/// Channel error types.
#[derive(Debug)]
pub enum ChannelError {
    /// Could not establish the WebSocket connection
    Connect(String),
    /// The subscribe frame could not be sent
    Handshake(String),
    /// The connection broke while open
    Transport(String),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::Connect(msg) => write!(f, "Live channel connect error: {msg}"),
            ChannelError::Handshake(msg) => write!(f, "Live channel handshake error: {msg}"),
            ChannelError::Transport(msg) => write!(f, "Live channel transport error: {msg}"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Exponential reconnect backoff, capped at `max_delay`.
///
/// The delay restarts from `initial_delay` after every successful open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
        }
    }

    /// Delay before reconnect attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt.min(32));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay.is_zero() {
            return Err("reconnect.initial_delay must be greater than zero".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err("reconnect.max_delay must be at least initial_delay".to_string());
        }
        Ok(())
    }
}

/// How one connection ended.
enum StreamEnd {
    Closed,
    Cancelled,
}

/// Persistent push subscription feeding change events into the synchronizer.
pub struct LiveEventChannel {
    url: String,
    policy: ReconnectPolicy,
    state: SharedTrustState,
    status: Arc<watch::Sender<ChannelState>>,
}

impl LiveEventChannel {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy, state: SharedTrustState) -> Self {
        let (status, _) = watch::channel(ChannelState::Disconnected);
        Self {
            url: url.into(),
            policy,
            state,
            status: Arc::new(status),
        }
    }

    /// Observe connection state transitions.
    pub fn status(&self) -> watch::Receiver<ChannelState> {
        self.status.subscribe()
    }

    /// Connect and keep reconnecting until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;

        while !cancel.is_cancelled() {
            self.set_status(ChannelState::Connecting);

            match self.connect_and_stream(&cancel, &mut attempt).await {
                Ok(StreamEnd::Cancelled) => break,
                Ok(StreamEnd::Closed) => {
                    tracing::info!(url = %self.url, "Live channel closed by server");
                    self.set_status(ChannelState::Closed);
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, "{e}");
                    self.set_status(ChannelState::Errored);
                }
            }

            let delay = self.policy.delay_for(attempt);
            attempt = attempt.saturating_add(1);
            self.state.stats().record_reconnect_attempt();
            tracing::debug!(?delay, attempt, "Reconnecting live channel");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_status(ChannelState::Disconnected);
        tracing::debug!("Live channel stopped");
    }

    async fn connect_and_stream(
        &self,
        cancel: &CancellationToken,
        attempt: &mut u32,
    ) -> Result<StreamEnd, ChannelError> {
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            connected = connect_async(self.url.as_str()) => connected,
        };
        let (ws, _) = connected.map_err(|e| ChannelError::Connect(e.to_string()))?;
        let (mut write, mut read) = ws.split();

        self.set_status(ChannelState::Open);
        self.state.stats().record_connection_opened();
        *attempt = 0;
        tracing::info!(url = %self.url, "Live channel open");

        write
            .send(WsMessage::Text(SUBSCRIBE_MESSAGE.into()))
            .await
            .map_err(|e| ChannelError::Handshake(e.to_string()))?;

        loop {
            let msg = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    write.close().await.ok();
                    return Ok(StreamEnd::Cancelled);
                }
                msg = read.next() => msg,
            };

            let msg = match msg {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
                None => return Ok(StreamEnd::Closed),
            };

            match msg {
                WsMessage::Text(text) => self.handle_text(&text),
                WsMessage::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => self.handle_text(&text),
                    Err(_) => self.drop_message("binary frame is not UTF-8"),
                },
                WsMessage::Ping(payload) => {
                    write.send(WsMessage::Pong(payload)).await.ok();
                }
                WsMessage::Close(_) => return Ok(StreamEnd::Closed),
                _ => {}
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match ChangeEvent::from_live_message(text) {
            Ok(event) => {
                self.state.apply_change_event(&event);
            }
            Err(e) => self.drop_message(&e.to_string()),
        }
    }

    fn drop_message(&self, reason: &str) {
        self.state.stats().record_message_dropped();
        tracing::warn!("Dropping malformed live message: {reason}");
    }

    fn set_status(&self, next: ChannelState) {
        let previous = self.status.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "Live channel state");
        }
    }
}

/// Serde support for Duration, as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_fixed_policy() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(7), Duration::from_secs(5));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        let zero = ReconnectPolicy::fixed(Duration::ZERO);
        assert!(zero.validate().is_err());

        let inverted = ReconnectPolicy {
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            multiplier: 2,
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_policy_serde_uses_millis() {
        let json = serde_json::to_value(ReconnectPolicy::default()).unwrap();
        assert_eq!(json["initial_delay"], 500);
        assert_eq!(json["max_delay"], 30_000);
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_retrying_until_cancelled() {
        let state = SharedTrustState::new(
            crate::core::SyncLimits::default(),
            crate::stats::create_shared_stats(),
        );
        // Bind and release a port so nothing is listening on it.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let channel = LiveEventChannel::new(
            format!("ws://127.0.0.1:{port}/ws/trust"),
            ReconnectPolicy::fixed(Duration::from_millis(10)),
            state.clone(),
        );
        let status = channel.status();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(channel.run(cancel.clone()));

        while state.stats().stats().reconnect_attempts < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(*status.borrow(), ChannelState::Disconnected);
        assert_eq!(state.stats().stats().connections_opened, 0);
    }
}
