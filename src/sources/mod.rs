//! Input sources of the trust synchronizer.
//!
//! - [`SnapshotFetcher`] pulls every agent's score on a fixed period
//! - [`TimelineFetcher`] pulls the selected agent's history on a fixed period
//! - [`LiveEventChannel`] holds a WebSocket subscription to change events
//!
//! Each source runs as its own task and only submits updates through
//! [`SharedTrustState`](crate::core::SharedTrustState).

pub mod channel;
pub mod fetcher;

pub use channel::{ChannelError, ChannelState, LiveEventChannel, ReconnectPolicy, SUBSCRIBE_MESSAGE};
pub use fetcher::{SnapshotFetcher, TimelineFetcher, TimelinePoll};
