//! Trust Console - live operator view of a trust scoring service.
//!
//! The console keeps an agent → score map and the selected agent's recent
//! history consistent while three sources feed it concurrently:
//!
//! - a periodic pull of every agent's score,
//! - a periodic pull of the selected agent's timeline,
//! - a WebSocket stream of individual trust changes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Trust Console                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐        │
//! │  │   Snapshot   │  │   Timeline   │  │  Live Event  │        │
//! │  │   Fetcher    │  │   Fetcher    │  │   Channel    │        │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘        │
//! │         └────────────┐    │    ┌────────────┘                │
//! │                      ▼    ▼    ▼                             │
//! │                 ┌───────────────────┐     ┌──────────────┐   │
//! │                 │ Trust Synchronizer│────▶│     View     │   │
//! │                 │  (single writer)  │     │  Projection  │   │
//! │                 └───────────────────┘     └──────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use trust_console::{Config, LiveSession};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load()?;
//! let session = LiveSession::start(&config)?;
//!
//! let mut changes = session.state().subscribe();
//! changes.changed().await?;
//! for row in session.state().current_ranking() {
//!     println!("{} {:.3}", row.agent, row.trust);
//! }
//!
//! session.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod console;
pub mod core;
pub mod session;
pub mod sources;
pub mod stats;

// Re-export key types at crate root for convenience
pub use client::{ApiConfig, ApiError, KernelStatus, TrustApiClient, TrustSource};
pub use config::{Config, ConfigError};
pub use core::{
    AgentId, ChangeEvent, RankingRow, ScoreMap, SharedTrustState, StateChange, Timeline,
    TimelinePoint, TrustScore, TrustSynchronizer, TrustView,
};
pub use session::LiveSession;
pub use sources::{ChannelState, LiveEventChannel, ReconnectPolicy, SnapshotFetcher, TimelineFetcher};
pub use stats::{SharedSyncStats, SyncStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
