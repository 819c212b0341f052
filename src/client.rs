//! HTTP client for the trust service.
//!
//! Wraps the read endpoints the console depends on and derives the push
//! channel URL from the same base address.

use crate::core::{ChangeEvent, ScoreMap, Timeline, TimelineResponse};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// API endpoint configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Value sent in the `X-Intent` header
    pub read_intent: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ApiConfig {
    /// Create a new API configuration with the default intent and timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            read_intent: "READ".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &crate::Config) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            read_intent: config.read_intent.clone(),
            timeout: config.request_timeout,
        }
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Get the scores endpoint URL.
    pub fn scores_url(&self) -> String {
        format!("{}/trust", self.base())
    }

    /// Get the timeline endpoint URL (agent passed as query parameter).
    pub fn timeline_url(&self) -> String {
        format!("{}/trust/timeline", self.base())
    }

    /// Get the recent events endpoint URL.
    pub fn events_url(&self) -> String {
        format!("{}/trust/events", self.base())
    }

    /// Get the kernel status endpoint URL.
    pub fn status_url(&self) -> String {
        format!("{}/kernel/status", self.base())
    }

    /// Get the live trust stream URL, switching `http` to `ws` and `https`
    /// to `wss`.
    pub fn stream_url(&self) -> Result<String, ApiError> {
        let mut url = Url::parse(self.base())
            .map_err(|e| ApiError::Config(format!("Invalid base URL '{}': {e}", self.base_url)))?;

        let scheme = match url.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(ApiError::Config(format!(
                    "Unsupported URL scheme '{other}'"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::Config(format!("Cannot derive stream URL from '{}'", self.base_url)))?;

        let path = format!("{}/ws/trust", url.path().trim_end_matches('/'));
        url.set_path(&path);
        Ok(url.to_string())
    }
}

/// API client error types.
#[derive(Debug)]
pub enum ApiError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Server returned an error response
    Server { status: u16, message: String },
    /// Response body could not be decoded
    Decode(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Config(msg) => write!(f, "API config error: {msg}"),
            ApiError::Network(msg) => write!(f, "API network error: {msg}"),
            ApiError::Server { status, message } => {
                write!(f, "API server error ({status}): {message}")
            }
            ApiError::Decode(msg) => write!(f, "API decode error: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Extended kernel status from `GET /kernel/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct KernelStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub adapters_registered: Option<u64>,
    #[serde(default)]
    pub adapters: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<f64>,
}

/// Paged body some deployments wrap `/trust/events` in.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventsBody {
    Paged { items: Vec<ChangeEvent> },
    Plain(Vec<ChangeEvent>),
}

/// The pull-side reads the synchronizer is fed from.
#[async_trait]
pub trait TrustSource: Send + Sync {
    /// Full snapshot of every agent's current score.
    async fn fetch_scores(&self) -> Result<ScoreMap, ApiError>;

    /// Bounded recent history for one agent, oldest first.
    async fn fetch_timeline(&self, agent: &str) -> Result<Timeline, ApiError>;
}

/// Client for the trust service HTTP API.
pub struct TrustApiClient {
    config: ApiConfig,
    client: reqwest::Client,
}

impl TrustApiClient {
    /// Create a new API client.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Recent trust events across all agents, newest first.
    pub async fn fetch_events(&self, limit: usize) -> Result<Vec<ChangeEvent>, ApiError> {
        let response = self
            .get(&self.config.events_url())
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let body: EventsBody = Self::decode(response).await?;
        Ok(match body {
            EventsBody::Paged { items } => items,
            EventsBody::Plain(items) => items,
        })
    }

    pub async fn fetch_status(&self) -> Result<KernelStatus, ApiError> {
        let response = self
            .get(&self.config.status_url())
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Self::decode(response).await
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("X-Intent", self.config.read_intent.as_str())
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ApiError::Server {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl TrustSource for TrustApiClient {
    async fn fetch_scores(&self) -> Result<ScoreMap, ApiError> {
        let response = self
            .get(&self.config.scores_url())
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        // Any valid JSON is accepted; a non-object body becomes an empty map.
        let body: serde_json::Value = Self::decode(response).await?;
        Ok(ScoreMap::from_json_value(&body))
    }

    async fn fetch_timeline(&self, agent: &str) -> Result<Timeline, ApiError> {
        let response = self
            .get(&self.config.timeline_url())
            .query(&[("agent", agent)])
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let body: TimelineResponse = Self::decode(response).await?;
        if body.agent != agent {
            return Err(ApiError::Decode(format!(
                "Timeline requested for '{agent}' but response is for '{}'",
                body.agent
            )));
        }
        Ok(body.timeline)
    }
}
