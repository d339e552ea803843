//! REST control surface for the backend replay/strategy session.
//!
//! Every call is fire-and-forget from the stream's point of view: failures
//! surface to the caller as a [`StreamError::Control`] for a transient
//! notification, and never touch buffer or connection state. After a mode
//! switch or rewind the caller is expected to `reset()` the stream state;
//! the backend repopulates the session from there.

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::types::Mode;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the backend's replay / mode / strategy endpoints.
#[derive(Debug, Clone)]
pub struct ControlClient {
    http: Client,
    base_url: String,
    session_id: String,
}

impl ControlClient {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.http_url.trim_end_matches('/').to_string(),
            session_id: config.session_id.clone(),
        }
    }

    /// Start (or resume emission of) the replay session.
    pub async fn start_replay(&self) -> Result<(), StreamError> {
        self.post("/replay/start", &[]).await
    }

    pub async fn pause_replay(&self) -> Result<(), StreamError> {
        self.post("/replay/pause", &[]).await
    }

    pub async fn resume_replay(&self) -> Result<(), StreamError> {
        self.post("/replay/resume", &[]).await
    }

    pub async fn stop_replay(&self) -> Result<(), StreamError> {
        self.post("/replay/stop", &[]).await
    }

    /// Set the replay speed multiplier (the backend clamps to 1..=100).
    pub async fn set_speed(&self, speed: u32) -> Result<(), StreamError> {
        self.post("/replay/speed", &[("speed", speed.to_string())])
            .await
    }

    /// Rewind the replay cursor by `seconds`.
    pub async fn go_back(&self, seconds: f64) -> Result<(), StreamError> {
        self.post("/replay/go_back", &[("seconds", seconds.to_string())])
            .await
    }

    /// Switch the session between LIVE and REPLAY; LIVE takes the exchange
    /// symbol to subscribe to.
    pub async fn set_mode(&self, mode: Mode, symbol: Option<&str>) -> Result<(), StreamError> {
        let mut params = vec![("mode", mode.as_str().to_string())];
        if let Some(symbol) = symbol {
            params.push(("symbol", symbol.to_string()));
        }
        self.post("/mode", &params).await
    }

    pub async fn strategy_start(&self) -> Result<(), StreamError> {
        self.post("/strategy/start", &[]).await
    }

    pub async fn strategy_stop(&self) -> Result<(), StreamError> {
        self.post("/strategy/stop", &[]).await
    }

    /// Reset strategy PnL and trade history; callers clear their local
    /// event log alongside.
    pub async fn strategy_reset(&self) -> Result<(), StreamError> {
        self.post("/strategy/reset", &[]).await
    }

    /// Query the backend's current mode and session metrics.
    pub async fn fetch_metrics(&self) -> Result<serde_json::Value, StreamError> {
        let response = self
            .http
            .get(format!("{}/metrics", self.base_url))
            .query(&[("session_id", self.session_id.as_str())])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StreamError::Control(format!(
                "metrics query returned HTTP {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    async fn post(&self, path: &str, params: &[(&str, String)]) -> Result<(), StreamError> {
        let mut query: Vec<(&str, &str)> = vec![("session_id", self.session_id.as_str())];
        query.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

        let result = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .query(&query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("control {} ok", path);
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                warn!("control {} returned HTTP {}", path, status);
                Err(StreamError::Control(format!(
                    "{path} returned HTTP {status}"
                )))
            }
            Err(err) => {
                warn!("control {} failed: {}", path, err);
                Err(err.into())
            }
        }
    }
}
