/// Stream client configuration
///
/// All environment-derived values are read once here and passed explicitly
/// to the connection manager and control client, never re-read ad hoc.
use std::time::Duration;

use rand::Rng;
use url::Url;

/// Backend HTTP base URL env var
pub const ENV_HTTP_URL: &str = "BOOKPULSE_HTTP_URL";
/// Backend WebSocket URL env var; derived from the HTTP URL when unset
pub const ENV_WS_URL: &str = "BOOKPULSE_WS_URL";

const DEFAULT_HTTP_URL: &str = "http://127.0.0.1:8000";

/// Stream client configuration
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Backend HTTP base URL (control surface)
    pub http_url: String,
    /// Backend WebSocket URL (streaming endpoint, without session suffix)
    pub ws_url: String,
    /// Opaque client-generated session identifier, stable for the
    /// client's lifetime
    pub session_id: String,
    /// Snapshot history capacity (dashboard: 100, model test: 500)
    pub history_capacity: usize,
    /// Discrete event log capacity
    pub event_log_capacity: usize,
    /// Raw-frame channel size between socket task and drain task
    pub channel_buffer_size: usize,
    /// Drain tick decoupling arrival rate from render rate
    pub drain_interval: Duration,
    /// Transport keep-alive ping interval
    pub ping_interval: Duration,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay: Duration,
    /// Reconnect ceiling; reaching it reports a terminal failure
    pub max_reconnect_attempts: u32,
    /// Issue a replay "start" control call after each successful open
    pub start_on_connect: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            http_url: DEFAULT_HTTP_URL.to_string(),
            ws_url: derive_ws_url(DEFAULT_HTTP_URL),
            session_id: generate_session_id(),
            history_capacity: 100,
            event_log_capacity: 50,
            channel_buffer_size: 1000,
            drain_interval: Duration::from_millis(50),
            ping_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(2),
            max_reconnect_attempts: 10,
            start_on_connect: false,
        }
    }
}

impl StreamConfig {
    /// Build a configuration from `BOOKPULSE_HTTP_URL` / `BOOKPULSE_WS_URL`,
    /// deriving the WebSocket URL by protocol substitution when only the
    /// HTTP URL is provided.
    pub fn from_env() -> Self {
        let http_url =
            std::env::var(ENV_HTTP_URL).unwrap_or_else(|_| DEFAULT_HTTP_URL.to_string());
        let ws_url = std::env::var(ENV_WS_URL).unwrap_or_else(|_| derive_ws_url(&http_url));

        Self {
            http_url,
            ws_url,
            ..Default::default()
        }
    }

    /// Streaming endpoint with the session identifier suffix.
    pub fn session_ws_url(&self) -> String {
        format!("{}/{}", self.ws_url.trim_end_matches('/'), self.session_id)
    }

    pub fn with_http_url(mut self, url: impl Into<String>) -> Self {
        self.http_url = url.into();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn with_event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = capacity;
        self
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_start_on_connect(mut self, start: bool) -> Self {
        self.start_on_connect = start;
        self
    }
}

/// Derive the streaming endpoint from the HTTP base URL: `http` becomes
/// `ws` (`https` becomes `wss`) and the fixed `/ws` path is appended.
pub fn derive_ws_url(http_url: &str) -> String {
    match Url::parse(http_url) {
        Ok(mut url) => {
            let scheme = match url.scheme() {
                "https" => "wss",
                _ => "ws",
            };
            // set_scheme only rejects schemes with mismatched "specialness";
            // http(s) to ws(s) is always accepted
            let _ = url.set_scheme(scheme);
            format!("{}/ws", url.as_str().trim_end_matches('/'))
        }
        Err(_) => format!("{}/ws", http_url.trim_end_matches('/')),
    }
}

fn generate_session_id() -> String {
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.http_url, "http://127.0.0.1:8000");
        assert_eq!(config.ws_url, "ws://127.0.0.1:8000/ws");
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.event_log_capacity, 50);
        assert_eq!(config.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.session_id.len(), 16);
    }

    #[test]
    fn test_config_builder() {
        let config = StreamConfig::default()
            .with_http_url("http://backend:9000")
            .with_ws_url("ws://backend:9000/stream")
            .with_history_capacity(500)
            .with_reconnect_delay(Duration::from_secs(3))
            .with_max_reconnect_attempts(5)
            .with_start_on_connect(true);

        assert_eq!(config.http_url, "http://backend:9000");
        assert_eq!(config.ws_url, "ws://backend:9000/stream");
        assert_eq!(config.history_capacity, 500);
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.max_reconnect_attempts, 5);
        assert!(config.start_on_connect);
    }

    #[test]
    fn test_derive_ws_url_protocol_substitution() {
        assert_eq!(derive_ws_url("http://127.0.0.1:8000"), "ws://127.0.0.1:8000/ws");
        assert_eq!(
            derive_ws_url("https://market.example.com"),
            "wss://market.example.com/ws"
        );
        assert_eq!(
            derive_ws_url("http://backend:8000/"),
            "ws://backend:8000/ws"
        );
    }

    #[test]
    fn test_session_ws_url_suffixes_identifier() {
        let config = StreamConfig::default().with_session_id("abc123");
        assert_eq!(config.session_ws_url(), "ws://127.0.0.1:8000/ws/abc123");
    }

    #[test]
    fn test_session_ids_are_unique_per_client() {
        let first = StreamConfig::default();
        let second = StreamConfig::default();
        assert_ne!(first.session_id, second.session_id);
    }
}
