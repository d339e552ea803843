/// Core data types for market snapshots and strategy events
///
/// These types match the JSON message format broadcast by the analytics
/// backend over its streaming endpoint.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point-in-time market-state observation.
///
/// Producers compute the analytics scalars incrementally, so every one of
/// them is independently optional; the trade fields are present only when a
/// trade occurred in this snapshot. A snapshot is immutable once received.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Snapshot {
    /// Observation time, ISO-8601 encoded on the wire
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    /// Mid price between best bid and best ask
    pub mid_price: f64,
    /// Volume-weighted microprice
    pub microprice: f64,
    /// Bid levels, best price first
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    /// Ask levels, best price first
    #[serde(default)]
    pub asks: Vec<BookLevel>,
    /// Detection records attached to this snapshot
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    /// Traded volume, present only when a trade occurred
    #[serde(default)]
    pub trade_volume: Option<f64>,
    /// Aggressor side of the trade, present only when a trade occurred
    #[serde(default)]
    pub trade_side: Option<TradeSide>,
    /// Price of the last trade
    #[serde(default)]
    pub last_trade_price: Option<f64>,
    /// Volume-synchronized probability of informed trading
    #[serde(default)]
    pub vpin: Option<f64>,
    /// Order book imbalance
    #[serde(default)]
    pub obi: Option<f64>,
    /// Order flow imbalance
    #[serde(default)]
    pub ofi: Option<f64>,
    /// Best bid/ask spread
    #[serde(default)]
    pub spread: Option<f64>,
    /// Microprice minus mid price
    #[serde(default)]
    pub divergence: Option<f64>,
    /// Market regime cluster id
    #[serde(default)]
    pub regime: Option<i64>,
    /// Human-readable regime label (e.g. "Calm", "Stressed")
    #[serde(default)]
    pub regime_label: Option<String>,
}

impl Snapshot {
    /// Best bid level, if the book is non-empty
    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.first()
    }

    /// Best ask level, if the book is non-empty
    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.first()
    }

    /// Whether a trade occurred in this snapshot
    pub fn has_trade(&self) -> bool {
        self.trade_volume.is_some_and(|v| v > 0.0)
    }
}

/// One `(price, volume)` level of the order book.
///
/// Encoded on the wire as a 2-element JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct BookLevel(pub f64, pub f64);

impl BookLevel {
    pub fn price(&self) -> f64 {
        self.0
    }

    pub fn volume(&self) -> f64 {
        self.1
    }
}

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, TradeSide::Buy)
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tagged detection record (spoofing, liquidity gap, regime alert, ...)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Anomaly {
    /// Detector tag, e.g. "LAYERING", "LIQUIDITY_GAP", "HEAVY_IMBALANCE"
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    /// Detector-specific fields, kept as-is
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

/// Anomaly severity; unknown values decode as [`Severity::Other`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    #[serde(other)]
    Other,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Other => "other",
        }
    }
}

/// One paper trade executed by the backend strategy engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradeEvent {
    pub id: u64,
    #[serde(default, with = "iso8601::opt")]
    pub timestamp: Option<DateTime<Utc>>,
    pub side: TradeDirection,
    pub price: f64,
    pub size: f64,
    /// "ENTRY" opens a position, "EXIT" closes it
    #[serde(rename = "type")]
    pub kind: TradeKind,
    /// Model confidence behind an entry; exits carry none
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Realized PnL of an exit; zero for entries
    #[serde(default)]
    pub pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeDirection {
    Buy,
    Sell,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Buy => "BUY",
            TradeDirection::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeKind {
    Entry,
    Exit,
}

/// Strategy engine PnL mark, broadcast alongside trade events
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct PnlUpdate {
    pub realized: f64,
    pub unrealized: f64,
    pub total: f64,
    /// Signed position size (+long / -short / 0 flat)
    pub position: f64,
    pub is_active: bool,
}

/// Data source mode of the backend session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    /// Real exchange feed
    Live,
    /// Recorded data played back under client control
    Replay,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Live => "LIVE",
            Mode::Replay => "REPLAY",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Mode::Live => Mode::Replay,
            Mode::Replay => Mode::Live,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// ISO-8601 timestamps, tolerant of the naive (offset-less) form the
/// backend's `datetime.isoformat()` emits.
pub(crate) mod iso8601 {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|err| format!("invalid timestamp {raw:?}: {err}"))
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub mod opt {
        use super::*;

        pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match ts {
                Some(ts) => super::serialize(ts, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|raw| super::parse(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_decodes_full_payload() {
        let raw = r#"{
            "timestamp": "2025-11-04T10:15:30.123456",
            "mid_price": 100.25,
            "microprice": 100.31,
            "bids": [[100.2, 150], [100.1, 300]],
            "asks": [[100.3, 120], [100.4, 280]],
            "spread": 0.1,
            "trade_volume": 42,
            "trade_side": "buy",
            "last_trade_price": 100.3,
            "vpin": 0.41,
            "obi": -0.12,
            "ofi": 0.08,
            "divergence": 0.06,
            "regime": 1,
            "regime_label": "Stressed",
            "anomalies": [
                {"type": "HEAVY_IMBALANCE", "severity": "high", "message": "Heavy SELL Pressure (OBI: -0.62)"},
                {"type": "LIQUIDITY_GAP", "severity": "weird", "message": "Gap above best ask", "gap_size": 3.5}
            ]
        }"#;

        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.mid_price, 100.25);
        assert_eq!(snapshot.best_bid().unwrap().price(), 100.2);
        assert_eq!(snapshot.best_ask().unwrap().volume(), 120.0);
        assert!(snapshot.has_trade());
        assert_eq!(snapshot.trade_side, Some(TradeSide::Buy));
        assert_eq!(snapshot.regime_label.as_deref(), Some("Stressed"));

        assert_eq!(snapshot.anomalies.len(), 2);
        assert_eq!(snapshot.anomalies[0].severity, Severity::High);
        // Unknown severities degrade instead of failing the decode
        assert_eq!(snapshot.anomalies[1].severity, Severity::Other);
        assert_eq!(
            snapshot.anomalies[1].details.get("gap_size"),
            Some(&serde_json::json!(3.5))
        );
    }

    #[test]
    fn test_snapshot_optional_fields_absent() {
        let raw = r#"{
            "timestamp": "2025-11-04T10:15:30Z",
            "mid_price": 99.5,
            "microprice": 99.5,
            "bids": [],
            "asks": []
        }"#;

        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert!(!snapshot.has_trade());
        assert!(snapshot.vpin.is_none());
        assert!(snapshot.anomalies.is_empty());
        assert!(snapshot.best_bid().is_none());
    }

    #[test]
    fn test_timestamp_accepts_naive_and_offset_forms() {
        let naive = iso8601::parse("2025-11-04T10:15:30.500").unwrap();
        let offset = iso8601::parse("2025-11-04T10:15:30.500+00:00").unwrap();
        assert_eq!(naive, offset);

        assert!(iso8601::parse("not-a-timestamp").is_err());
    }

    #[test]
    fn test_trade_event_decodes() {
        let raw = r#"{
            "id": 3,
            "timestamp": "2025-11-04T10:15:31",
            "side": "SELL",
            "price": 100.2,
            "size": 1.0,
            "type": "EXIT",
            "pnl": 0.35
        }"#;

        let event: TradeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.side, TradeDirection::Sell);
        assert_eq!(event.kind, TradeKind::Exit);
        assert!(event.confidence.is_none());
        assert!((event.pnl - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mode_round_trip() {
        assert_eq!(Mode::Live.toggled(), Mode::Replay);
        assert_eq!(serde_json::to_string(&Mode::Replay).unwrap(), "\"REPLAY\"");
        let mode: Mode = serde_json::from_str("\"LIVE\"").unwrap();
        assert_eq!(mode, Mode::Live);
    }
}
