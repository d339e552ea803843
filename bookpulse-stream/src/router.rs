//! Inbound message classification and dispatch.
//!
//! The backend distinguishes payload kinds with an optional `type` field;
//! snapshots carry no discriminator at all. [`StreamMessage::decode`] makes
//! that implicit union explicit so the rest of the crate never inspects raw
//! JSON, and [`StreamState`] is the single sink the drain task feeds.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::buffer::{BoundedHistory, EventLog};
use crate::error::StreamError;
use crate::types::{PnlUpdate, Snapshot, TradeEvent};

/// One decoded inbound message, classified by kind.
#[derive(Debug, Clone)]
pub enum StreamMessage {
    /// Full history replacement: `{"type": "history", "data": [...]}`
    History(Vec<Snapshot>),
    /// Incremental snapshot (no `type` discriminator on the wire)
    Snapshot(Box<Snapshot>),
    /// Strategy paper trade: `{"type": "trade_event", "data": {...}}`
    TradeEvent(TradeEvent),
    /// Strategy PnL mark: `{"type": "pnl_update", "data": {...}}`
    PnlUpdate(PnlUpdate),
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

impl StreamMessage {
    /// Classify and decode one raw text frame.
    ///
    /// Any payload whose `type` is absent or unrecognized is treated as a
    /// single snapshot; a structural decode failure is reported as
    /// [`StreamError::Decode`], never a panic.
    pub fn decode(raw: &str) -> Result<Self, StreamError> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        match value.get("type").and_then(|t| t.as_str()) {
            Some("history") => {
                let envelope: Envelope<Vec<Snapshot>> = serde_json::from_value(value)?;
                Ok(StreamMessage::History(envelope.data))
            }
            Some("trade_event") => {
                let envelope: Envelope<TradeEvent> = serde_json::from_value(value)?;
                Ok(StreamMessage::TradeEvent(envelope.data))
            }
            Some("pnl_update") => {
                let envelope: Envelope<PnlUpdate> = serde_json::from_value(value)?;
                Ok(StreamMessage::PnlUpdate(envelope.data))
            }
            _ => {
                let snapshot: Snapshot = serde_json::from_value(value)?;
                Ok(StreamMessage::Snapshot(Box::new(snapshot)))
            }
        }
    }
}

/// Shared sink for everything the stream delivers.
///
/// Mutated only by the drain task (single logical thread of control);
/// renderers clone it on their own tick and scan the buffers linearly.
#[derive(Debug, Clone)]
pub struct StreamState {
    /// Time-ordered snapshot history, FIFO at fixed capacity
    pub history: BoundedHistory<Snapshot>,
    /// Strategy trades, newest-first
    pub events: EventLog<TradeEvent>,
    /// Latest strategy PnL mark
    pub pnl: Option<PnlUpdate>,
    /// Count of malformed frames dropped by the router
    pub dropped_messages: u64,
    /// Arrival time of the most recent accepted message
    pub last_update: Option<DateTime<Utc>>,
}

impl StreamState {
    pub fn new(history_capacity: usize, event_log_capacity: usize) -> Self {
        Self {
            history: BoundedHistory::new(history_capacity),
            events: EventLog::new(event_log_capacity),
            pnl: None,
            dropped_messages: 0,
            last_update: None,
        }
    }

    /// Decode one raw frame and apply it, dropping malformed payloads.
    ///
    /// Consumers always observe either a valid updated state or an
    /// unchanged one; decode failures only bump `dropped_messages`.
    pub fn ingest(&mut self, raw: &str) {
        match StreamMessage::decode(raw) {
            Ok(message) => self.apply(message),
            Err(err) => {
                self.dropped_messages += 1;
                warn!("dropping malformed stream message: {}", err);
            }
        }
    }

    /// Route one decoded message into the matching sink.
    pub fn apply(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::History(snapshots) => self.history.replace_all(snapshots),
            StreamMessage::Snapshot(snapshot) => self.history.append(*snapshot),
            StreamMessage::TradeEvent(event) => self.events.push(event),
            StreamMessage::PnlUpdate(pnl) => self.pnl = Some(pnl),
        }
        self.last_update = Some(Utc::now());
    }

    /// Clear all buffers; issued by callers after a mode switch or rewind
    /// before the backend repopulates the session.
    pub fn reset(&mut self) {
        self.history.reset();
        self.events.reset();
        self.pnl = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_json(mid: f64) -> String {
        format!(
            r#"{{"timestamp": "2025-11-04T10:00:00", "mid_price": {mid}, "microprice": {mid}, "bids": [[{}, 10]], "asks": [[{}, 10]]}}"#,
            mid - 0.05,
            mid + 0.05,
        )
    }

    fn history_json(mids: impl Iterator<Item = f64>) -> String {
        let items: Vec<String> = mids.map(snapshot_json).collect();
        format!(r#"{{"type": "history", "data": [{}]}}"#, items.join(","))
    }

    #[test]
    fn test_untyped_payload_decodes_as_snapshot() {
        let message = StreamMessage::decode(&snapshot_json(100.0)).unwrap();
        assert!(matches!(message, StreamMessage::Snapshot(_)));
    }

    #[test]
    fn test_history_replaces_and_truncates() {
        let mut state = StreamState::new(100, 50);
        state.ingest(&snapshot_json(1.0));

        // 150 incoming snapshots against capacity 100: keep the newest 100
        state.ingest(&history_json((0..150).map(|n| n as f64)));
        assert_eq!(state.history.len(), 100);
        assert_eq!(state.history.iter().next().unwrap().mid_price, 50.0);
        assert_eq!(state.history.latest().unwrap().mid_price, 149.0);
    }

    #[test]
    fn test_snapshot_appends_and_becomes_latest() {
        let mut state = StreamState::new(3, 50);
        for mid in [1.0, 2.0, 3.0, 4.0] {
            state.ingest(&snapshot_json(mid));
        }

        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history.latest().unwrap().mid_price, 4.0);
        assert_eq!(state.dropped_messages, 0);
    }

    #[test]
    fn test_trade_event_goes_to_event_log_not_history() {
        let mut state = StreamState::new(100, 50);
        state.ingest(
            r#"{"type": "trade_event", "data": {"id": 1, "side": "BUY", "price": 100.3, "size": 1.0, "type": "ENTRY", "confidence": 0.31, "pnl": 0.0}}"#,
        );

        assert_eq!(state.events.len(), 1);
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_pnl_update_replaces_latest_mark() {
        let mut state = StreamState::new(100, 50);
        state.ingest(
            r#"{"type": "pnl_update", "data": {"realized": 1.5, "unrealized": -0.2, "total": 1.3, "position": 1.0, "is_active": true}}"#,
        );
        state.ingest(
            r#"{"type": "pnl_update", "data": {"realized": 2.0, "unrealized": 0.0, "total": 2.0, "position": 0.0, "is_active": true}}"#,
        );

        let pnl = state.pnl.unwrap();
        assert!((pnl.total - 2.0).abs() < f64::EPSILON);
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_malformed_payloads_are_dropped_in_place() {
        let mut state = StreamState::new(100, 50);
        state.ingest(&snapshot_json(100.0));

        let len_before = state.history.len();
        let latest_before = state.history.latest().unwrap().mid_price;

        // Non-JSON, JSON missing required fields, and a corrupt history batch
        state.ingest("not json at all");
        state.ingest(r#"{"timestamp": "2025-11-04T10:00:00"}"#);
        state.ingest(r#"{"type": "history", "data": "nope"}"#);

        assert_eq!(state.history.len(), len_before);
        assert_eq!(state.history.latest().unwrap().mid_price, latest_before);
        assert_eq!(state.dropped_messages, 3);
    }

    #[test]
    fn test_reset_clears_every_sink() {
        let mut state = StreamState::new(100, 50);
        state.ingest(&snapshot_json(100.0));
        state.ingest(
            r#"{"type": "pnl_update", "data": {"realized": 1.0, "unrealized": 0.0, "total": 1.0, "position": 0.0, "is_active": false}}"#,
        );

        state.reset();
        assert!(state.history.is_empty());
        assert!(state.events.is_empty());
        assert!(state.pnl.is_none());
    }
}
