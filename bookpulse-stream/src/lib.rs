/// Bookpulse Stream - live market-snapshot stream client
///
/// Maintains a live, bounded, time-ordered sequence of market snapshots
/// fed by a long-lived WebSocket connection, survives disconnects via
/// reconnection with a fixed delay and a bounded attempt budget, and
/// exposes the latest snapshot plus a capped history to rendering
/// consumers without unbounded memory growth.
///
/// The library is composed of:
/// - Connection manager and drain task (`websocket`)
/// - Message classification and dispatch (`router`)
/// - Bounded FIFO containers (`buffer`)
/// - Replay/strategy REST control surface (`control`)
pub mod buffer;
pub mod config;
pub mod control;
pub mod error;
pub mod router;
pub mod types;
pub mod websocket;

// Re-export commonly used types for convenience
pub use buffer::{BoundedHistory, EventLog};
pub use config::StreamConfig;
pub use control::ControlClient;
pub use error::StreamError;
pub use router::{StreamMessage, StreamState};
pub use types::{
    Anomaly, BookLevel, Mode, PnlUpdate, Severity, Snapshot, TradeDirection, TradeEvent,
    TradeKind, TradeSide,
};
pub use websocket::{ConnectionStatus, StreamClient, StreamHandle};
