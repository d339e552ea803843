/// WebSocket client for the live snapshot stream
///
/// Owns the connection lifecycle: reconnection with a fixed delay and a
/// bounded attempt budget, session identity, and the hand-off of raw
/// frames to the drain task. Payloads are never parsed here; frames go to
/// the message router unchanged.
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::control::ControlClient;
use crate::error::StreamError;
use crate::router::StreamState;

/// Connection status updates published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connection attempt is in flight
    Connecting,
    Connected,
    /// Closed without intent; a reconnect is pending unless the budget
    /// is spent
    Disconnected,
    /// Reconnect budget exhausted or the endpoint is unusable; manual
    /// intervention required
    Failed,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Disconnected => "DISCONNECTED",
            ConnectionStatus::Failed => "FAILED",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Live snapshot stream client.
///
/// `start` spawns the connection loop and the interval-batched drain task
/// that applies arrived frames to the shared [`StreamState`].
pub struct StreamClient {
    config: StreamConfig,
}

impl StreamClient {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    /// Start the client against `state`.
    ///
    /// Returns a handle for intentional teardown and a receiver for
    /// connection status updates. Exactly one connection is held at a
    /// time; one replacement per reconnect cycle.
    pub fn start(
        self,
        state: Arc<Mutex<StreamState>>,
    ) -> (StreamHandle, watch::Receiver<ConnectionStatus>) {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (frame_tx, frame_rx) = mpsc::channel::<String>(self.config.channel_buffer_size);

        let drain = tokio::spawn(run_drain_loop(
            state,
            frame_rx,
            self.config.drain_interval,
            shutdown_rx.clone(),
        ));
        let connection = tokio::spawn(run_connection_loop(
            self.config,
            frame_tx,
            status_tx,
            shutdown_rx,
        ));

        (
            StreamHandle {
                shutdown: shutdown_tx,
                connection,
                drain,
            },
            status_rx,
        )
    }
}

/// Handle for tearing the client down.
///
/// `disconnect` marks the close intentional: it cancels any pending
/// reconnect sleep and the drain timer, closes the active connection, and
/// guarantees no further connection attempts.
pub struct StreamHandle {
    shutdown: watch::Sender<bool>,
    connection: JoinHandle<()>,
    drain: JoinHandle<()>,
}

impl StreamHandle {
    pub async fn disconnect(self) {
        let _ = self.shutdown.send(true);
        let _ = self.connection.await;
        let _ = self.drain.await;
    }
}

/// Main connection loop with bounded auto-reconnect.
async fn run_connection_loop(
    config: StreamConfig,
    frame_tx: mpsc::Sender<String>,
    status_tx: watch::Sender<ConnectionStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let url = config.session_ws_url();
    let control = config
        .start_on_connect
        .then(|| ControlClient::new(&config));
    info!("starting stream client for {}", url);

    let mut attempts: u32 = 0;

    loop {
        let _ = status_tx.send(ConnectionStatus::Connecting);

        let connect = tokio::select! {
            result = connect_async(&url) => result,
            _ = shutdown.changed() => break,
        };
        if *shutdown.borrow() {
            break;
        }

        match connect {
            Ok((ws_stream, _)) => {
                info!("connected to stream at {}", url);
                attempts = 0;
                let _ = status_tx.send(ConnectionStatus::Connected);

                // Resume backend emission for this session
                if let Some(control) = &control {
                    if let Err(err) = control.start_replay().await {
                        warn!("replay start after connect failed: {}", err);
                    }
                }

                let (mut write, mut read) = ws_stream.split();

                // Keep-alive ping task; stopped when this connection ends
                let ping_interval = config.ping_interval;
                let (ping_shutdown_tx, mut ping_shutdown_rx) = mpsc::channel::<()>(1);
                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(ping_interval);
                    loop {
                        tokio::select! {
                            _ = interval.tick() => {
                                if write.send(Message::Ping(vec![].into())).await.is_err() {
                                    debug!("failed to send ping, connection likely dead");
                                    break;
                                }
                            }
                            _ = ping_shutdown_rx.recv() => break,
                        }
                    }
                });

                let mut consumer_gone = false;
                loop {
                    tokio::select! {
                        msg = read.next() => {
                            let Some(msg) = msg else {
                                break;
                            };
                            match msg {
                                Ok(Message::Text(text)) => {
                                    // Raw hand-off; decoding happens on the
                                    // drain side of the queue
                                    if frame_tx.send(text.to_string()).await.is_err() {
                                        warn!("frame receiver dropped, stopping client");
                                        consumer_gone = true;
                                        break;
                                    }
                                }
                                Ok(Message::Close(_)) => {
                                    info!("server closed connection");
                                    break;
                                }
                                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                                    // Heartbeat frames, handled by tungstenite
                                }
                                Err(e) => {
                                    error!("websocket error: {}", StreamError::from(e));
                                    break;
                                }
                                _ => {}
                            }
                        }
                        _ = shutdown.changed() => break,
                    }
                }

                let _ = ping_shutdown_tx.send(()).await;
                let _ = status_tx.send(ConnectionStatus::Disconnected);

                if consumer_gone {
                    return;
                }
            }
            Err(e) => {
                let err = StreamError::from(e);
                error!("failed to connect to {}: {}", url, err);
                // A rejected URL fails every future attempt the same way;
                // only transport errors go through the reconnect cycle
                if err.is_terminal() {
                    let _ = status_tx.send(ConnectionStatus::Failed);
                    return;
                }
                let _ = status_tx.send(ConnectionStatus::Disconnected);
            }
        }

        if *shutdown.borrow() {
            break;
        }

        // Every non-intentional close counts against the budget, whatever
        // its cause
        attempts += 1;
        if attempts >= config.max_reconnect_attempts {
            let err = StreamError::ReconnectExhausted { attempts };
            error!("{}", err);
            let _ = status_tx.send(ConnectionStatus::Failed);
            return;
        }

        debug!(
            "waiting {:?} before reconnect attempt {}",
            config.reconnect_delay, attempts
        );
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }
    }

    debug!("stream client shut down");
}

/// Drain arrived frames into the shared state in interval batches,
/// decoupling arrival rate from render rate.
async fn run_drain_loop(
    state: Arc<Mutex<StreamState>>,
    mut frame_rx: mpsc::Receiver<String>,
    drain_interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(drain_interval);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let (batch, producer_gone) = take_pending(&mut frame_rx);
                if !batch.is_empty() {
                    let mut guard = state.lock().await;
                    for raw in &batch {
                        guard.ingest(raw);
                    }
                }
                if producer_gone {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Swap-and-clear hand-off: empty the queue without blocking.
fn take_pending(frame_rx: &mut mpsc::Receiver<String>) -> (Vec<String>, bool) {
    let mut batch = Vec::new();
    loop {
        match frame_rx.try_recv() {
            Ok(raw) => batch.push(raw),
            Err(mpsc::error::TryRecvError::Empty) => return (batch, false),
            Err(mpsc::error::TryRecvError::Disconnected) => return (batch, true),
        }
    }
}
