/// Terminal dashboard for the bookpulse live snapshot stream
///
/// Renders the order book, mid-price history, anomaly feed, and strategy
/// PnL from a shared [`StreamState`], and drives the backend's replay /
/// mode / strategy controls from the keyboard.
use std::{
    future::Future,
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use bookpulse_stream::{
    ConnectionStatus, ControlClient, Mode, Severity, StreamClient, StreamConfig, StreamError,
    StreamState, TradeKind,
};
use chrono::{DateTime, Utc};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, List, ListItem, Paragraph, Sparkline},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::warn;

/// Feed quiet for this long counts as stale in the status bar
const STALE_AFTER_SECS: i64 = 3;

/// Exchange symbol used when switching the session to LIVE
fn get_symbol() -> String {
    std::env::var("BOOKPULSE_SYMBOL").unwrap_or_else(|_| "BTCUSDT".to_string())
}

/// Log to a file when BOOKPULSE_LOG is set; the alternate screen owns
/// stdout, so console logging would corrupt the UI.
fn init_logging() {
    if let Ok(path) = std::env::var("BOOKPULSE_LOG") {
        if let Ok(file) = std::fs::File::create(path) {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
                )
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
    }
}

/// Transient status-bar notification
struct Notice {
    text: String,
    shown_at: Instant,
}

struct App {
    state: Arc<Mutex<StreamState>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    control: ControlClient,
    session_id: String,
    mode: Mode,
    playing: bool,
    speed: u32,
    symbol: String,
    notice: Option<Notice>,
    /// Failure reports from detached control calls, drained on each tick
    notice_tx: mpsc::UnboundedSender<String>,
    notice_rx: mpsc::UnboundedReceiver<String>,
}

impl App {
    fn notify(&mut self, text: impl Into<String>) {
        self.notice = Some(Notice {
            text: text.into(),
            shown_at: Instant::now(),
        });
    }

    fn active_notice(&self) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|n| n.shown_at.elapsed() < Duration::from_millis(2500))
            .map(|n| n.text.as_str())
    }

    /// Fire a control call without blocking the render loop; a failure
    /// comes back through the notice channel and replaces the optimistic
    /// confirmation in the status bar.
    fn fire(
        &self,
        action: &'static str,
        call: impl Future<Output = Result<(), StreamError>> + Send + 'static,
    ) {
        dispatch_control(action, self.notice_tx.clone(), call);
    }
}

fn dispatch_control(
    action: &'static str,
    notices: mpsc::UnboundedSender<String>,
    call: impl Future<Output = Result<(), StreamError>> + Send + 'static,
) {
    tokio::spawn(async move {
        if let Err(err) = call.await {
            warn!("{} failed: {}", action, err);
            let _ = notices.send(format!("{} failed: {}", action, err));
        }
    });
}

/// Seconds since the last accepted message, once the feed has been quiet
/// past the threshold. `None` while fresh or before the first message.
fn staleness_secs(last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    let age = (now - last_update?).num_seconds();
    (age >= STALE_AFTER_SECS).then_some(age)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    // Restore the terminal on crash
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic_info);
    }));

    let config = StreamConfig::from_env().with_start_on_connect(true);
    let session_id = config.session_id.clone();
    let control = ControlClient::new(&config);
    let state = Arc::new(Mutex::new(StreamState::new(
        config.history_capacity,
        config.event_log_capacity,
    )));

    let (handle, status_rx) = StreamClient::new(config).start(state.clone());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let app = App {
        state,
        status_rx,
        control,
        session_id,
        mode: Mode::Replay,
        playing: true,
        speed: 1,
        symbol: get_symbol(),
        notice: None,
        notice_tx,
        notice_rx,
    };

    let res = run_app(&mut terminal, app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    handle.disconnect().await;

    res?;
    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    mut app: App,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        while let Ok(text) = app.notice_rx.try_recv() {
            app.notify(text);
        }

        let state_snapshot = {
            let guard = app.state.lock().await;
            guard.clone()
        };
        let status = *app.status_rx.borrow();

        terminal.draw(|f| ui(f, &app, &state_snapshot, status))?;

        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if crossterm::event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                    KeyCode::Char(' ') => {
                        let control = app.control.clone();
                        if app.playing {
                            app.fire("pause", async move { control.pause_replay().await });
                            app.notify("replay paused");
                        } else {
                            app.fire("resume", async move { control.resume_replay().await });
                            app.notify("replay resumed");
                        }
                        app.playing = !app.playing;
                    }
                    KeyCode::Char(c @ ('1' | '2' | '3')) => {
                        let speed = match c {
                            '1' => 1,
                            '2' => 5,
                            _ => 10,
                        };
                        app.speed = speed;
                        let control = app.control.clone();
                        app.fire("set speed", async move { control.set_speed(speed).await });
                        app.notify(format!("speed {}x", speed));
                    }
                    KeyCode::Char('b') => {
                        // Rewind, then reset-then-repopulate: the backend
                        // resends history for the new cursor position
                        let control = app.control.clone();
                        app.fire("go back", async move { control.go_back(30.0).await });
                        app.state.lock().await.reset();
                        app.notify("rewound 30s");
                    }
                    KeyCode::Char('m') => {
                        let mode = app.mode.toggled();
                        app.mode = mode;
                        let control = app.control.clone();
                        let symbol = app.symbol.clone();
                        app.fire("set mode", async move {
                            let symbol = matches!(mode, Mode::Live).then_some(symbol);
                            control.set_mode(mode, symbol.as_deref()).await
                        });
                        app.state.lock().await.reset();
                        app.notify(format!("mode {}", mode));
                    }
                    KeyCode::Char('s') => {
                        let control = app.control.clone();
                        app.fire("strategy start", async move {
                            control.strategy_start().await
                        });
                        app.notify("strategy started");
                    }
                    KeyCode::Char('x') => {
                        let control = app.control.clone();
                        app.fire("strategy stop", async move { control.strategy_stop().await });
                        app.notify("strategy stopped");
                    }
                    KeyCode::Char('r') => {
                        let control = app.control.clone();
                        app.fire("strategy reset", async move {
                            control.strategy_reset().await
                        });
                        let mut guard = app.state.lock().await;
                        guard.events.reset();
                        guard.pnl = None;
                        drop(guard);
                        app.notify("strategy reset");
                    }
                    _ => {}
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }
}

fn ui(f: &mut Frame, app: &App, state: &StreamState, status: ConnectionStatus) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(size);

    render_status_bar(f, chunks[0], app, state, status);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .margin(1)
        .split(chunks[1]);

    // Left column: order book (top), anomaly feed (bottom)
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(main_chunks[0]);

    render_book(f, left_chunks[0], state);
    render_anomalies(f, left_chunks[1], state);

    // Right column: mid-price history, strategy PnL, trade log
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(35),
            Constraint::Percentage(25),
            Constraint::Percentage(40),
        ])
        .split(main_chunks[1]);

    render_price(f, right_chunks[0], state);
    render_pnl(f, right_chunks[1], state);
    render_trades(f, right_chunks[2], state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App, state: &StreamState, status: ConnectionStatus) {
    let status_color = match status {
        ConnectionStatus::Connected => Color::Rgb(0, 255, 127),
        ConnectionStatus::Connecting => Color::Rgb(255, 215, 0),
        ConnectionStatus::Disconnected => Color::Rgb(255, 165, 0),
        ConnectionStatus::Failed => Color::Rgb(255, 69, 58),
    };
    let status_symbol = if status.is_connected() { "●" } else { "○" };

    let mut spans = vec![
        Span::styled(
            format!(" {} {} ", status_symbol, status.label()),
            Style::default()
                .fg(status_color)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(" {} {}x ", app.mode, app.speed),
            Style::default().fg(Color::Rgb(100, 149, 237)),
        ),
        Span::styled(
            format!(" buf {}/{} ", state.history.len(), state.history.capacity()),
            Style::default().fg(Color::Rgb(138, 43, 226)),
        ),
        Span::styled(
            format!(" sess {} ", app.session_id),
            Style::default().fg(Color::Rgb(128, 128, 128)),
        ),
    ];

    if state.dropped_messages > 0 {
        spans.push(Span::styled(
            format!(" dropped {} ", state.dropped_messages),
            Style::default().fg(Color::Rgb(255, 69, 58)),
        ));
    }

    if status.is_connected() {
        if let Some(age) = staleness_secs(state.last_update, Utc::now()) {
            spans.push(Span::styled(
                format!(" stale {}s ", age),
                Style::default().fg(Color::Rgb(255, 165, 0)),
            ));
        }
    }

    if status == ConnectionStatus::Failed {
        spans.push(Span::styled(
            " stream lost - restart to reconnect ",
            Style::default()
                .fg(Color::Rgb(255, 69, 58))
                .add_modifier(Modifier::BOLD),
        ));
    } else if let Some(notice) = app.active_notice() {
        spans.push(Span::styled(
            format!(" {} ", notice),
            Style::default().fg(Color::Rgb(255, 215, 0)),
        ));
    }

    spans.push(Span::styled(
        " [space] play/pause [1-3] speed [b] back [m] mode [s/x/r] strategy [q] quit ",
        Style::default().fg(Color::Rgb(128, 128, 128)),
    ));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Double)
        .border_style(Style::default().fg(Color::Rgb(138, 43, 226)));

    let paragraph = Paragraph::new(Line::from(spans))
        .block(block)
        .alignment(Alignment::Center);

    f.render_widget(paragraph, area);
}

fn render_book(f: &mut Frame, area: Rect, state: &StreamState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" ORDER BOOK ")
        .border_style(Style::default().fg(Color::Rgb(100, 149, 237)));

    let Some(snapshot) = state.history.latest() else {
        let placeholder = Paragraph::new("waiting for snapshots...")
            .block(block)
            .style(Style::default().fg(Color::Rgb(128, 128, 128)));
        f.render_widget(placeholder, area);
        return;
    };

    let depth = ((area.height.saturating_sub(3)) as usize / 2).min(10);
    let max_volume = snapshot
        .bids
        .iter()
        .chain(snapshot.asks.iter())
        .take(depth * 2)
        .map(|level| level.volume())
        .fold(0.0_f64, f64::max)
        .max(1.0);

    let mut lines: Vec<Line> = Vec::new();

    // Asks render top-down so the spread sits in the middle
    for level in snapshot.asks.iter().take(depth).rev() {
        lines.push(book_line(level.price(), level.volume(), max_volume, false));
    }
    lines.push(Line::from(Span::styled(
        format!(
            "  mid {:.2}  micro {:.2}  spread {:.4}",
            snapshot.mid_price,
            snapshot.microprice,
            snapshot.spread.unwrap_or(0.0),
        ),
        Style::default()
            .fg(Color::Rgb(255, 215, 0))
            .add_modifier(Modifier::BOLD),
    )));
    for level in snapshot.bids.iter().take(depth) {
        lines.push(book_line(level.price(), level.volume(), max_volume, true));
    }

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn book_line(price: f64, volume: f64, max_volume: f64, is_bid: bool) -> Line<'static> {
    let color = if is_bid {
        Color::Rgb(0, 255, 127)
    } else {
        Color::Rgb(255, 69, 58)
    };
    let bar_len = ((volume / max_volume) * 20.0).round() as usize;
    Line::from(Span::styled(
        format!("  {:>10.2} {:>8.0} {}", price, volume, "█".repeat(bar_len)),
        Style::default().fg(color),
    ))
}

fn render_price(f: &mut Frame, area: Rect, state: &StreamState) {
    let mids: Vec<f64> = state.history.iter().map(|s| s.mid_price).collect();
    let title = match state.history.latest() {
        Some(snapshot) => format!(
            " MID PRICE {:.2} ({}) ",
            snapshot.mid_price,
            snapshot.regime_label.as_deref().unwrap_or("-"),
        ),
        None => " MID PRICE ".to_string(),
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Rgb(100, 149, 237)));

    // Sparkline wants u64 heights; rescale the window into 0..=100
    let min = mids.iter().copied().fold(f64::INFINITY, f64::min);
    let max = mids.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = (max - min).max(f64::EPSILON);
    let data: Vec<u64> = mids
        .iter()
        .map(|mid| (((mid - min) / span) * 100.0) as u64 + 1)
        .collect();

    let sparkline = Sparkline::default()
        .block(block)
        .data(&data)
        .style(Style::default().fg(Color::Rgb(0, 255, 127)));
    f.render_widget(sparkline, area);
}

fn render_anomalies(f: &mut Frame, area: Rect, state: &StreamState) {
    let capacity = area.height.saturating_sub(2) as usize;

    // Newest snapshots first; each may carry several detections
    let items: Vec<ListItem> = state
        .history
        .iter()
        .rev()
        .flat_map(|snapshot| {
            snapshot
                .anomalies
                .iter()
                .map(move |anomaly| (snapshot.timestamp, anomaly))
        })
        .take(capacity)
        .map(|(timestamp, anomaly)| {
            let style = match anomaly.severity {
                Severity::Critical => Style::default()
                    .fg(Color::Rgb(255, 69, 58))
                    .add_modifier(Modifier::BOLD),
                Severity::High => Style::default().fg(Color::Rgb(255, 69, 58)),
                Severity::Medium => Style::default().fg(Color::Rgb(255, 215, 0)),
                Severity::Other => Style::default().fg(Color::Rgb(128, 128, 128)),
            };
            ListItem::new(Line::from(Span::styled(
                format!(
                    " {} {:<18} {}",
                    timestamp.format("%H:%M:%S"),
                    anomaly.kind,
                    anomaly.message,
                ),
                style,
            )))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" ANOMALY FEED ")
            .border_style(Style::default().fg(Color::Rgb(255, 165, 0))),
    );
    f.render_widget(list, area);
}

fn render_pnl(f: &mut Frame, area: Rect, state: &StreamState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" STRATEGY PNL ")
        .border_style(Style::default().fg(Color::Rgb(138, 43, 226)));

    let Some(pnl) = &state.pnl else {
        let placeholder = Paragraph::new("strategy idle")
            .block(block)
            .style(Style::default().fg(Color::Rgb(128, 128, 128)));
        f.render_widget(placeholder, area);
        return;
    };

    let pnl_color = |value: f64| {
        if value >= 0.0 {
            Color::Rgb(0, 255, 127)
        } else {
            Color::Rgb(255, 69, 58)
        }
    };
    let position = match pnl.position {
        p if p > 0.0 => format!("LONG {:.1}", p),
        p if p < 0.0 => format!("SHORT {:.1}", p.abs()),
        _ => "FLAT".to_string(),
    };

    let lines = vec![
        Line::from(vec![
            Span::raw(" total     "),
            Span::styled(
                format!("{:+.2}", pnl.total),
                Style::default()
                    .fg(pnl_color(pnl.total))
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(vec![
            Span::raw(" realized  "),
            Span::styled(format!("{:+.2}", pnl.realized), Style::default().fg(pnl_color(pnl.realized))),
        ]),
        Line::from(vec![
            Span::raw(" unrealized"),
            Span::styled(
                format!(" {:+.2}", pnl.unrealized),
                Style::default().fg(pnl_color(pnl.unrealized)),
            ),
        ]),
        Line::from(vec![
            Span::raw(" position  "),
            Span::styled(position, Style::default().fg(Color::Rgb(100, 149, 237))),
            Span::styled(
                if pnl.is_active { "  ACTIVE" } else { "  STOPPED" },
                Style::default().fg(Color::Rgb(128, 128, 128)),
            ),
        ]),
    ];

    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_trades(f: &mut Frame, area: Rect, state: &StreamState) {
    let capacity = area.height.saturating_sub(2) as usize;

    let items: Vec<ListItem> = state
        .events
        .iter()
        .take(capacity)
        .map(|trade| {
            let time = trade
                .timestamp
                .map(|ts| ts.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "--:--:--".to_string());
            let line = match trade.kind {
                TradeKind::Entry => Span::styled(
                    format!(
                        " {} ENTRY {} @ {:.2} x{:.1} conf {:.2}",
                        time,
                        trade.side.as_str(),
                        trade.price,
                        trade.size,
                        trade.confidence.unwrap_or(0.0),
                    ),
                    Style::default().fg(Color::Rgb(100, 149, 237)),
                ),
                TradeKind::Exit => {
                    let color = if trade.pnl >= 0.0 {
                        Color::Rgb(0, 255, 127)
                    } else {
                        Color::Rgb(255, 69, 58)
                    };
                    Span::styled(
                        format!(
                            " {} EXIT  {} @ {:.2} x{:.1} pnl {:+.2}",
                            time,
                            trade.side.as_str(),
                            trade.price,
                            trade.size,
                            trade.pnl,
                        ),
                        Style::default().fg(color),
                    )
                }
            };
            ListItem::new(Line::from(line))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" STRATEGY TRADES ")
            .border_style(Style::default().fg(Color::Rgb(100, 149, 237))),
    );
    f.render_widget(list, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_control_call_reports_through_notice_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatch_control("pause", tx, async {
            Err(StreamError::Control("HTTP 503".to_string()))
        });

        let text = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("no notice arrived")
            .expect("notice channel closed without a report");
        assert!(text.contains("pause failed"), "got notice {text:?}");
        assert!(text.contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_successful_control_call_stays_silent() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatch_control("resume", tx, async { Ok(()) });

        // The spawned task drops the sender when done; the channel closes
        // without delivering anything
        let outcome = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("control task never finished");
        assert!(outcome.is_none());
    }

    #[test]
    fn test_staleness_only_reported_past_threshold() {
        let now = Utc::now();
        assert_eq!(staleness_secs(None, now), None);
        assert_eq!(
            staleness_secs(Some(now - chrono::Duration::seconds(1)), now),
            None
        );
        assert_eq!(
            staleness_secs(Some(now - chrono::Duration::seconds(10)), now),
            Some(10)
        );
    }
}
