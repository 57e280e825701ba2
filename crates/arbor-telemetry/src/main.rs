//! arbor-telemetry — terminal dashboard for running arbor games.
//!
//! Listens for the JSON snapshots a game built with the `diagnostics`
//! feature sends to UDP `127.0.0.1:9100` and shows them live in a
//! btop-style ratatui dashboard.
//!
//! Start the game, then run `cargo run -p arbor-telemetry`.

use std::collections::VecDeque;
use std::io;
use std::net::UdpSocket;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Sparkline};
use serde::Deserialize;

const LISTEN_ADDR: &str = "127.0.0.1:9100";

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Deserialize, Default, Clone)]
#[serde(default)]
struct DiagSnapshot {
    fps: f32,
    delta_ms: f32,
    frame_count: u64,
    uptime_secs: f32,
    node_count: usize,
    render_order_len: usize,
    render_rebuilds: u64,
    mailbox_depth: usize,
    mail_drained: usize,
    mail_delivered: usize,
    draw_commands: usize,
    collider_count: usize,
    colliders_enabled: usize,
    pulses: PulseTimings,
    tree: Vec<NodeRow>,
    logs: Vec<LogEntry>,
}

#[derive(Deserialize, Default, Clone, Copy)]
#[serde(default)]
struct PulseTimings {
    event_us: f64,
    time_us: f64,
    mail_us: f64,
    render_us: f64,
}

impl PulseTimings {
    fn total_us(&self) -> f64 {
        self.event_us + self.time_us + self.mail_us + self.render_us
    }
}

#[derive(Deserialize, Clone)]
struct NodeRow {
    name: String,
    depth: usize,
    layer: i32,
    valves: [bool; 4],
}

impl NodeRow {
    /// `e`/`t`/`m`/`r` per open valve, `-` per closed one.
    fn valve_flags(&self) -> String {
        self.valves
            .iter()
            .zip(['e', 't', 'm', 'r'])
            .map(|(open, c)| if *open { c } else { '-' })
            .collect()
    }
}

#[derive(Deserialize, Clone)]
struct LogEntry {
    level: String,
    #[serde(default)]
    target: String,
    message: String,
    timestamp_secs: f32,
}

// ── Tabs ─────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tab {
    Overview,
    Tree,
    Logs,
}

impl Tab {
    const ALL: [Tab; 3] = [Tab::Overview, Tab::Tree, Tab::Logs];

    fn next(self) -> Self {
        match self {
            Tab::Overview => Tab::Tree,
            Tab::Tree => Tab::Logs,
            Tab::Logs => Tab::Overview,
        }
    }

    fn prev(self) -> Self {
        match self {
            Tab::Overview => Tab::Logs,
            Tab::Tree => Tab::Overview,
            Tab::Logs => Tab::Tree,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Tab::Overview => "Overview",
            Tab::Tree => "Tree",
            Tab::Logs => "Logs",
        }
    }
}

// ── Log level filter ────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LogFilter {
    All,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogFilter {
    fn next(self) -> Self {
        match self {
            LogFilter::All => LogFilter::Debug,
            LogFilter::Debug => LogFilter::Info,
            LogFilter::Info => LogFilter::Warn,
            LogFilter::Warn => LogFilter::Error,
            LogFilter::Error => LogFilter::All,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LogFilter::All => "ALL",
            LogFilter::Debug => "DEBUG+",
            LogFilter::Info => "INFO+",
            LogFilter::Warn => "WARN+",
            LogFilter::Error => "ERROR",
        }
    }

    fn passes(self, level: &str) -> bool {
        match self {
            LogFilter::All => true,
            LogFilter::Debug => level != "TRACE",
            LogFilter::Info => matches!(level, "INFO" | "WARN" | "ERROR"),
            LogFilter::Warn => matches!(level, "WARN" | "ERROR"),
            LogFilter::Error => level == "ERROR",
        }
    }
}

// ── App state ────────────────────────────────────────────────────────────

const HISTORY_CAP: usize = 1200;
const LOG_CAP: usize = 2000;
/// One frame at 60 Hz.
const FRAME_BUDGET_US: f64 = 16_666.0;

struct App {
    latest: DiagSnapshot,
    fps_history: VecDeque<u64>,
    delta_history: VecDeque<u64>,
    /// Mail drained per snapshot.
    mail_history: VecDeque<u64>,
    active_tab: Tab,
    paused: bool,
    connected: bool,

    tree_scroll: usize,

    log_entries: VecDeque<LogEntry>,
    log_filter: LogFilter,
    log_auto_scroll: bool,
    log_scroll: usize,
}

impl App {
    fn new() -> Self {
        Self {
            latest: DiagSnapshot::default(),
            fps_history: VecDeque::with_capacity(HISTORY_CAP),
            delta_history: VecDeque::with_capacity(HISTORY_CAP),
            mail_history: VecDeque::with_capacity(HISTORY_CAP),
            active_tab: Tab::Overview,
            paused: false,
            connected: false,
            tree_scroll: 0,
            log_entries: VecDeque::with_capacity(LOG_CAP),
            log_filter: LogFilter::Info,
            log_auto_scroll: true,
            log_scroll: 0,
        }
    }

    fn push_snapshot(&mut self, mut snap: DiagSnapshot) {
        if self.paused {
            return;
        }

        push_capped(&mut self.fps_history, snap.fps.round().max(0.0) as u64);
        push_capped(
            &mut self.delta_history,
            (snap.delta_ms * 1000.0).round().max(0.0) as u64,
        );
        push_capped(&mut self.mail_history, snap.mail_drained as u64);

        for entry in snap.logs.drain(..) {
            if self.log_entries.len() >= LOG_CAP {
                self.log_entries.pop_front();
            }
            self.log_entries.push_back(entry);
        }

        self.tree_scroll = self.tree_scroll.min(snap.tree.len().saturating_sub(1));
        self.latest = snap;
        self.connected = true;
    }

    fn log_counts(&self) -> [usize; 5] {
        let mut counts = [0; 5];
        for entry in &self.log_entries {
            let slot = match entry.level.as_str() {
                "TRACE" => 0,
                "DEBUG" => 1,
                "INFO" => 2,
                "WARN" => 3,
                "ERROR" => 4,
                _ => continue,
            };
            counts[slot] += 1;
        }
        counts
    }

    fn filtered_logs(&self) -> Vec<&LogEntry> {
        self.log_entries
            .iter()
            .filter(|e| self.log_filter.passes(&e.level))
            .collect()
    }
}

fn push_capped(history: &mut VecDeque<u64>, value: u64) {
    if history.len() >= HISTORY_CAP {
        history.pop_front();
    }
    history.push_back(value);
}

// ── Main ─────────────────────────────────────────────────────────────────

fn main() -> io::Result<()> {
    let socket = UdpSocket::bind(LISTEN_ADDR).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("cannot bind {LISTEN_ADDR} ({e}); is another arbor-telemetry running?"),
        )
    })?;
    socket.set_nonblocking(true)?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run(&mut terminal, &socket);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, socket: &UdpSocket) -> io::Result<()> {
    let mut app = App::new();
    let mut buf = vec![0u8; 65536];

    loop {
        while let Ok(n) = socket.recv(&mut buf) {
            if let Ok(snap) = serde_json::from_slice::<DiagSnapshot>(&buf[..n]) {
                app.push_snapshot(snap);
            }
        }

        terminal.draw(|f| ui(f, &app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if handle_key(&mut app, key) {
                    return Ok(());
                }
            }
        }
    }
}

// ── Key handling ─────────────────────────────────────────────────────────

/// Returns `true` if the app should quit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => return true,
        KeyCode::Char('p') => app.paused = !app.paused,

        KeyCode::Char('1') => app.active_tab = Tab::Overview,
        KeyCode::Char('2') => app.active_tab = Tab::Tree,
        KeyCode::Char('3') => app.active_tab = Tab::Logs,
        KeyCode::Tab => app.active_tab = app.active_tab.next(),
        KeyCode::BackTab => app.active_tab = app.active_tab.prev(),

        KeyCode::Up if app.active_tab == Tab::Tree => {
            app.tree_scroll = app.tree_scroll.saturating_sub(1);
        }
        KeyCode::Down if app.active_tab == Tab::Tree => {
            if app.tree_scroll + 1 < app.latest.tree.len() {
                app.tree_scroll += 1;
            }
        }

        KeyCode::Char('l') if app.active_tab == Tab::Logs => {
            app.log_filter = app.log_filter.next();
        }
        KeyCode::Char('g') if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = !app.log_auto_scroll;
        }
        KeyCode::Up if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll = app.log_scroll.saturating_sub(1);
        }
        KeyCode::Down if app.active_tab == Tab::Logs => {
            app.log_auto_scroll = false;
            app.log_scroll += 1;
        }

        _ => {}
    }
    false
}

// ── Layout ───────────────────────────────────────────────────────────────

fn ui(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Length(1), // tab bar
            Constraint::Min(6),    // tab content
            Constraint::Length(3), // services panel
            Constraint::Length(1), // help bar
        ])
        .split(f.area());

    draw_header(f, app, chunks[0]);
    draw_tab_bar(f, app, chunks[1]);
    match app.active_tab {
        Tab::Overview => draw_overview_tab(f, app, chunks[2]),
        Tab::Tree => draw_tree_tab(f, app, chunks[2]),
        Tab::Logs => draw_logs_tab(f, app, chunks[2]),
    }
    draw_services_panel(f, app, chunks[3]);
    draw_help_bar(f, app, chunks[4]);
}

fn label(text: &str) -> Span<'static> {
    Span::styled(text.to_owned(), Style::default().fg(Color::DarkGray))
}

fn value(text: String) -> Span<'static> {
    Span::styled(text, Style::default().fg(Color::White))
}

fn draw_header(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let (status, status_color) = if app.paused {
        (" PAUSED ", Color::Yellow)
    } else if app.connected {
        (" LIVE ", Color::Green)
    } else {
        (" WAITING ", Color::DarkGray)
    };

    let text = Line::from(vec![
        Span::styled(
            format!(" {status} "),
            Style::default().bg(status_color).fg(Color::Black),
        ),
        Span::raw("  "),
        label("FPS: "),
        Span::styled(
            format!("{:.1}", s.fps),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        label("Frame: "),
        value(s.frame_count.to_string()),
        Span::raw("  |  "),
        label("\u{0394}: "),
        value(format!("{:.1}ms", s.delta_ms)),
        Span::raw("  |  "),
        label("Nodes: "),
        value(s.node_count.to_string()),
        Span::raw("  |  "),
        label("Up: "),
        value(format_uptime(s.uptime_secs)),
    ]);

    let block = Block::default()
        .title(" arbor-telemetry ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_tab_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::raw(" ")];
    for (i, tab) in Tab::ALL.iter().enumerate() {
        let (num_style, label_style) = if *tab == app.active_tab {
            (
                Style::default()
                    .bg(Color::Green)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )
        } else {
            (
                Style::default().fg(Color::DarkGray),
                Style::default().fg(Color::DarkGray),
            )
        };
        spans.push(Span::styled(format!(" {} ", i + 1), num_style));
        spans.push(Span::styled(format!("{} ", tab.label()), label_style));
        spans.push(Span::raw("  "));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Overview Tab ─────────────────────────────────────────────────────────

fn draw_overview_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(6)])
        .split(area);

    let top = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(40),
            Constraint::Percentage(20),
        ])
        .split(chunks[0]);

    let fps: Vec<u64> = app.fps_history.iter().copied().collect();
    let (lo, avg, hi) = stats(&fps);
    draw_sparkline(
        f,
        top[0],
        " FPS History ",
        &fps,
        Color::Green,
        format!("min: {lo:.0}  avg: {avg:.0}  max: {hi:.0}"),
    );

    let delta: Vec<u64> = app.delta_history.iter().copied().collect();
    let (lo, avg, hi) = stats(&delta);
    draw_sparkline(
        f,
        top[1],
        " Delta Time ",
        &delta,
        Color::Yellow,
        format!(
            "min: {:.1}ms  avg: {:.1}ms  max: {:.1}ms",
            lo / 1000.0,
            avg / 1000.0,
            hi / 1000.0
        ),
    );

    let mail: Vec<u64> = app.mail_history.iter().copied().collect();
    let (_, avg, hi) = stats(&mail);
    draw_sparkline(
        f,
        top[2],
        " Mail ",
        &mail,
        Color::Magenta,
        format!("avg: {avg:.1}  max: {hi:.0}"),
    );

    draw_pulse_budget(f, app, chunks[1]);
}

fn draw_sparkline(
    f: &mut ratatui::Frame,
    area: Rect,
    title: &str,
    data: &[u64],
    color: Color,
    summary: String,
) {
    let block = Block::default()
        .title(title.to_owned())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(area);
    f.render_widget(block, area);
    if inner.height < 2 {
        return;
    }

    let spark_area = Rect {
        height: inner.height - 1,
        ..inner
    };
    let stats_area = Rect {
        y: inner.y + inner.height - 1,
        height: 1,
        ..inner
    };
    // Newest samples on the right edge.
    let start = data.len().saturating_sub(spark_area.width as usize);
    f.render_widget(
        Sparkline::default()
            .data(&data[start..])
            .style(Style::default().fg(color)),
        spark_area,
    );
    f.render_widget(Paragraph::new(label(&summary)), stats_area);
}

fn draw_pulse_budget(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" Pulse Budget (16.7ms target) ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if !app.connected {
        f.render_widget(
            Paragraph::new(label("  Waiting for a game on 127.0.0.1:9100...")),
            inner,
        );
        return;
    }

    let p = app.latest.pulses;
    let total = p.total_us();
    let bar_width = inner.width.saturating_sub(28) as usize;

    let mut lines = vec![pulse_line("total", total, total, bar_width, true)];
    for (name, us) in [
        ("event", p.event_us),
        ("time", p.time_us),
        ("mail", p.mail_us),
        ("render", p.render_us),
    ] {
        lines.push(pulse_line(name, us, total, bar_width, false));
    }
    f.render_widget(Paragraph::new(lines), inner);
}

/// One budget row. The total row is scaled against the frame budget, the
/// pulse rows against the total.
fn pulse_line(name: &str, us: f64, total: f64, width: usize, is_total: bool) -> Line<'static> {
    let frac = if is_total {
        us / FRAME_BUDGET_US
    } else if total > 0.0 {
        us / total
    } else {
        0.0
    };
    let color = if !is_total {
        Color::Cyan
    } else if frac < 0.8 {
        Color::Green
    } else if frac <= 1.0 {
        Color::Yellow
    } else {
        Color::Red
    };
    let filled = ((frac.clamp(0.0, 1.0)) * width as f64).round() as usize;
    let bar = format!(
        "{}{}",
        "\u{2588}".repeat(filled),
        "\u{2591}".repeat(width.saturating_sub(filled))
    );

    Line::from(vec![
        Span::styled(format!("  {name:<7}"), Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{:>9.1}\u{00b5}s ", us),
            Style::default().fg(color).add_modifier(if is_total {
                Modifier::BOLD
            } else {
                Modifier::empty()
            }),
        ),
        Span::styled(format!("{:>5.1}% ", frac * 100.0), Style::default().fg(Color::DarkGray)),
        Span::styled(bar, Style::default().fg(color)),
    ])
}

// ── Tree Tab ─────────────────────────────────────────────────────────────

fn draw_tree_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let rows = &app.latest.tree;
    let block = Block::default()
        .title(format!(
            " Tree  {} nodes  render order: {}  rebuilds: {} ",
            rows.len(),
            app.latest.render_order_len,
            app.latest.render_rebuilds
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if rows.is_empty() {
        f.render_widget(Paragraph::new(label("  No tree data")), inner);
        return;
    }

    let visible = inner.height as usize;
    let offset = app.tree_scroll.min(rows.len().saturating_sub(visible));
    let lines: Vec<Line> = rows
        .iter()
        .enumerate()
        .skip(offset)
        .take(visible)
        .map(|(i, row)| {
            let selected = i == app.tree_scroll;
            let flags = row.valve_flags();
            let closed = row.valves.iter().any(|open| !open);
            let name_style = if selected {
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Green)
                    .add_modifier(Modifier::BOLD)
            } else if row.depth == 0 {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            Line::from(vec![
                Span::raw(format!("  {}", "  ".repeat(row.depth))),
                Span::styled(row.name.clone(), name_style),
                Span::raw("  "),
                Span::styled(
                    format!("[{flags}]"),
                    Style::default().fg(if closed { Color::Yellow } else { Color::DarkGray }),
                ),
                Span::styled(
                    if row.layer != 0 {
                        format!(" layer {}", row.layer)
                    } else {
                        String::new()
                    },
                    Style::default().fg(Color::Cyan),
                ),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

// ── Logs Tab ─────────────────────────────────────────────────────────────

fn draw_logs_tab(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let [t, d, i, w, e] = app.log_counts();
    let scroll = if app.log_auto_scroll { "auto" } else { "manual" };
    let block = Block::default()
        .title(format!(
            " Logs [{}]  T:{t} D:{d} I:{i} W:{w} E:{e}  scroll:{scroll} ",
            app.log_filter.label(),
        ))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Green));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let filtered = app.filtered_logs();
    if filtered.is_empty() {
        f.render_widget(Paragraph::new(label("  No log messages")), inner);
        return;
    }

    let visible = inner.height as usize;
    let max_offset = filtered.len().saturating_sub(visible);
    let offset = if app.log_auto_scroll {
        max_offset
    } else {
        app.log_scroll.min(max_offset)
    };

    let lines: Vec<Line> = filtered
        .iter()
        .skip(offset)
        .take(visible)
        .map(|entry| {
            let level_color = match entry.level.as_str() {
                "TRACE" => Color::DarkGray,
                "DEBUG" => Color::Gray,
                "INFO" => Color::Cyan,
                "WARN" => Color::Yellow,
                "ERROR" => Color::Red,
                _ => Color::White,
            };
            Line::from(vec![
                label(&format!("  [{:>6.1}s] ", entry.timestamp_secs)),
                Span::styled(
                    format!("{:<5} ", entry.level),
                    Style::default().fg(level_color).add_modifier(Modifier::BOLD),
                ),
                label(&format!("{} ", entry.target)),
                value(entry.message.clone()),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

// ── Services panel + help bar ────────────────────────────────────────────

fn draw_services_panel(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let s = &app.latest;
    let block = Block::default()
        .title(" Services ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));
    let text = Line::from(vec![
        label("  Mailbox: "),
        value(s.mailbox_depth.to_string()),
        label("  drained: "),
        value(s.mail_drained.to_string()),
        label("  delivered: "),
        value(s.mail_delivered.to_string()),
        Span::raw("  |  "),
        label("Colliders: "),
        value(format!("{}/{}", s.colliders_enabled, s.collider_count)),
        Span::raw("  |  "),
        label("Draw commands: "),
        value(s.draw_commands.to_string()),
    ]);
    f.render_widget(Paragraph::new(text).block(block), area);
}

fn draw_help_bar(f: &mut ratatui::Frame, app: &App, area: Rect) {
    let key = |k: &str| Span::styled(k.to_owned(), Style::default().fg(Color::Green));
    let mut spans = vec![
        key(" [1-3]"),
        Span::raw(" tab  "),
        key("[Tab]"),
        Span::raw(" next  "),
    ];
    match app.active_tab {
        Tab::Overview => {}
        Tab::Tree => {
            spans.push(key("[\u{2191}\u{2193}]"));
            spans.push(Span::raw(" scroll  "));
        }
        Tab::Logs => {
            spans.push(key("[l]"));
            spans.push(Span::raw(" filter  "));
            spans.push(key("[g]"));
            spans.push(Span::raw(" auto-scroll  "));
            spans.push(key("[\u{2191}\u{2193}]"));
            spans.push(Span::raw(" scroll  "));
        }
    }
    spans.push(key("[p]"));
    spans.push(Span::raw(" pause  "));
    spans.push(key("[q]"));
    spans.push(Span::raw(" quit"));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn stats(data: &[u64]) -> (f64, f64, f64) {
    let (Some(min), Some(max)) = (data.iter().min(), data.iter().max()) else {
        return (0.0, 0.0, 0.0);
    };
    let avg = data.iter().sum::<u64>() as f64 / data.len() as f64;
    (*min as f64, avg, *max as f64)
}

fn format_uptime(secs: f32) -> String {
    let total = secs as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}h{m}m{s}s")
    } else if m > 0 {
        format!("{m}m{s}s")
    } else {
        format!("{secs:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "fps": 59.6, "delta_ms": 16.7, "frame_count": 120, "uptime_secs": 2.0,
        "node_count": 3, "render_order_len": 3, "render_rebuilds": 2,
        "mailbox_depth": 0, "mail_drained": 4, "mail_delivered": 7,
        "draw_commands": 12, "collider_count": 2, "colliders_enabled": 2,
        "pulses": { "event_us": 1.0, "time_us": 20.0, "mail_us": 5.0, "render_us": 30.0 },
        "tree": [
            { "name": "game", "depth": 0, "layer": 0, "valves": [true, true, true, true] },
            { "name": "hud", "depth": 1, "layer": 10, "valves": [true, false, true, true] }
        ],
        "logs": [
            { "level": "INFO", "target": "arbor", "message": "hello", "timestamp_secs": 0.5 },
            { "level": "DEBUG", "target": "arbor", "message": "quiet", "timestamp_secs": 0.6 }
        ]
    }"#;

    fn snapshot() -> DiagSnapshot {
        serde_json::from_str(SNAPSHOT).unwrap()
    }

    #[test]
    fn snapshot_parses_and_accumulates() {
        let mut app = App::new();
        app.push_snapshot(snapshot());
        assert!(app.connected);
        assert_eq!(app.fps_history.back(), Some(&60));
        assert_eq!(app.delta_history.back(), Some(&16700));
        assert_eq!(app.mail_history.back(), Some(&4));
        assert_eq!(app.latest.tree[1].valve_flags(), "e-mr");
        assert_eq!(app.latest.pulses.total_us(), 56.0);
        assert_eq!(app.log_counts(), [0, 1, 1, 0, 0]);
        // Default filter hides debug.
        assert_eq!(app.filtered_logs().len(), 1);
    }

    #[test]
    fn missing_fields_default_and_pause_drops_snapshots() {
        let snap: DiagSnapshot = serde_json::from_str(r#"{ "fps": 30.0 }"#).unwrap();
        assert!(snap.tree.is_empty());

        let mut app = App::new();
        app.paused = true;
        app.push_snapshot(snapshot());
        assert!(!app.connected);
        assert!(app.fps_history.is_empty());
    }

    #[test]
    fn keys_switch_tabs_and_quit() {
        let mut app = App::new();
        let press = |code| KeyEvent::new(code, KeyModifiers::NONE);
        assert!(!handle_key(&mut app, press(KeyCode::Char('2'))));
        assert_eq!(app.active_tab, Tab::Tree);
        handle_key(&mut app, press(KeyCode::Tab));
        assert_eq!(app.active_tab, Tab::Logs);
        handle_key(&mut app, press(KeyCode::Char('l')));
        assert_eq!(app.log_filter, LogFilter::Warn);
        handle_key(&mut app, press(KeyCode::Char('p')));
        assert!(app.paused);
        assert!(handle_key(&mut app, press(KeyCode::Char('q'))));
    }

    #[test]
    fn helpers() {
        assert_eq!(stats(&[]), (0.0, 0.0, 0.0));
        assert_eq!(stats(&[1, 3]), (1.0, 2.0, 3.0));
        assert_eq!(format_uptime(3725.0), "1h2m5s");
        assert_eq!(format_uptime(2.5), "2.5s");
    }
}
