//! Diagnostics sender. Ships per-frame metrics to `arbor-telemetry` over UDP.
//!
//! Enabled by the `diagnostics` feature flag. The root owns a [`DiagSender`]
//! and hands it the tree after every frame; at most ten JSON snapshots a
//! second go out to `127.0.0.1:9100`. Nothing listening is fine: datagrams
//! are fire-and-forget.
//!
//! [`init_logger`] installs a logger that writes through `env_logger` and
//! also keeps recent records in a ring buffer, so the dashboard can show them.

use std::net::UdpSocket;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::root::FrameStats;
use crate::time::Time;
use crate::tree::Tree;

/// Where the dashboard listens.
pub const DIAG_ADDR: &str = "127.0.0.1:9100";

const SEND_INTERVAL: Duration = Duration::from_millis(100);
const LOG_CAPACITY: usize = 500;
const LOGS_PER_SNAPSHOT: usize = 50;

// ── DiagSender ───────────────────────────────────────────────────────────

pub struct DiagSender {
    socket: UdpSocket,
    last_send: Option<Instant>,
    sent: u64,
}

impl DiagSender {
    /// Bind an ephemeral local port aimed at [`DIAG_ADDR`]. `None` if the
    /// socket cannot be set up.
    pub fn new() -> Option<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").ok()?;
        socket.connect(DIAG_ADDR).ok()?;
        socket.set_nonblocking(true).ok()?;
        Some(Self {
            socket,
            last_send: None,
            sent: 0,
        })
    }

    /// Snapshots sent so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Called once per frame. Throttled to 10 Hz internally.
    pub fn send(&mut self, tree: &Tree, time: &Time, stats: &FrameStats) {
        let now = Instant::now();
        if self
            .last_send
            .is_some_and(|last| now.duration_since(last) < SEND_INTERVAL)
        {
            return;
        }
        self.last_send = Some(now);

        let snap = snapshot(tree, time, stats, drain_captured_logs(LOGS_PER_SNAPSHOT));
        if let Ok(json) = serde_json::to_vec(&snap) {
            // Nobody listening is not an error.
            let _ = self.socket.send(&json);
            self.sent += 1;
        }
    }
}

// ── Snapshot types (wire format) ────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct DiagSnapshot {
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
    tree: Vec<NodeRowWire>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    logs: Vec<LogEntryWire>,
}

#[derive(Debug, Serialize)]
struct PulseTimings {
    event_us: f64,
    time_us: f64,
    mail_us: f64,
    render_us: f64,
}

#[derive(Debug, Serialize)]
struct NodeRowWire {
    name: String,
    depth: usize,
    layer: i32,
    /// Event, time, mail, render.
    valves: [bool; 4],
}

#[derive(Debug, Serialize)]
struct LogEntryWire {
    level: String,
    target: String,
    message: String,
    timestamp_secs: f32,
}

pub(crate) fn snapshot(
    tree: &Tree,
    time: &Time,
    stats: &FrameStats,
    logs: Vec<CapturedLog>,
) -> DiagSnapshot {
    let services = tree.services();
    DiagSnapshot {
        fps: time.fps(),
        delta_ms: time.delta_secs() * 1000.0,
        frame_count: time.frame_count(),
        uptime_secs: time.uptime().as_secs_f32(),
        node_count: tree.len(),
        render_order_len: tree.render_order().len(),
        render_rebuilds: tree.render_rebuilds(),
        mailbox_depth: services.mailbox.len(),
        mail_drained: stats.mail_drained,
        mail_delivered: stats.mail_delivered,
        draw_commands: stats.draw_commands,
        collider_count: services.collisions.len(),
        colliders_enabled: services.collisions.enabled_count(),
        pulses: PulseTimings {
            event_us: stats.event_us,
            time_us: stats.time_us,
            mail_us: stats.mail_us,
            render_us: stats.render_us,
        },
        tree: tree
            .rows()
            .into_iter()
            .map(|row| NodeRowWire {
                name: row.name,
                depth: row.depth,
                layer: row.layer,
                valves: [
                    row.valves.event,
                    row.valves.time,
                    row.valves.mail,
                    row.valves.render,
                ],
            })
            .collect(),
        logs: logs
            .into_iter()
            .map(|e| LogEntryWire {
                level: e.level.to_string(),
                target: e.target,
                message: e.message,
                timestamp_secs: e.timestamp_secs,
            })
            .collect(),
    }
}

// ── Log Capture ──────────────────────────────────────────────────────────

pub(crate) struct CapturedLog {
    level: log::Level,
    target: String,
    message: String,
    timestamp_secs: f32,
}

/// Oldest entries fall off once the ring is full.
struct LogRing {
    entries: std::collections::VecDeque<CapturedLog>,
}

impl LogRing {
    fn new() -> Self {
        Self {
            entries: std::collections::VecDeque::with_capacity(LOG_CAPACITY),
        }
    }

    fn push(&mut self, entry: CapturedLog) {
        if self.entries.len() >= LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn drain(&mut self, max: usize) -> Vec<CapturedLog> {
        let n = self.entries.len().min(max);
        self.entries.drain(..n).collect()
    }
}

static LOG_RING: Mutex<Option<LogRing>> = Mutex::new(None);
static LOG_START: OnceLock<Instant> = OnceLock::new();

/// Writes through env_logger and captures into [`LOG_RING`].
struct DiagLogger {
    inner: env_logger::Logger,
}

impl log::Log for DiagLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata) || metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            self.inner.log(record);
        }

        let entry = CapturedLog {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
            timestamp_secs: LOG_START
                .get()
                .map_or(0.0, |start| start.elapsed().as_secs_f32()),
        };
        if let Ok(mut guard) = LOG_RING.lock() {
            if let Some(ring) = guard.as_mut() {
                ring.push(entry);
            }
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

static DIAG_LOGGER: OnceLock<DiagLogger> = OnceLock::new();

/// Install the capturing logger. Call before anything logs. `RUST_LOG`
/// filters stderr output as usual; info and above are always captured.
pub fn init_logger() {
    LOG_START.get_or_init(Instant::now);
    if let Ok(mut ring) = LOG_RING.lock() {
        ring.get_or_insert_with(LogRing::new);
    }

    let inner = env_logger::Builder::new().parse_default_env().build();
    let max_level = inner.filter();
    let logger = DIAG_LOGGER.get_or_init(|| DiagLogger { inner });

    if log::set_logger(logger).is_err() {
        eprintln!("[arbor] a logger is already set; log capture disabled");
        return;
    }
    log::set_max_level(max_level.max(log::LevelFilter::Info));
}

/// Take up to `max` captured records, oldest first.
pub(crate) fn drain_captured_logs(max: usize) -> Vec<CapturedLog> {
    match LOG_RING.lock() {
        Ok(mut guard) => guard.as_mut().map_or_else(Vec::new, |ring| ring.drain(max)),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::{ColliderDesc, Shape};
    use crate::node::{Group, Pulse};

    fn entry(message: &str) -> CapturedLog {
        CapturedLog {
            level: log::Level::Info,
            target: "arbor".into(),
            message: message.into(),
            timestamp_secs: 0.0,
        }
    }

    #[test]
    fn ring_drops_oldest_when_full() {
        let mut ring = LogRing::new();
        for i in 0..LOG_CAPACITY + 5 {
            ring.push(entry(&i.to_string()));
        }
        assert_eq!(ring.entries.len(), LOG_CAPACITY);
        let first = ring.drain(2);
        assert_eq!(first[0].message, "5");
        assert_eq!(first[1].message, "6");
        assert_eq!(ring.entries.len(), LOG_CAPACITY - 2);
    }

    #[test]
    fn snapshot_describes_the_tree() {
        let mut tree = Tree::new("game");
        let root = tree.root();
        let hud = tree.attach(root, "hud", Group).unwrap();
        tree.set_layer(hud, 5).unwrap();
        tree.set_valve(hud, Pulse::Mail, false).unwrap();
        tree.services_mut()
            .collisions
            .register(ColliderDesc::new("rock", Shape::rect(1.0, 1.0)));

        let stats = FrameStats {
            mail_delivered: 3,
            ..Default::default()
        };
        let snap = snapshot(&tree, &Time::new(), &stats, vec![entry("hello")]);
        assert_eq!(snap.node_count, 2);
        assert_eq!(snap.collider_count, 1);
        assert_eq!(snap.mail_delivered, 3);
        assert_eq!(snap.tree[1].name, "hud");
        assert_eq!(snap.tree[1].depth, 1);
        assert_eq!(snap.tree[1].layer, 5);
        assert_eq!(snap.tree[1].valves, [true, true, false, true]);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["logs"][0]["message"], "hello");
        assert_eq!(json["pulses"]["render_us"], 0.0);
    }

    #[test]
    fn sender_throttles_to_ten_hertz() {
        let Some(mut sender) = DiagSender::new() else {
            return;
        };
        let tree = Tree::new("game");
        let time = Time::new();
        let stats = FrameStats::default();
        sender.send(&tree, &time, &stats);
        sender.send(&tree, &time, &stats);
        assert_eq!(sender.sent(), 1);
    }
}
