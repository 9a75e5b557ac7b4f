//! Status report parsing and poll scheduling
//!
//! A status report looks like `<Idle|MPos:1.000,2.000,0.000|FS:0,0>`. The
//! first field is the machine state, the remaining `Key:value` fields are
//! optional and may come in any order.

use penstream_core::{MachineState, Position};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Planner and serial buffer availability (`Bf:` / `Buf:`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    /// Free planner blocks
    pub plan: u16,
    /// Free serial RX bytes
    pub rx: u16,
}

impl BufferState {
    /// Parse `plan,rx` (GRBL 1.1) or `plan:rx` (older firmware)
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split([',', ':']);
        let plan = parts.next()?.trim().parse().ok()?;
        let rx = parts.next()?.trim().parse().ok()?;
        Some(Self { plan, rx })
    }
}

/// One parsed status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Machine state
    pub state: MachineState,
    /// State token as received, including any sub-state (`Hold:0`)
    pub raw_state: String,
    /// Machine position
    pub machine_pos: Option<Position>,
    /// Work position
    pub work_pos: Option<Position>,
    /// Current feed rate
    pub feed_rate: Option<f64>,
    /// Current spindle (servo) value
    pub spindle_speed: Option<f64>,
    /// Buffer availability
    pub buffer: Option<BufferState>,
}

impl StatusReport {
    /// Parse a full `<...>` line. Returns `None` for anything else.
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.trim().strip_prefix('<')?.strip_suffix('>')?;
        let mut fields = body.split('|');

        let raw_state = fields.next()?.trim();
        if raw_state.is_empty() {
            return None;
        }

        let mut report = Self {
            state: MachineState::from_report_token(raw_state),
            raw_state: raw_state.to_string(),
            machine_pos: None,
            work_pos: None,
            feed_rate: None,
            spindle_speed: None,
            buffer: None,
        };

        for field in fields {
            let field = field.trim();
            if let Some(v) = field.strip_prefix("MPos:") {
                report.machine_pos = Position::parse_triple(v);
            } else if let Some(v) = field.strip_prefix("WPos:") {
                report.work_pos = Position::parse_triple(v);
            } else if let Some(v) = field.strip_prefix("FS:") {
                let mut parts = v.split(',');
                report.feed_rate = parts.next().and_then(|s| s.trim().parse().ok());
                report.spindle_speed = parts.next().and_then(|s| s.trim().parse().ok());
            } else if let Some(v) = field.strip_prefix("F:") {
                report.feed_rate = v.trim().parse().ok();
            } else if let Some(v) = field
                .strip_prefix("Bf:")
                .or_else(|| field.strip_prefix("Buf:"))
            {
                report.buffer = BufferState::parse(v);
            }
        }

        Some(report)
    }

    /// Position to display: machine position, falling back to work position
    pub fn position(&self) -> Option<Position> {
        self.machine_pos.or(self.work_pos)
    }
}

/// Decides when the next `?` query is due
#[derive(Debug, Clone)]
pub struct StatusPoller {
    interval: Duration,
    last_poll: Option<Instant>,
}

impl StatusPoller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_poll: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True if no query was sent yet or the interval has elapsed
    pub fn poll_due(&self, now: Instant) -> bool {
        match self.last_poll {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn mark_polled(&mut self, now: Instant) {
        self.last_poll = Some(now);
    }
}
