//! Data models for penstream
//!
//! Positions, machine and connection states, the command type and the
//! read-only snapshot handed to front-ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a streaming session, returned by a program load
pub type SessionId = Uuid;

/// Machine position in millimeters
///
/// Only ever produced by parsing a firmware status report; the firmware is
/// authoritative and positions are never inferred from sent commands.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Create a new position with X, Y, Z coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Parse a comma separated coordinate triple such as `10.000,5.000,0.000`
    ///
    /// Extra axes beyond Z are ignored. If any of the first three fields is
    /// missing or not a number the result is `None`.
    pub fn parse_triple(s: &str) -> Option<Self> {
        let mut fields = s.split(',').map(|c| c.trim().parse::<f64>().ok());
        let x = fields.next()??;
        let y = fields.next()??;
        let z = fields.next()??;
        Some(Self::new(x, y, z))
    }

    /// Distance to another position in the XY plane
    pub fn distance_xy(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{:.3} Y:{:.3} Z:{:.3}", self.x, self.y, self.z)
    }
}

/// Estimated tool state
///
/// The firmware never reports whether the pen is down. This value is derived
/// on the host from the Z sign and the M3/M5 words of the last command that
/// was sent, so it can drift from reality after an aborted session or a
/// command the firmware rejected. Treat it as an estimate for rendering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PenState {
    /// Tool lifted (travel moves)
    #[default]
    Up,
    /// Tool engaged (drawing or cutting)
    Down,
}

impl fmt::Display for PenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "Up"),
            Self::Down => write!(f, "Down"),
        }
    }
}

/// Machine run state as reported by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MachineState {
    /// Connected and idle, ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold, awaiting resume
    Hold,
    /// Manual jog/movement mode
    Jog,
    /// Machine alarm state (requires manual intervention)
    Alarm,
    /// Safety door interlock triggered
    Door,
    /// Check mode (dry-run without machine movement)
    Check,
    /// Homing cycle in progress
    Home,
    /// Low-power sleep state
    Sleep,
    /// No report yet, or a token we do not recognise
    #[default]
    Unknown,
}

impl MachineState {
    /// Map the leading token of a status report to a state.
    ///
    /// Sub-states such as `Hold:0` or `Door:1` map to their parent state.
    pub fn from_report_token(token: &str) -> Self {
        let name = token.split(':').next().unwrap_or_default().trim();
        match name {
            "Idle" => Self::Idle,
            "Run" => Self::Run,
            "Hold" => Self::Hold,
            "Jog" => Self::Jog,
            "Alarm" => Self::Alarm,
            "Door" => Self::Door,
            "Check" => Self::Check,
            "Home" => Self::Home,
            "Sleep" => Self::Sleep,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Run => write!(f, "Run"),
            Self::Hold => write!(f, "Hold"),
            Self::Jog => write!(f, "Jog"),
            Self::Alarm => write!(f, "Alarm"),
            Self::Door => write!(f, "Door"),
            Self::Check => write!(f, "Check"),
            Self::Home => write!(f, "Home"),
            Self::Sleep => write!(f, "Sleep"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// State of the serial link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Connection not established or lost
    #[default]
    Disconnected,
    /// Port open, handshake in progress
    Connecting,
    /// Handshake complete, engine running
    Connected,
}

impl ConnectionState {
    /// Check if the link is usable
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Streaming state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamState {
    /// No active session
    #[default]
    Idle,
    /// Session active, commands flowing on acknowledgment
    Streaming,
    /// Session active, cursor frozen
    Paused,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Paused => write!(f, "Paused"),
        }
    }
}

/// One line of G-code or control text
///
/// Immutable once constructed; the streaming engine forwards the text
/// verbatim followed by a newline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command(String);

impl Command {
    /// Create a command from its text
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the command text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the command and return its text
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Command {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Command {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Progress of the current (or most recently finished) session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    /// Session identifier
    pub id: SessionId,
    /// Streaming state of the session
    pub state: StreamState,
    /// Upload cursor: number of commands handed to the device
    pub sent: usize,
    /// Total commands in the session
    pub total: usize,
    /// Lost acknowledgments recovered by the watchdog
    pub recoveries: u32,
    /// When the session was loaded
    pub started_at: DateTime<Utc>,
    /// When the last command was acknowledged, if the session completed
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionProgress {
    /// Fraction of commands sent, in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.sent as f64 / self.total as f64
    }

    /// True once every command was acknowledged
    pub fn is_complete(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Read-only view of the engine state for front-ends
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Last machine position reported by the firmware
    pub position: Position,
    /// Host-side pen estimate; see [`PenState`]
    pub estimated_pen: PenState,
    /// Last reported machine state
    pub machine_state: MachineState,
    /// Link state
    pub connection: ConnectionState,
    /// Current or last session, if any program was loaded
    pub session: Option<SessionProgress>,
    /// Number of points in the position trace
    pub trace_len: usize,
}
