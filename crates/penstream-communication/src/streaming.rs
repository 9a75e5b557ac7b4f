//! Acknowledgment-gated streaming
//!
//! The firmware buffers a single line, so exactly one command may be
//! outstanding at a time: the next one is only written once the previous one
//! was answered with `ok` (or `error:<n>`). [`StreamingController`] owns that
//! slot, the loaded session and the manual command queue. It is driven
//! synchronously by the engine loop and never touches the link except
//! through a [`LineSink`].

use crate::link::DeviceLink;
use crate::protocol::{decode_error, is_realtime, CYCLE_START, FEED_HOLD};
use chrono::Utc;
use penstream_core::{
    Command, ControllerError, ControllerEvent, EventDispatcher, MachineState, PenState,
    SessionId, SessionProgress, StreamState,
};
use penstream_gcode::estimate_pen;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

/// Where outgoing traffic goes
pub trait LineSink {
    /// Write a line; the newline is added by the sink
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Write a single out-of-band byte
    fn send_realtime(&mut self, byte: u8) -> io::Result<()>;
}

impl LineSink for DeviceLink {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.write_line(line)
    }

    fn send_realtime(&mut self, byte: u8) -> io::Result<()> {
        self.write_realtime(byte)
    }
}

/// Streaming settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Publish a progress event every N sent commands
    pub progress_interval: usize,
    /// Minimum time since the last send before an idle report counts as a
    /// lost acknowledgment
    pub watchdog: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            progress_interval: 5,
            watchdog: Duration::from_millis(1_000),
        }
    }
}

/// A loaded program and its upload cursor
#[derive(Debug, Clone)]
pub struct StreamingSession {
    id: SessionId,
    commands: Vec<Command>,
    next_index: usize,
    state: StreamState,
    recoveries: u32,
    started_at: chrono::DateTime<Utc>,
    finished_at: Option<chrono::DateTime<Utc>>,
}

impl StreamingSession {
    pub fn new(id: SessionId, commands: Vec<Command>) -> Self {
        Self {
            id,
            commands,
            next_index: 0,
            state: StreamState::Streaming,
            recoveries: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Number of commands handed to the device
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn total(&self) -> usize {
        self.commands.len()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Streaming or paused
    pub fn is_active(&self) -> bool {
        self.state != StreamState::Idle
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress {
            id: self.id,
            state: self.state,
            sent: self.next_index,
            total: self.commands.len(),
            recoveries: self.recoveries,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// What occupies the outstanding-command slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    Program { session: SessionId, index: usize },
    Manual,
}

/// Owns the single outstanding-command slot
pub struct StreamingController {
    config: StreamingConfig,
    events: EventDispatcher,
    session: Option<StreamingSession>,
    manual: VecDeque<Command>,
    in_flight: Option<InFlight>,
    last_send: Option<Instant>,
    pen: PenState,
}

impl StreamingController {
    pub fn new(config: StreamingConfig, events: EventDispatcher) -> Self {
        Self {
            config,
            events,
            session: None,
            manual: VecDeque::new(),
            in_flight: None,
            last_send: None,
            pen: PenState::default(),
        }
    }

    /// Current or most recent session
    pub fn session(&self) -> Option<&StreamingSession> {
        self.session.as_ref()
    }

    pub fn stream_state(&self) -> StreamState {
        self.session
            .as_ref()
            .map_or(StreamState::Idle, StreamingSession::state)
    }

    pub fn progress(&self) -> Option<SessionProgress> {
        self.session.as_ref().map(StreamingSession::progress)
    }

    /// Host-side pen estimate from the commands sent so far
    pub fn pen(&self) -> PenState {
        self.pen
    }

    /// True while a sent command is waiting for its acknowledgment
    pub fn has_outstanding(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start streaming `commands` as session `id`.
    ///
    /// A running session is discarded first. The first command goes out at
    /// once if the slot is free; otherwise it waits for the pending reply.
    pub fn start(
        &mut self,
        sink: &mut dyn LineSink,
        id: SessionId,
        commands: Vec<Command>,
        now: Instant,
    ) {
        self.abort();

        let total = commands.len();
        self.session = Some(StreamingSession::new(id, commands));
        tracing::info!("Loaded {} lines", total);
        self.events
            .publish(ControllerEvent::SessionStarted { id, total });

        self.dispatch(sink, now);
    }

    /// Handle an `ok`
    pub fn on_ack(&mut self, sink: &mut dyn LineSink, now: Instant) {
        let Some(in_flight) = self.in_flight else {
            tracing::debug!("Acknowledgment with nothing outstanding");
            return;
        };

        // a paused session keeps its slot until resumed
        if let InFlight::Program { session, .. } = in_flight {
            if self.is_current(session) && self.stream_state() == StreamState::Paused {
                tracing::debug!("Acknowledgment while paused ignored");
                return;
            }
        }

        self.in_flight = None;
        self.dispatch(sink, now);
    }

    /// Handle an `error:<code>`; the firmware is done with the line
    pub fn on_error(&mut self, sink: &mut dyn LineSink, code: u8, now: Instant) {
        let message = decode_error(code);
        tracing::warn!("Device rejected line: error:{} ({})", code, message);
        self.events.publish(ControllerEvent::DeviceError {
            code,
            message: message.to_string(),
        });
        self.on_ack(sink, now);
    }

    /// Send the hold signal and freeze the cursor
    pub fn pause(&mut self, sink: &mut dyn LineSink) {
        if let Err(e) = sink.send_realtime(FEED_HOLD) {
            tracing::error!("Failed to send hold: {}", e);
            return;
        }

        if let Some(session) = self.session.as_mut() {
            if session.state == StreamState::Streaming {
                session.state = StreamState::Paused;
                tracing::info!("Paused at line {}", session.next_index);
            }
        }
        self.events.publish(ControllerEvent::Paused);
    }

    /// Send the resume signal and let acknowledgments advance again
    pub fn resume(&mut self, sink: &mut dyn LineSink, now: Instant) {
        if let Err(e) = sink.send_realtime(CYCLE_START) {
            tracing::error!("Failed to send resume: {}", e);
            return;
        }

        if let Some(session) = self.session.as_mut() {
            if session.state == StreamState::Paused {
                session.state = StreamState::Streaming;
                tracing::info!("Resumed at line {}", session.next_index);
            }
        }
        self.events.publish(ControllerEvent::Resumed);
        self.dispatch(sink, now);
    }

    /// Discard the current session and any queued manual commands.
    ///
    /// Nothing is sent to the device. A reply still pending for an aborted
    /// command only frees the slot.
    pub fn abort(&mut self) {
        self.manual.clear();

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.is_active() {
            return;
        }

        session.state = StreamState::Idle;
        tracing::info!(
            "Upload aborted after {}/{} lines",
            session.next_index,
            session.commands.len()
        );
        self.events.publish(ControllerEvent::SessionAborted {
            id: session.id,
            sent: session.next_index,
        });
    }

    /// Send a manual command through the shared slot.
    ///
    /// Hold and resume bytes go through [`pause`](Self::pause) and
    /// [`resume`](Self::resume); other realtime bytes are written directly.
    pub fn send_immediate(
        &mut self,
        sink: &mut dyn LineSink,
        text: &str,
        now: Instant,
    ) -> Result<(), ControllerError> {
        let text = text.trim();
        if text.is_empty() || text.contains(['\n', '\r']) {
            return Err(ControllerError::InvalidCommand {
                reason: format!("expected a single non-empty line, got {:?}", text),
            });
        }

        if let [byte] = text.as_bytes() {
            match *byte {
                FEED_HOLD => {
                    self.pause(sink);
                    return Ok(());
                }
                CYCLE_START => {
                    self.resume(sink, now);
                    return Ok(());
                }
                b if is_realtime(b) => {
                    if let Err(e) = sink.send_realtime(b) {
                        tracing::error!("Failed to send realtime byte: {}", e);
                    }
                    return Ok(());
                }
                _ => {}
            }
        }

        self.manual.push_back(Command::new(text));
        self.dispatch(sink, now);
        Ok(())
    }

    /// True if an idle report at `now` means the last reply was lost.
    ///
    /// Requires a streaming (not paused) session, an outstanding command and
    /// at least the watchdog window since the last send.
    pub fn should_recover(&self, reported: MachineState, now: Instant) -> bool {
        if reported != MachineState::Idle || self.stream_state() != StreamState::Streaming {
            return false;
        }
        if self.in_flight.is_none() {
            return false;
        }
        self.last_send
            .is_none_or(|sent| now.saturating_duration_since(sent) >= self.config.watchdog)
    }

    /// Treat the outstanding command as acknowledged and move on
    pub fn recover(&mut self, sink: &mut dyn LineSink, now: Instant) {
        self.in_flight = None;

        let id = self.session.as_mut().map(|session| {
            session.recoveries += 1;
            session.id
        });
        self.dispatch(sink, now);

        let next_index = self.session.as_ref().map_or(0, |s| s.next_index);
        tracing::warn!(
            "Watchdog: device idle with an unacknowledged line, continuing at line {}",
            next_index
        );
        self.events
            .publish(ControllerEvent::WatchdogRecovery { id, next_index });
    }

    fn is_current(&self, id: SessionId) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == id)
    }

    /// Fill the free slot: manual commands first, then the program
    fn dispatch(&mut self, sink: &mut dyn LineSink, now: Instant) {
        if self.in_flight.is_some() {
            return;
        }

        if let Some(command) = self.manual.pop_front() {
            if let Err(e) = sink.send_line(command.as_str()) {
                tracing::error!("Failed to send {}: {}", command, e);
                return;
            }
            self.mark_sent(command.as_str(), InFlight::Manual, now);
            return;
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.state != StreamState::Streaming {
            return;
        }

        if session.next_index >= session.commands.len() {
            session.state = StreamState::Idle;
            session.finished_at = Some(Utc::now());
            tracing::info!("Upload complete ({} lines)", session.commands.len());
            self.events.publish(ControllerEvent::SessionCompleted {
                id: session.id,
                total: session.commands.len(),
            });
            return;
        }

        let index = session.next_index;
        let command = session.commands[index].clone();
        if let Err(e) = sink.send_line(command.as_str()) {
            tracing::error!("Failed to send line {}: {}", index, e);
            return;
        }

        session.next_index += 1;
        let (id, sent, total) = (session.id, session.next_index, session.commands.len());
        self.mark_sent(
            command.as_str(),
            InFlight::Program { session: id, index },
            now,
        );

        let interval = self.config.progress_interval;
        if interval > 0 && sent % interval == 0 {
            tracing::info!("[{}/{}] {}", sent, total, command);
            self.events.publish(ControllerEvent::Progress {
                id,
                sent,
                total,
                command: command.into_string(),
            });
        }
    }

    fn mark_sent(&mut self, text: &str, in_flight: InFlight, now: Instant) {
        self.in_flight = Some(in_flight);
        self.last_send = Some(now);
        self.pen = estimate_pen(text, self.pen);
    }
}
