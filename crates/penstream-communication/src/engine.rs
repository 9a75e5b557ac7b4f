//! Plotter controller
//!
//! [`PlotterController`] is the handle front-ends hold. Connecting opens the
//! link and moves it into a single engine task, which is then the only
//! reader and writer of the device. Requests travel to the task over a
//! channel; the task publishes what it observes into [`SharedState`] and as
//! [`ControllerEvent`]s.
//!
//! Each iteration of the engine loop:
//! 1. drains pending requests
//! 2. reads at most one line (waiting up to the read timeout) and handles it
//! 3. sends a status query if one is due
//! 4. copies session progress into the shared state

use crate::link::{ConnectionParams, DeviceLink, Transport};
use crate::protocol::{decode_alarm, Response, StatusPoller, StatusReport, STATUS_QUERY};
use crate::streaming::{StreamingConfig, StreamingController};
use async_trait::async_trait;
use parking_lot::Mutex;
use penstream_core::{
    thread_safe_rw, Command, ConnectError, ConnectionState, ControllerError, ControllerEvent,
    ControllerTrait, Error, EventDispatcher, LoadError, MachineState, PenState, Position,
    PositionTrace, Result, SessionId, SessionProgress, Snapshot, ThreadSafeRw, TracePoint,
};
use penstream_gcode::{ArcLinearizerConfig, ProgramLoader};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Engine timing and preprocessing settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Status query cadence (ms)
    pub status_poll_ms: u64,
    /// Lost-acknowledgment window (ms)
    pub watchdog_ms: u64,
    /// Publish progress every N sent commands
    pub progress_interval: usize,
    /// Arc chord length (mm)
    pub arc_resolution: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            status_poll_ms: 500,
            watchdog_ms: 1_000,
            progress_interval: 5,
            arc_resolution: 0.5,
        }
    }
}

impl EngineConfig {
    pub fn streaming(&self) -> StreamingConfig {
        StreamingConfig {
            progress_interval: self.progress_interval,
            watchdog: Duration::from_millis(self.watchdog_ms),
        }
    }

    pub fn arc(&self) -> ArcLinearizerConfig {
        ArcLinearizerConfig {
            resolution: self.arc_resolution,
        }
    }
}

/// State written by the engine task and read by everyone else
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    pub position: Position,
    pub estimated_pen: PenState,
    pub machine_state: MachineState,
    pub connection: ConnectionState,
    pub session: Option<SessionProgress>,
    pub trace: PositionTrace,
}

impl SharedState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            position: self.position,
            estimated_pen: self.estimated_pen,
            machine_state: self.machine_state,
            connection: self.connection,
            session: self.session.clone(),
            trace_len: self.trace.len(),
        }
    }
}

#[derive(Debug)]
enum EngineRequest {
    Load {
        id: SessionId,
        commands: Vec<Command>,
    },
    Pause,
    Resume,
    Abort,
    SendImmediate(String),
    ClearTrace,
    Shutdown,
}

enum ConnectTarget {
    Serial(ConnectionParams),
    Transport {
        params: ConnectionParams,
        transport: Mutex<Option<Box<dyn Transport>>>,
    },
}

impl ConnectTarget {
    fn params(&self) -> &ConnectionParams {
        match self {
            Self::Serial(params) | Self::Transport { params, .. } => params,
        }
    }
}

/// Streams programs to one plotter
pub struct PlotterController {
    name: String,
    config: EngineConfig,
    target: ConnectTarget,
    loader: ProgramLoader,
    state: ThreadSafeRw<SharedState>,
    events: EventDispatcher,
    request_tx: Option<mpsc::UnboundedSender<EngineRequest>>,
    engine_task: Option<JoinHandle<()>>,
}

impl PlotterController {
    /// Controller for a serial port
    pub fn new(params: ConnectionParams, config: EngineConfig) -> Self {
        Self::with_target(ConnectTarget::Serial(params), config)
    }

    /// Controller over an already open transport such as a
    /// [`VirtualDevice`](crate::link::VirtualDevice).
    ///
    /// `params.port` names the link in logs; `params.settle_ms` and
    /// `params.read_timeout_ms` apply as for a serial port. The transport is
    /// consumed by the first successful `connect`.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        params: ConnectionParams,
        config: EngineConfig,
    ) -> Self {
        Self::with_target(
            ConnectTarget::Transport {
                params,
                transport: Mutex::new(Some(transport)),
            },
            config,
        )
    }

    fn with_target(target: ConnectTarget, config: EngineConfig) -> Self {
        let name = target.params().port.clone();
        Self {
            name,
            config,
            target,
            loader: ProgramLoader::new(config.arc()),
            state: thread_safe_rw(SharedState::default()),
            events: EventDispatcher::default(),
            request_tx: None,
            engine_task: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connection.is_connected()
    }

    /// Receive controller events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Load a program file and start streaming it
    pub fn load_file(&self, path: impl AsRef<Path>) -> std::result::Result<SessionId, LoadError> {
        if !self.is_connected() {
            return Err(LoadError::NotConnected);
        }
        let commands = self.loader.load_file(path)?;
        self.start_session(commands)
    }

    /// Copy of every recorded trace point, oldest first
    pub fn trace(&self) -> Vec<TracePoint> {
        self.state.read().trace.points().to_vec()
    }

    /// Drop the recorded trace
    pub fn clear_trace(&self) {
        match &self.request_tx {
            Some(tx) if tx.send(EngineRequest::ClearTrace).is_ok() => {}
            _ => self.state.write().trace.clear(),
        }
    }

    fn start_session(&self, commands: Vec<Command>) -> std::result::Result<SessionId, LoadError> {
        if commands.is_empty() {
            return Err(LoadError::EmptyProgram);
        }
        let id = Uuid::new_v4();
        self.request(EngineRequest::Load { id, commands })
            .map_err(|_| LoadError::NotConnected)?;
        Ok(id)
    }

    fn request(&self, request: EngineRequest) -> std::result::Result<(), ControllerError> {
        let tx = self
            .request_tx
            .as_ref()
            .ok_or(ControllerError::NotConnected)?;
        tx.send(request).map_err(|_| ControllerError::EngineStopped)
    }

    async fn open_link(&self) -> std::result::Result<DeviceLink, ConnectError> {
        match &self.target {
            ConnectTarget::Serial(params) => {
                let params = params.clone();
                tokio::task::spawn_blocking(move || DeviceLink::open(&params))
                    .await
                    .map_err(|e| ConnectError::FailedToOpen {
                        port: self.name.clone(),
                        reason: e.to_string(),
                    })?
            }
            ConnectTarget::Transport { params, transport } => {
                let transport = transport.lock().take().ok_or_else(|| {
                    ConnectError::InvalidParameters {
                        reason: "transport already used by an earlier connection".to_string(),
                    }
                })?;
                let port = params.port.clone();
                let settle = params.settle();
                tokio::task::spawn_blocking(move || {
                    DeviceLink::with_transport(transport, &port, settle)
                })
                .await
                .map_err(|e| ConnectError::FailedToOpen {
                    port: self.name.clone(),
                    reason: e.to_string(),
                })?
            }
        }
    }
}

#[async_trait]
impl ControllerTrait for PlotterController {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<()> {
        // the engine may have stopped on its own after losing the link
        if self.engine_task.as_ref().is_some_and(|h| h.is_finished()) {
            self.engine_task = None;
            self.request_tx = None;
        }
        if self.request_tx.is_some() {
            return Err(ControllerError::AlreadyConnected.into());
        }

        self.state.write().connection = ConnectionState::Connecting;
        let link = match self.open_link().await {
            Ok(link) => link,
            Err(e) => {
                tracing::error!("Connection to {} failed: {}", self.name, e);
                self.state.write().connection = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.write();
            state.connection = ConnectionState::Connected;
            state.machine_state = MachineState::Unknown;
        }
        self.events
            .publish(ControllerEvent::Connected(link.port().to_string()));

        let engine = Engine {
            link,
            requests: rx,
            state: self.state.clone(),
            events: self.events.clone(),
            streaming: StreamingController::new(self.config.streaming(), self.events.clone()),
            poller: StatusPoller::new(Duration::from_millis(self.config.status_poll_ms)),
            read_timeout: self.target.params().read_timeout(),
        };
        self.engine_task = Some(tokio::task::spawn_blocking(move || engine.run()));
        self.request_tx = Some(tx);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(tx) = self.request_tx.take() {
            let _ = tx.send(EngineRequest::Shutdown);
        }
        if let Some(handle) = self.engine_task.take() {
            handle
                .await
                .map_err(|e| Error::other(format!("Engine task failed: {}", e)))?;
        }
        self.state.write().connection = ConnectionState::Disconnected;
        Ok(())
    }

    fn load_program(&self, lines: Vec<String>) -> std::result::Result<SessionId, LoadError> {
        if !self.is_connected() {
            return Err(LoadError::NotConnected);
        }
        self.start_session(self.loader.load(lines))
    }

    fn pause(&self) -> Result<()> {
        Ok(self.request(EngineRequest::Pause)?)
    }

    fn resume(&self) -> Result<()> {
        Ok(self.request(EngineRequest::Resume)?)
    }

    fn abort(&self) -> Result<()> {
        Ok(self.request(EngineRequest::Abort)?)
    }

    fn send_immediate(&self, command: &str) -> Result<()> {
        let command = command.trim();
        if command.is_empty() || command.contains(['\n', '\r']) {
            return Err(ControllerError::InvalidCommand {
                reason: "expected a single non-empty line".to_string(),
            }
            .into());
        }
        Ok(self.request(EngineRequest::SendImmediate(command.to_string()))?)
    }

    fn snapshot(&self) -> Snapshot {
        self.state.read().snapshot()
    }
}

impl Drop for PlotterController {
    fn drop(&mut self) {
        if let Some(tx) = self.request_tx.take() {
            let _ = tx.send(EngineRequest::Shutdown);
        }
    }
}

struct Engine {
    link: DeviceLink,
    requests: mpsc::UnboundedReceiver<EngineRequest>,
    state: ThreadSafeRw<SharedState>,
    events: EventDispatcher,
    streaming: StreamingController,
    poller: StatusPoller,
    read_timeout: Duration,
}

impl Engine {
    fn run(mut self) {
        tracing::debug!("Engine started on {}", self.link.port());

        loop {
            if !self.drain_requests() {
                break;
            }

            if let Some(line) = self.link.read_line(self.read_timeout) {
                self.handle_line(&line);
            }

            let now = Instant::now();
            if self.poller.poll_due(now) {
                // a failed write flips the link to disconnected, handled below
                let _ = self.link.write_realtime(STATUS_QUERY);
                self.poller.mark_polled(now);
            }

            if !self.link.is_connected() {
                tracing::error!("Lost connection to {}", self.link.port());
                self.streaming.abort();
                break;
            }

            self.sync_state();
        }

        self.link.close();
        self.sync_state();
        self.state.write().connection = ConnectionState::Disconnected;
        self.events.publish(ControllerEvent::Disconnected);
        tracing::debug!("Engine stopped");
    }

    /// Returns false once the engine should stop
    fn drain_requests(&mut self) -> bool {
        loop {
            let request = match self.requests.try_recv() {
                Ok(request) => request,
                Err(mpsc::error::TryRecvError::Empty) => return true,
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            };

            let now = Instant::now();
            match request {
                EngineRequest::Load { id, commands } => {
                    self.streaming.start(&mut self.link, id, commands, now);
                }
                EngineRequest::Pause => self.streaming.pause(&mut self.link),
                EngineRequest::Resume => self.streaming.resume(&mut self.link, now),
                EngineRequest::Abort => self.streaming.abort(),
                EngineRequest::SendImmediate(command) => {
                    if let Err(e) = self.streaming.send_immediate(&mut self.link, &command, now) {
                        tracing::warn!("Rejected manual command: {}", e);
                    }
                }
                EngineRequest::ClearTrace => self.state.write().trace.clear(),
                EngineRequest::Shutdown => {
                    self.streaming.abort();
                    return false;
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        let now = Instant::now();
        match Response::parse(line) {
            None => {}
            Some(Response::Ok) => self.streaming.on_ack(&mut self.link, now),
            Some(Response::Error(code)) => self.streaming.on_error(&mut self.link, code, now),
            Some(Response::Alarm(code)) => {
                let message = decode_alarm(code);
                tracing::warn!("ALARM:{} ({})", code, message);
                self.events.publish(ControllerEvent::Alarm {
                    code,
                    message: message.to_string(),
                });
            }
            Some(Response::Status(report)) => self.handle_status(&report, now),
            Some(Response::Message(message)) => {
                tracing::info!("> {}", message);
                self.events.publish(ControllerEvent::Message(message));
            }
            Some(Response::Noise(line)) => {
                tracing::debug!("Ignoring unparseable line: {}", line);
            }
        }
    }

    fn handle_status(&mut self, report: &StatusReport, now: Instant) {
        let pen = self.streaming.pen();
        let mut state_changed = false;
        let mut moved = None;
        {
            let mut shared = self.state.write();
            if shared.machine_state != report.state {
                shared.machine_state = report.state;
                state_changed = true;
            }
            if let Some(position) = report.position() {
                shared.position = position;
                if shared.trace.record(position, pen) {
                    moved = Some(position);
                }
            }
        }

        if state_changed {
            tracing::debug!("Machine state: {}", report.state);
            self.events
                .publish(ControllerEvent::StateChanged(report.state));
        }
        if let Some(position) = moved {
            self.events
                .publish(ControllerEvent::PositionChanged(position));
        }

        if self.streaming.should_recover(report.state, now) {
            self.streaming.recover(&mut self.link, now);
        }
    }

    fn sync_state(&self) {
        let mut shared = self.state.write();
        shared.estimated_pen = self.streaming.pen();
        shared.session = self.streaming.progress();
    }
}
