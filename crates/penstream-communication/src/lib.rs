//! # penstream Communication
//!
//! Everything between a loaded program and the plotter firmware: the serial
//! link and its reset handshake, an in-process firmware emulator, response
//! and status report parsing, the acknowledgment-gated streaming controller
//! and the engine task that ties them together.

pub mod engine;
pub mod link;
pub mod protocol;
pub mod streaming;

pub use engine::{EngineConfig, PlotterController, SharedState};
pub use link::{
    list_ports, ConnectionParams, DeviceLink, SerialPortInfo, SerialTransport, Transport,
    VirtualDevice, MAX_PENDING,
};
pub use protocol::{Response, StatusPoller, StatusReport};
pub use streaming::{LineSink, StreamingConfig, StreamingController, StreamingSession};
