//! Device link
//!
//! Line-oriented channel to the plotter firmware. The link owns a
//! [`Transport`] (a real serial port or the in-process [`VirtualDevice`]),
//! performs the reset handshake on open and turns the raw byte stream into
//! lines. Once open, I/O failures never surface as errors to the engine:
//! the link flips to disconnected and stays there.

pub mod serial;
pub mod virtual_device;

pub use serial::{list_ports, SerialPortInfo, SerialTransport};
pub use virtual_device::VirtualDevice;

use penstream_core::ConnectError;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Byte channel the link runs over
pub trait Transport: Read + Write + Send {
    /// Drop anything received but not read yet
    fn discard_input(&mut self) -> io::Result<()>;
}

/// Parameters for opening a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port name (`/dev/ttyUSB0`, `COM3`)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Wait after the wake-up lines so the firmware can finish rebooting
    pub settle_ms: u64,
    /// Longest a single read may block
    pub read_timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            settle_ms: 2_000,
            read_timeout_ms: 50,
        }
    }
}

impl ConnectionParams {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reject parameters no port could be opened with
    pub fn validate(&self) -> Result<(), ConnectError> {
        if self.port.trim().is_empty() {
            return Err(ConnectError::InvalidParameters {
                reason: "port name is empty".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(ConnectError::InvalidParameters {
                reason: "baud rate must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

const WAKE_UP: &[u8] = b"\r\n\r\n";
const READ_CHUNK: usize = 256;
const IDLE_BACKOFF: Duration = Duration::from_millis(5);
/// Longest unterminated line kept; anything beyond is line noise
pub const MAX_PENDING: usize = 1024;

/// An open link to the firmware
pub struct DeviceLink {
    transport: Box<dyn Transport>,
    port: String,
    pending: Vec<u8>,
    connected: bool,
}

impl DeviceLink {
    /// Open a serial port and run the reset handshake
    pub fn open(params: &ConnectionParams) -> Result<Self, ConnectError> {
        params.validate()?;
        let transport = SerialTransport::open(params)?;
        Self::with_transport(Box::new(transport), &params.port, params.settle())
    }

    /// Run the reset handshake over an already open transport.
    ///
    /// Two blank lines wake the firmware, then after `settle` everything it
    /// printed while booting is discarded.
    pub fn with_transport(
        mut transport: Box<dyn Transport>,
        port: &str,
        settle: Duration,
    ) -> Result<Self, ConnectError> {
        let handshake_failed = |e: io::Error| ConnectError::HandshakeFailed {
            port: port.to_string(),
            reason: e.to_string(),
        };

        transport.write_all(WAKE_UP).map_err(handshake_failed)?;
        transport.flush().map_err(handshake_failed)?;
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        transport.discard_input().map_err(handshake_failed)?;

        tracing::info!("Connected to {}", port);
        Ok(Self {
            transport,
            port: port.to_string(),
            pending: Vec::new(),
            connected: true,
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Send one line; a newline is appended
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.ensure_connected()?;
        tracing::debug!(">> {}", line);

        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        let result = self
            .transport
            .write_all(&data)
            .and_then(|_| self.transport.flush());
        self.check(result)
    }

    /// Send a single out-of-band byte, without newline
    pub fn write_realtime(&mut self, byte: u8) -> io::Result<()> {
        self.ensure_connected()?;
        let result = self
            .transport
            .write_all(&[byte])
            .and_then(|_| self.transport.flush());
        self.check(result)
    }

    /// Next complete, non-blank line, waiting at most `timeout`.
    ///
    /// Bytes are decoded lossily; an unfinished line stays buffered for the
    /// next call.
    pub fn read_line(&mut self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            if let Some(line) = self.take_line() {
                return Some(line);
            }
            if !self.connected {
                return None;
            }

            let got_data = match self.transport.read(&mut buf) {
                Ok(0) => false,
                Ok(n) => {
                    self.pending.extend_from_slice(&buf[..n]);
                    self.drop_overlong();
                    true
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    false
                }
                Err(e) => {
                    tracing::error!("Read from {} failed: {}", self.port, e);
                    self.connected = false;
                    return None;
                }
            };

            let now = Instant::now();
            if now >= deadline {
                return self.take_line();
            }
            if !got_data {
                std::thread::sleep(IDLE_BACKOFF.min(deadline - now));
            }
        }
    }

    /// Bytes received but not yet returned as a line
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Mark the link closed. Further writes fail and reads return nothing.
    pub fn close(&mut self) {
        if self.connected {
            let _ = self.transport.flush();
            self.connected = false;
            tracing::info!("Closed {}", self.port);
        }
    }

    /// Discard a partial line that outgrew [`MAX_PENDING`] without a newline
    fn drop_overlong(&mut self) {
        let tail_start = self
            .pending
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |pos| pos + 1);
        if self.pending.len() - tail_start > MAX_PENDING {
            tracing::debug!(
                "Dropping {} bytes of unterminated input from {}",
                self.pending.len() - tail_start,
                self.port
            );
            self.pending.truncate(tail_start);
        }
    }

    fn take_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                tracing::debug!("<< {}", line);
                return Some(line);
            }
        }
        None
    }

    fn ensure_connected(&self) -> io::Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} is disconnected", self.port),
            ))
        }
    }

    fn check(&mut self, result: io::Result<()>) -> io::Result<()> {
        if let Err(e) = &result {
            tracing::error!("Write to {} failed: {}", self.port, e);
            self.connected = false;
        }
        result
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.close();
    }
}
