//! Controller interface
//!
//! The surface a front-end (GUI, CLI, test harness) uses to drive a plotter.

pub mod event;

use crate::data::{SessionId, Snapshot};
use crate::error::{LoadError, Result};
use async_trait::async_trait;

/// Controller trait implemented by the streaming engine
///
/// Connection management is async because bringing a link up waits for the
/// firmware to reboot. Everything else only posts a request to the engine
/// task and returns immediately.
#[async_trait]
pub trait ControllerTrait: Send + Sync {
    /// Get the controller name
    fn name(&self) -> &str;

    /// Open the link, run the reset handshake and start the engine
    async fn connect(&mut self) -> Result<()>;

    /// Stop the engine and close the link
    async fn disconnect(&mut self) -> Result<()>;

    /// Preprocess `lines` and start streaming them as a new session.
    ///
    /// Any session already running is discarded.
    fn load_program(&self, lines: Vec<String>) -> std::result::Result<SessionId, LoadError>;

    /// Send the hold signal and freeze the upload cursor
    fn pause(&self) -> Result<()>;

    /// Send the resume signal and let acknowledgments advance the cursor again
    fn resume(&self) -> Result<()>;

    /// Discard the current session
    fn abort(&self) -> Result<()>;

    /// Send a manual command, sharing the single outstanding-command slot
    fn send_immediate(&self, command: &str) -> Result<()>;

    /// Non-blocking copy of the current state
    fn snapshot(&self) -> Snapshot;
}
