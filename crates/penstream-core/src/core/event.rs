//! Event system for controller communication
//!
//! Provides:
//! - Event types for session progress, machine state and link changes
//! - Event dispatcher for publishing events to subscribers

use crate::data::{MachineState, Position, SessionId};
use tokio::sync::broadcast;

/// Controller event types
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Link is up; carries the port name
    Connected(String),
    /// Link lost or closed
    Disconnected,
    /// Firmware reported a different machine state
    StateChanged(MachineState),
    /// Firmware reported a new machine position
    PositionChanged(Position),
    /// A program was loaded and streaming started
    SessionStarted {
        /// Session identifier
        id: SessionId,
        /// Number of commands in the session
        total: usize,
    },
    /// Periodic progress notification
    Progress {
        /// Session identifier
        id: SessionId,
        /// Commands handed to the device so far
        sent: usize,
        /// Number of commands in the session
        total: usize,
        /// The command that was just sent
        command: String,
    },
    /// Every command of the session was acknowledged
    SessionCompleted {
        /// Session identifier
        id: SessionId,
        /// Number of commands in the session
        total: usize,
    },
    /// Session discarded before completion
    SessionAborted {
        /// Session identifier
        id: SessionId,
        /// Commands sent before the abort
        sent: usize,
    },
    /// Hold signal sent
    Paused,
    /// Resume signal sent
    Resumed,
    /// An idle report was taken as a lost acknowledgment
    WatchdogRecovery {
        /// Session the recovery applied to, if any
        id: Option<SessionId>,
        /// Upload cursor after the recovery
        next_index: usize,
    },
    /// Firmware rejected a line
    DeviceError {
        /// Firmware error code
        code: u8,
        /// Decoded description
        message: String,
    },
    /// Firmware raised an alarm
    Alarm {
        /// Firmware alarm code
        code: u8,
        /// Decoded description
        message: String,
    },
    /// Free-form firmware message (banners, `[MSG]` lines, debug output)
    Message(String),
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerEvent::Connected(port) => write!(f, "Connected to {}", port),
            ControllerEvent::Disconnected => write!(f, "Disconnected"),
            ControllerEvent::StateChanged(state) => write!(f, "State: {}", state),
            ControllerEvent::PositionChanged(pos) => write!(f, "Position: {}", pos),
            ControllerEvent::SessionStarted { total, .. } => {
                write!(f, "Loaded {} lines", total)
            }
            ControllerEvent::Progress {
                sent,
                total,
                command,
                ..
            } => write!(f, "[{}/{}] {}", sent, total, command),
            ControllerEvent::SessionCompleted { total, .. } => {
                write!(f, "Upload complete ({} lines)", total)
            }
            ControllerEvent::SessionAborted { sent, .. } => {
                write!(f, "Upload aborted after {} lines", sent)
            }
            ControllerEvent::Paused => write!(f, "Paused"),
            ControllerEvent::Resumed => write!(f, "Resumed"),
            ControllerEvent::WatchdogRecovery { next_index, .. } => {
                write!(f, "Watchdog recovery at line {}", next_index)
            }
            ControllerEvent::DeviceError { code, message } => {
                write!(f, "error:{} ({})", code, message)
            }
            ControllerEvent::Alarm { code, message } => write!(f, "ALARM:{} ({})", code, message),
            ControllerEvent::Message(msg) => write!(f, "> {}", msg),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for controller events.
    tx: broadcast::Sender<ControllerEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Having no subscribers is not an error; the event is simply dropped.
    pub fn publish(&self, event: ControllerEvent) {
        let _ = self.tx.send(event);
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let dispatcher = EventDispatcher::default();
        let mut rx = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 1);

        dispatcher.publish(ControllerEvent::Paused);
        assert_eq!(rx.recv().await.unwrap(), ControllerEvent::Paused);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let dispatcher = EventDispatcher::default();
        dispatcher.publish(ControllerEvent::Disconnected);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_progress_display() {
        let event = ControllerEvent::Progress {
            id: uuid::Uuid::nil(),
            sent: 5,
            total: 20,
            command: "G1 X1".to_string(),
        };
        assert_eq!(event.to_string(), "[5/20] G1 X1");
    }
}
