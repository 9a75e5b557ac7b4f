//! Firmware protocol: response classification, status reports and error codes

pub mod error_decoder;
pub mod response;
pub mod status;

pub use error_decoder::{decode_alarm, decode_error, format_alarm, format_error};
pub use response::Response;
pub use status::{BufferState, StatusPoller, StatusReport};

/// Realtime status query
pub const STATUS_QUERY: u8 = b'?';
/// Realtime feed hold
pub const FEED_HOLD: u8 = b'!';
/// Realtime cycle start / resume
pub const CYCLE_START: u8 = b'~';
/// Realtime soft reset (Ctrl-X)
pub const SOFT_RESET: u8 = 0x18;

/// True for bytes the firmware acts on outside the line buffer
pub fn is_realtime(byte: u8) -> bool {
    matches!(byte, STATUS_QUERY | FEED_HOLD | CYCLE_START | SOFT_RESET)
}
