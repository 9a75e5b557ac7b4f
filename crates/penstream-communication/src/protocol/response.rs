//! Response line classification

use super::error_decoder::{format_alarm, format_error};
use super::status::StatusReport;
use std::fmt;

/// One line received from the firmware
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Line acknowledgment
    Ok,
    /// Line rejected with an error code
    Error(u8),
    /// Alarm raised
    Alarm(u8),
    /// Status report
    Status(StatusReport),
    /// Informational text: startup banner, bracketed `[MSG]`/`[DEBUG]`
    /// lines and `$` setting echoes
    Message(String),
    /// Anything else, including lines with undecodable bytes
    Noise(String),
}

impl Response {
    /// Classify a received line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line == "ok" {
            return Some(Self::Ok);
        }

        if let Some(code) = strip_prefix_ignore_case(line, "error:") {
            return Some(match code.trim().parse::<u8>() {
                Ok(code) => Self::Error(code),
                Err(_) => Self::Noise(line.to_string()),
            });
        }

        if let Some(code) = strip_prefix_ignore_case(line, "alarm:") {
            return Some(match code.trim().parse::<u8>() {
                Ok(code) => Self::Alarm(code),
                Err(_) => Self::Noise(line.to_string()),
            });
        }

        if line.starts_with('<') {
            return Some(match StatusReport::parse(line) {
                Some(report) => Self::Status(report),
                None => Self::Noise(line.to_string()),
            });
        }

        if is_firmware_text(line) {
            Some(Self::Message(line.to_string()))
        } else {
            Some(Self::Noise(line.to_string()))
        }
    }
}

fn is_firmware_text(line: &str) -> bool {
    if line.contains(char::REPLACEMENT_CHARACTER) {
        return false;
    }
    line.starts_with('[')
        || line.starts_with('$')
        || strip_prefix_ignore_case(line, "grbl").is_some()
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &line[prefix.len()..])
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(code) => write!(f, "{}", format_error(*code)),
            Self::Alarm(code) => write!(f, "{}", format_alarm(*code)),
            Self::Status(report) => write!(f, "status:{}", report.raw_state),
            Self::Message(msg) => write!(f, "message:{}", msg),
            Self::Noise(line) => write!(f, "noise:{}", line),
        }
    }
}
