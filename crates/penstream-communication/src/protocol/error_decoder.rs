//! Firmware error and alarm decoding
//!
//! Maps the numeric codes in `error:<n>` and `ALARM:<n>` lines to short
//! descriptions for logs and events.

/// Describe an `error:<code>` response
pub fn decode_error(code: u8) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse too short",
        7 => "EEPROM read failed",
        8 => "'$' command requires Idle state",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits require homing",
        11 => "Line too long",
        12 => "Step rate too high",
        13 => "Safety door open",
        14 => "Build info or startup line too long",
        15 => "Jog target exceeds travel",
        16 => "Invalid jog command",
        17 => "Laser mode requires PWM output",
        20 => "Unsupported G-code command",
        21 => "Modal group violation",
        22 => "Feed rate not set",
        23 => "Command requires an integer value",
        24 => "Conflicting axis commands",
        25 => "Repeated word in block",
        26 => "Missing axis words",
        27 => "Line number out of range",
        28 => "Missing P or L word",
        29 => "Unsupported work coordinate system",
        30 => "G53 requires G0 or G1",
        31 => "Unused axis words with G80",
        32 => "Arc without axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius geometry error",
        35 => "Arc missing offset word",
        36 => "Unused words in block",
        37 => "Tool length offset axis mismatch",
        38 => "Tool number out of range",
        _ => "Unknown error",
    }
}

/// Describe an `ALARM:<code>` line
pub fn decode_alarm(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Reset while in motion",
        4 => "Probe fail: initial state",
        5 => "Probe fail: no contact",
        6 => "Homing fail: reset",
        7 => "Homing fail: door opened",
        8 => "Homing fail: pull-off",
        9 => "Homing fail: switch not found",
        _ => "Unknown alarm",
    }
}

/// `error:<code> - <description>`
pub fn format_error(code: u8) -> String {
    format!("error:{} - {}", code, decode_error(code))
}

/// `ALARM:<code> - <description>`
pub fn format_alarm(code: u8) -> String {
    format!("ALARM:{} - {}", code, decode_alarm(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error() {
        assert_eq!(decode_error(1), "Expected command letter");
        assert_eq!(decode_error(22), "Feed rate not set");
        assert_eq!(decode_error(200), "Unknown error");
    }

    #[test]
    fn test_decode_alarm() {
        assert!(decode_alarm(1).contains("Hard limit"));
        assert_eq!(decode_alarm(42), "Unknown alarm");
    }

    #[test]
    fn test_format() {
        assert_eq!(format_error(20), "error:20 - Unsupported G-code command");
        assert!(format_alarm(2).starts_with("ALARM:2"));
    }
}
