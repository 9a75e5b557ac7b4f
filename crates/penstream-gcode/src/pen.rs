//! Host-side pen state estimate
//!
//! The plotter firmware drives the pen servo from M3/M5 and never reports it
//! back. The estimate below follows the last command sent: M3/M4 lowers the
//! pen, M5 lifts it, and a Z word at or below zero counts as engaged while a
//! positive Z counts as lifted. Anything else keeps the previous estimate.

use crate::words::GcodeWords;
use penstream_core::PenState;

/// Update the pen estimate from a command that was just sent
pub fn estimate_pen(command: &str, current: PenState) -> PenState {
    let words = GcodeWords::parse(command);

    // M5 wins if a line somehow carries both
    if words.has_m(5) {
        return PenState::Up;
    }
    if words.has_m(3) || words.has_m(4) {
        return PenState::Down;
    }

    match words.z {
        Some(z) if z <= 0.0 => PenState::Down,
        Some(_) => PenState::Up,
        None => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_m_codes() {
        assert_eq!(estimate_pen("M3", PenState::Up), PenState::Down);
        assert_eq!(estimate_pen("M03 S90", PenState::Up), PenState::Down);
        assert_eq!(estimate_pen("M5", PenState::Down), PenState::Up);
    }

    #[test]
    fn test_z_sign() {
        assert_eq!(estimate_pen("G0 Z5", PenState::Down), PenState::Up);
        assert_eq!(estimate_pen("G1 Z-0.5 F200", PenState::Up), PenState::Down);
        assert_eq!(estimate_pen("G1 Z0", PenState::Up), PenState::Down);
    }

    #[test]
    fn test_unrelated_keeps_estimate() {
        assert_eq!(estimate_pen("G1 X10 Y10", PenState::Down), PenState::Down);
        assert_eq!(estimate_pen("M30", PenState::Down), PenState::Down);
        assert_eq!(estimate_pen("?", PenState::Up), PenState::Up);
    }
}
