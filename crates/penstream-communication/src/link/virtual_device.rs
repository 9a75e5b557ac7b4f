//! In-process plotter firmware
//!
//! Emulates the firmware the engine talks to, closely enough to stream
//! real programs without hardware: every non-blank line is answered with
//! `ok`, `?` produces a status report, `!` and `~` hold and resume, and
//! `M3`/`M5` print the pen debug messages. Moves complete instantly, so the
//! reported position jumps straight to each line's target.
//!
//! Clones share the same device, so a test can keep one clone to script
//! faults and inspect traffic while the engine owns another.

use super::Transport;
use crate::protocol::{CYCLE_START, FEED_HOLD, SOFT_RESET, STATUS_QUERY};
use penstream_core::{thread_safe, Position, ThreadSafe};
use penstream_gcode::GcodeWords;
use std::collections::VecDeque;
use std::io::{self, Read, Write};

const BANNER: &str = "Grbl-Plotter-Dummy v0.3 Ready";
const LINE_BUFFER_SIZE: usize = 128;

#[derive(Debug, Default)]
struct DeviceState {
    output: VecDeque<u8>,
    line: Vec<u8>,
    received: Vec<String>,
    realtime: Vec<u8>,
    position: Position,
    incremental: bool,
    feed: f64,
    held: bool,
    drop_acks: usize,
    fail_next: Option<u8>,
    unplugged: bool,
}

impl DeviceState {
    fn boot(&mut self) {
        self.line.clear();
        self.held = false;
        self.println("");
        self.println(BANNER);
    }

    fn println(&mut self, text: &str) {
        self.output.extend(text.as_bytes());
        self.output.extend(b"\r\n");
    }

    fn feed_byte(&mut self, byte: u8) {
        match byte {
            STATUS_QUERY => {
                self.realtime.push(byte);
                let report = self.status_report();
                self.println(&report);
            }
            FEED_HOLD => {
                self.realtime.push(byte);
                self.held = true;
                self.println("[MSG] Paused");
            }
            CYCLE_START => {
                self.realtime.push(byte);
                self.held = false;
                self.println("[MSG] Resumed");
            }
            SOFT_RESET => {
                self.realtime.push(byte);
                self.boot();
            }
            b'\n' | b'\r' => {
                if !self.line.is_empty() {
                    let line = String::from_utf8_lossy(&self.line).into_owned();
                    self.line.clear();
                    self.execute(&line);
                }
            }
            _ => {
                if self.line.len() < LINE_BUFFER_SIZE - 1 {
                    self.line.push(byte);
                }
            }
        }
    }

    fn execute(&mut self, line: &str) {
        self.received.push(line.to_string());
        let words = GcodeWords::parse(line);

        if words.has_g(90.0) {
            self.incremental = false;
        } else if words.has_g(91.0) {
            self.incremental = true;
        }
        if let Some(f) = words.f {
            self.feed = f;
        }

        if words.has_g(92.0) {
            self.position = Position::new(
                words.x.unwrap_or(self.position.x),
                words.y.unwrap_or(self.position.y),
                words.z.unwrap_or(self.position.z),
            );
        } else if words.has_axis_words() {
            let incremental = self.incremental;
            let target = |current: f64, word: Option<f64>| match word {
                Some(v) if incremental => current + v,
                Some(v) => v,
                None => current,
            };
            self.position = Position::new(
                target(self.position.x, words.x),
                target(self.position.y, words.y),
                target(self.position.z, words.z),
            );
        }

        if words.has_m(3) {
            self.println("[DEBUG] PEN DOWN");
        } else if words.has_m(5) {
            self.println("[DEBUG] PEN UP");
        }

        if let Some(code) = self.fail_next.take() {
            self.println(&format!("error:{}", code));
        } else if self.drop_acks > 0 {
            self.drop_acks -= 1;
        } else {
            self.println("ok");
        }
    }

    fn status_report(&self) -> String {
        let state = if self.held { "Hold:0" } else { "Idle" };
        format!(
            "<{}|MPos:{:.3},{:.3},{:.3}|FS:{:.0},0>",
            state, self.position.x, self.position.y, self.position.z, self.feed
        )
    }
}

/// Emulated plotter firmware, usable as a [`Transport`]
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    state: ThreadSafe<DeviceState>,
}

impl VirtualDevice {
    /// A freshly powered-up device; its banner is waiting to be read
    pub fn new() -> Self {
        let mut state = DeviceState::default();
        state.boot();
        Self {
            state: thread_safe(state),
        }
    }

    /// Lines received so far, in order
    pub fn received(&self) -> Vec<String> {
        self.state.lock().received.clone()
    }

    /// Realtime bytes received so far, in order
    pub fn realtime(&self) -> Vec<u8> {
        self.state.lock().realtime.clone()
    }

    pub fn position(&self) -> Position {
        self.state.lock().position
    }

    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Swallow the acknowledgments of the next `count` lines
    pub fn drop_next_acks(&self, count: usize) {
        self.state.lock().drop_acks += count;
    }

    /// Answer the next line with `error:<code>` instead of `ok`
    pub fn fail_next_line(&self, code: u8) {
        self.state.lock().fail_next = Some(code);
    }

    /// Queue arbitrary output, as if the firmware printed it
    pub fn inject(&self, line: &str) {
        self.state.lock().println(line);
    }

    /// Simulate the cable being pulled: every further read and write fails
    pub fn unplug(&self) {
        self.state.lock().unplugged = true;
    }
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn unplugged() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "virtual device unplugged")
}

impl Read for VirtualDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.unplugged {
            return Err(unplugged());
        }
        if state.output.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let n = buf.len().min(state.output.len());
        for (slot, byte) in buf.iter_mut().zip(state.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for VirtualDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.unplugged {
            return Err(unplugged());
        }
        for &byte in buf {
            state.feed_byte(byte);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for VirtualDevice {
    fn discard_input(&mut self) -> io::Result<()> {
        self.state.lock().output.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(device: &mut VirtualDevice) -> String {
        let mut buf = [0u8; 512];
        match device.read(&mut buf) {
            Ok(n) => String::from_utf8_lossy(&buf[..n]).into_owned(),
            Err(_) => String::new(),
        }
    }

    #[test]
    fn test_banner_then_ok() {
        let mut device = VirtualDevice::new();
        assert!(drain(&mut device).contains(BANNER));

        device.write_all(b"G1 X10 Y5\n").unwrap();
        assert_eq!(drain(&mut device), "ok\r\n");
        assert_eq!(device.position(), Position::new(10.0, 5.0, 0.0));
    }

    #[test]
    fn test_blank_lines_not_acknowledged() {
        let mut device = VirtualDevice::new();
        device.discard_input().unwrap();
        device.write_all(b"\r\n\r\n").unwrap();
        assert_eq!(drain(&mut device), "");
        assert!(device.received().is_empty());
    }

    #[test]
    fn test_realtime_bytes() {
        let mut device = VirtualDevice::new();
        device.discard_input().unwrap();

        device.write_all(b"!").unwrap();
        assert!(device.is_held());
        assert_eq!(drain(&mut device), "[MSG] Paused\r\n");

        device.write_all(b"?").unwrap();
        assert!(drain(&mut device).starts_with("<Hold:0|MPos:0.000,0.000,0.000"));

        device.write_all(b"~").unwrap();
        assert!(!device.is_held());
        assert_eq!(device.realtime(), vec![b'!', b'?', b'~']);
    }

    #[test]
    fn test_incremental_moves_and_pen_messages() {
        let mut device = VirtualDevice::new();
        device.discard_input().unwrap();
        device.write_all(b"G91\nG1 X1 Y1\nG1 X1\nM3\n").unwrap();
        assert_eq!(device.position(), Position::new(2.0, 1.0, 0.0));
        assert!(drain(&mut device).contains("[DEBUG] PEN DOWN"));
    }

    #[test]
    fn test_scripted_faults() {
        let mut device = VirtualDevice::new();
        device.discard_input().unwrap();

        device.drop_next_acks(1);
        device.write_all(b"G1 X1\n").unwrap();
        assert_eq!(drain(&mut device), "");

        device.fail_next_line(20);
        device.write_all(b"G5\n").unwrap();
        assert_eq!(drain(&mut device), "error:20\r\n");

        device.unplug();
        assert!(device.write_all(b"G1 X2\n").is_err());
    }
}
