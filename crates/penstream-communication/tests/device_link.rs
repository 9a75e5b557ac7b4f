//! Line framing and failure handling of the device link

use penstream_communication::{DeviceLink, Response, Transport, MAX_PENDING};
use penstream_core::MachineState;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hands out pre-recorded chunks, one per read, and records writes
#[derive(Clone, Default)]
struct ScriptedTransport {
    chunks: Arc<Mutex<VecDeque<io::Result<Vec<u8>>>>>,
    written: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<Mutex<bool>>,
    discarded: Arc<Mutex<usize>>,
}

impl ScriptedTransport {
    fn push(&self, bytes: &[u8]) {
        self.chunks.lock().unwrap().push_back(Ok(bytes.to_vec()));
    }

    fn push_error(&self, kind: io::ErrorKind) {
        self.chunks.lock().unwrap().push_back(Err(kind.into()));
    }

    fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }
}

impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.chunks.lock().unwrap().pop_front() {
            Some(Ok(chunk)) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Some(Err(e)) => Err(e),
            None => Err(io::ErrorKind::TimedOut.into()),
        }
    }
}

impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if *self.fail_writes.lock().unwrap() {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.written.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn discard_input(&mut self) -> io::Result<()> {
        *self.discarded.lock().unwrap() += 1;
        self.chunks.lock().unwrap().clear();
        Ok(())
    }
}

fn open(transport: &ScriptedTransport) -> DeviceLink {
    DeviceLink::with_transport(Box::new(transport.clone()), "scripted", Duration::ZERO).unwrap()
}

const WAIT: Duration = Duration::from_millis(20);

#[test]
fn test_handshake_writes_wake_up_and_discards() {
    let transport = ScriptedTransport::default();
    transport.push(b"\r\nGrbl 1.1h ['$' for help]\r\n");

    let mut link = open(&transport);
    assert_eq!(transport.written(), b"\r\n\r\n");
    assert_eq!(*transport.discarded.lock().unwrap(), 1);
    assert_eq!(link.read_line(WAIT), None);
}

#[test]
fn test_partial_lines_are_buffered() {
    let transport = ScriptedTransport::default();
    let mut link = open(&transport);

    transport.push(b"<Idle|MPos:1.0");
    transport.push(b"00,2.000,0.000|FS:0,0>\r\no");
    transport.push(b"k\r\n");

    let line = link.read_line(WAIT).unwrap();
    let Some(Response::Status(report)) = Response::parse(&line) else {
        panic!("expected a status report, got {:?}", line);
    };
    assert_eq!(report.state, MachineState::Idle);
    assert_eq!(report.machine_pos.unwrap().x, 1.0);

    assert_eq!(link.read_line(WAIT).as_deref(), Some("ok"));
    assert_eq!(link.read_line(WAIT), None);
}

#[test]
fn test_invalid_utf8_is_replaced() {
    let transport = ScriptedTransport::default();
    let mut link = open(&transport);

    transport.push(b"[MSG] caf\xff\nok\n");
    let line = link.read_line(WAIT).unwrap();
    assert!(line.starts_with("[MSG] caf"));
    assert!(line.contains('\u{FFFD}'));
    assert_eq!(link.read_line(WAIT).as_deref(), Some("ok"));
}

#[test]
fn test_lines_and_realtime_bytes_on_the_wire() {
    let transport = ScriptedTransport::default();
    let mut link = open(&transport);

    link.write_line("G1 X1 Y2").unwrap();
    link.write_realtime(b'?').unwrap();
    assert_eq!(transport.written(), b"\r\n\r\nG1 X1 Y2\n?");
}

#[test]
fn test_write_failure_disconnects() {
    let transport = ScriptedTransport::default();
    let mut link = open(&transport);

    *transport.fail_writes.lock().unwrap() = true;
    assert!(link.write_line("G1 X1").is_err());
    assert!(!link.is_connected());

    // stays down even once the transport recovers
    *transport.fail_writes.lock().unwrap() = false;
    assert!(link.write_realtime(b'?').is_err());
    assert_eq!(link.read_line(WAIT), None);
}

#[test]
fn test_read_failure_disconnects() {
    let transport = ScriptedTransport::default();
    let mut link = open(&transport);

    transport.push_error(io::ErrorKind::BrokenPipe);
    assert_eq!(link.read_line(WAIT), None);
    assert!(!link.is_connected());
}

#[test]
fn test_timeouts_are_not_failures() {
    let transport = ScriptedTransport::default();
    let mut link = open(&transport);

    transport.push_error(io::ErrorKind::TimedOut);
    transport.push_error(io::ErrorKind::WouldBlock);
    transport.push(b"ok\n");
    assert_eq!(link.read_line(WAIT).as_deref(), Some("ok"));
    assert!(link.is_connected());
}

#[test]
fn test_close() {
    let transport = ScriptedTransport::default();
    let mut link = open(&transport);
    link.close();
    assert!(!link.is_connected());
    assert!(link.write_line("G1 X1").is_err());
}

/// Streams bytes without ever sending a newline, like a UART at the wrong baud
struct Chatter;

impl Read for Chatter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        buf.fill(b'x');
        Ok(buf.len())
    }
}

impl Write for Chatter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for Chatter {
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_unterminated_chatter_respects_timeout() {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let mut link =
            DeviceLink::with_transport(Box::new(Chatter), "chatter", Duration::ZERO).unwrap();
        let line = link.read_line(WAIT);
        let _ = tx.send((line, link.buffered(), link.is_connected()));
    });

    let (line, buffered, connected) = rx
        .recv_timeout(Duration::from_secs(3))
        .expect("read_line must return once the timeout expires");
    assert_eq!(line, None);
    assert!(buffered <= MAX_PENDING);
    assert!(connected);
}
