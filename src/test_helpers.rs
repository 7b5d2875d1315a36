//! Scripted serial port on a virtual clock.
//!
//! `embassy_time::MockDriver` is process global, so every test touching time
//! holds [`lock_clock`] for its whole body.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, Once};
use std::vec::Vec;

use embassy_time::{Duration, Instant, MockDriver};
use embedded_hal::delay::DelayNs;

use crate::session::{Console, Event};

static INIT: Once = Once::new();
static CLOCK: Mutex<()> = Mutex::new(());
static ORIGIN: AtomicU64 = AtomicU64::new(0);

pub fn lock_clock() -> MutexGuard<'static, ()> {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .try_init();
    });

    let guard = CLOCK.lock().unwrap_or_else(|e| e.into_inner());
    ORIGIN.store(Instant::now().as_ticks(), Ordering::SeqCst);
    guard
}

fn origin() -> Instant {
    Instant::from_ticks(ORIGIN.load(Ordering::SeqCst))
}

/// Virtual milliseconds since the test took the clock.
pub fn now_ms() -> u64 {
    (Instant::now() - origin()).as_millis()
}

/// Delay that advances the virtual clock instead of sleeping.
pub struct MockDelay;

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        MockDriver::get().advance(Duration::from_nanos(ns as u64));
    }

    fn delay_us(&mut self, us: u32) {
        MockDriver::get().advance(Duration::from_micros(us as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        MockDriver::get().advance(Duration::from_millis(ms as u64));
    }
}

enum Expect {
    Line(Vec<u8>),
    Raw(usize),
}

struct Exchange {
    expect: Expect,
    reply: Vec<u8>,
    after_ms: u64,
}

/// Serial port whose receive side is fed by a script.
///
/// Bytes become readable once the virtual clock reaches their timestamp.
/// Written command lines are checked against the queued expectations in
/// order, and the matching reply is scheduled relative to the write.
pub struct MockSerial {
    rx: VecDeque<(u64, u8)>,
    written: Vec<u8>,
    pending_line: Vec<u8>,
    script: VecDeque<Exchange>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self {
            rx: VecDeque::new(),
            written: Vec::new(),
            pending_line: Vec::new(),
            script: VecDeque::new(),
        }
    }

    /// Make `bytes` readable `at_ms` after the test took the clock.
    pub fn push_at(&mut self, at_ms: u64, bytes: &[u8]) {
        let at = (origin() + Duration::from_millis(at_ms)).as_ticks();
        self.rx.extend(bytes.iter().map(|&b| (at, b)));
    }

    pub fn push_now(&mut self, bytes: &[u8]) {
        let now = Instant::now().as_ticks();
        self.rx.extend(bytes.iter().map(|&b| (now, b)));
    }

    /// Expect `line` (without `\r`) and answer with `reply` right away.
    pub fn expect(&mut self, line: &str, reply: &str) -> &mut Self {
        self.expect_after(line, reply, 0)
    }

    /// Expect `line` and answer `after_ms` later.
    pub fn expect_after(&mut self, line: &str, reply: &str, after_ms: u64) -> &mut Self {
        self.script.push_back(Exchange {
            expect: Expect::Line(line.as_bytes().to_vec()),
            reply: reply.as_bytes().to_vec(),
            after_ms,
        });
        self
    }

    /// Expect `line` and never answer.
    pub fn expect_silence(&mut self, line: &str) -> &mut Self {
        self.expect(line, "")
    }

    /// Expect `len` raw bytes without terminator and answer with `reply`.
    pub fn expect_raw(&mut self, len: usize, reply: &str) -> &mut Self {
        self.script.push_back(Exchange {
            expect: Expect::Raw(len),
            reply: reply.as_bytes().to_vec(),
            after_ms: 0,
        });
        self
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Bytes queued on the receive side, ready or not.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    pub fn script_done(&self) -> bool {
        self.script.is_empty() && self.pending_line.is_empty()
    }

    fn on_byte(&mut self, byte: u8) {
        match self.script.front().map(|e| &e.expect) {
            Some(Expect::Raw(len)) => {
                let len = *len;
                self.pending_line.push(byte);
                if self.pending_line.len() == len {
                    self.complete();
                }
            }
            _ if byte == b'\r' => self.complete(),
            _ => self.pending_line.push(byte),
        }
    }

    fn complete(&mut self) {
        let line = std::mem::take(&mut self.pending_line);
        let Some(exchange) = self.script.pop_front() else {
            panic!(
                "Unexpected write: {:?}",
                std::string::String::from_utf8_lossy(&line)
            );
        };

        if let Expect::Line(expected) = &exchange.expect {
            assert_eq!(
                std::string::String::from_utf8_lossy(&line),
                std::string::String::from_utf8_lossy(expected),
                "command mismatch"
            );
        }

        let at = (Instant::now() + Duration::from_millis(exchange.after_ms)).as_ticks();
        self.rx.extend(exchange.reply.iter().map(|&b| (at, b)));
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = core::convert::Infallible;
}

impl embedded_io::ReadReady for MockSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let now = Instant::now().as_ticks();
        Ok(self.rx.front().is_some_and(|&(at, _)| at <= now))
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let now = Instant::now().as_ticks();
        let mut n = 0;
        while n < buf.len() {
            match self.rx.front() {
                Some(&(at, b)) if at <= now => {
                    buf[n] = b;
                    self.rx.pop_front();
                    n += 1;
                }
                _ => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written.extend_from_slice(buf);
        for &b in buf {
            self.on_byte(b);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Serial port whose receive side fails with `kind` on every access.
pub struct FailingSerial {
    kind: embedded_io::ErrorKind,
}

impl FailingSerial {
    pub fn new(kind: embedded_io::ErrorKind) -> Self {
        Self { kind }
    }
}

impl embedded_io::ErrorType for FailingSerial {
    type Error = embedded_io::ErrorKind;
}

impl embedded_io::ReadReady for FailingSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Err(self.kind)
    }
}

impl embedded_io::Read for FailingSerial {
    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, Self::Error> {
        Err(self.kind)
    }
}

impl embedded_io::Write for FailingSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Console keeping every event for later assertions.
#[derive(Default)]
pub struct RecordingConsole {
    pub events: Vec<Event>,
}

impl Console for RecordingConsole {
    fn event(&mut self, event: Event) {
        self.events.push(event);
    }
}
