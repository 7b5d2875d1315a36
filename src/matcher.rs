//! Time bounded streaming search for an expected token in the modem output.

use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::error::Error;
use crate::fmt::LossyStr;
use crate::transport::Transport;

/// Bytes retained from a single response, enough for a `+CGDCONT` line
/// carrying a maximum length APN.
pub const RESPONSE_CAPACITY: usize = 192;

/// Tokens are short fixed strings; longer ones are rejected by the command
/// table validation.
pub const MAX_TOKEN_LEN: usize = 32;

/// Incremental matcher for a fixed token.
///
/// A mismatching byte falls back to the longest prefix of the token that is
/// still a suffix of the bytes seen, so the byte that broke a partial match
/// can start the next one (`"OOK"` matches `"OK"`).
#[derive(Debug, Clone)]
pub struct TokenMatcher<'t> {
    token: &'t [u8],
    index: usize,
}

impl<'t> TokenMatcher<'t> {
    pub fn new(token: &'t [u8]) -> Self {
        Self { token, index: 0 }
    }

    /// Feed one byte, returns `true` once the whole token has been seen.
    pub fn feed(&mut self, byte: u8) -> bool {
        if self.token.is_empty() {
            return true;
        }

        if self.token[self.index] == byte {
            self.index += 1;
        } else {
            self.index = self.fallback(byte);
        }

        if self.index == self.token.len() {
            self.index = 0;
            return true;
        }
        false
    }

    fn fallback(&self, byte: u8) -> usize {
        let matched = &self.token[..self.index];
        (1..=self.index)
            .rev()
            .find(|&k| {
                self.token[k - 1] == byte && self.token[..k - 1] == matched[self.index + 1 - k..]
            })
            .unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }
}

/// What was read from the modem during one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    observed: Vec<u8, RESPONSE_CAPACITY>,
    tail: Option<usize>,
}

impl Response {
    pub(crate) fn new() -> Self {
        Self {
            observed: Vec::new(),
            tail: None,
        }
    }

    /// Every byte consumed while waiting, token included.
    pub fn observed(&self) -> &[u8] {
        &self.observed
    }

    /// Rest of the line following the token, for captured transactions.
    pub fn tail(&self) -> &[u8] {
        match self.tail {
            Some(start) => &self.observed[start..],
            None => &[],
        }
    }

    pub fn tail_str(&self) -> Result<&str, Error> {
        core::str::from_utf8(self.tail()).map_err(|_| Error::MalformedResponse)
    }

    fn push(&mut self, byte: u8) -> Result<(), Error> {
        self.observed
            .push(byte)
            .map_err(|_| Error::ResponseOverflow)
    }
}

/// Whether to keep reading the remainder of the line once the token matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    None,
    Line,
}

/// Consume bytes from `transport` until `token` is seen or `timeout` passes.
///
/// While nothing is buffered the matcher idles for `tick` on `delay`, never
/// past the deadline. The first byte that does not fit the response buffer aborts the wait with
/// [`Error::ResponseOverflow`].
pub fn wait_for<T, D>(
    transport: &mut T,
    delay: &mut D,
    tick: Duration,
    token: &[u8],
    timeout: Duration,
    capture: Capture,
) -> Result<Response, Error>
where
    T: Transport,
    D: DelayNs,
{
    let deadline = Instant::now() + timeout;
    let mut matcher = TokenMatcher::new(token);
    let mut response = Response::new();
    let mut matched = false;

    loop {
        while transport.read_ready().map_err(Error::transport)? {
            let mut byte = [0u8; 1];
            if transport.read(&mut byte).map_err(Error::transport)? == 0 {
                break;
            }
            let byte = byte[0];

            if matched {
                if byte == b'\r' || byte == b'\n' {
                    return Ok(response);
                }
                response.push(byte)?;
                continue;
            }

            response.push(byte)?;
            if matcher.feed(byte) {
                match capture {
                    Capture::None => return Ok(response),
                    Capture::Line => {
                        matched = true;
                        response.tail = Some(response.observed.len());
                    }
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(
                "Timeout waiting for {:?}, got {:?}",
                LossyStr(token),
                LossyStr(response.observed())
            );
            return Err(Error::Timeout);
        }

        idle(delay, core::cmp::min(tick, deadline - now));
    }
}

/// Block on `delay` for `duration`, however long it is.
pub(crate) fn idle<D: DelayNs>(delay: &mut D, duration: Duration) {
    let mut remaining = duration.as_micros();
    while remaining > 0 {
        let chunk = u32::try_from(remaining).unwrap_or(u32::MAX);
        delay.delay_us(chunk);
        remaining -= u64::from(chunk);
    }
}
