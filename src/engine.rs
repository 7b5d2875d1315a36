//! Send one command and wait for its acknowledgement.

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;

use crate::command::Command;
use crate::error::Error;
use crate::fmt::LossyStr;
use crate::matcher::{idle, wait_for, Capture, Response};
use crate::transport::{discard_pending, Transport};

/// Line terminator the modem expects after every command
const TERMINATOR: &[u8] = b"\r";

/// Exclusive owner of the serial link.
///
/// Every transaction starts by discarding whatever is still buffered on the
/// input, so leftovers of an earlier, slower response cannot satisfy the
/// next match.
pub struct Engine<T, D> {
    transport: T,
    delay: D,
    tick: Duration,
}

impl<T, D> Engine<T, D>
where
    T: Transport,
    D: DelayNs,
{
    pub fn new(transport: T, delay: D, tick: Duration) -> Self {
        Self {
            transport,
            delay,
            tick,
        }
    }

    /// Transmit `command` and wait up to `timeout` for `token`.
    pub fn execute(
        &mut self,
        command: &Command,
        token: &str,
        timeout: Duration,
    ) -> Result<Response, Error> {
        self.transmit(command)?;
        self.receive(token, timeout, Capture::None)
    }

    /// Like [`Engine::execute`], additionally returning the rest of the line
    /// following `token`.
    pub fn execute_capture(
        &mut self,
        command: &Command,
        token: &str,
        timeout: Duration,
    ) -> Result<Response, Error> {
        self.transmit(command)?;
        self.receive(token, timeout, Capture::Line)
    }

    /// Write `data` verbatim as one contiguous transmission, without a line
    /// terminator, then wait for `token`.
    pub fn send_raw(&mut self, data: &[u8], token: &str, timeout: Duration) -> Result<Response, Error> {
        self.flush_input()?;
        debug!("Sending {} raw bytes", data.len());
        self.write(data)?;
        self.receive(token, timeout, Capture::None)
    }

    /// Blocking wait on the engine's delay provider.
    pub fn pause(&mut self, duration: Duration) {
        idle(&mut self.delay, duration);
    }

    /// Give back the transport and delay provider.
    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    fn flush_input(&mut self) -> Result<(), Error> {
        let discarded = discard_pending(&mut self.transport)?;
        if discarded > 0 {
            debug!("Discarded {} stale bytes before transmit", discarded);
        }
        Ok(())
    }

    fn transmit(&mut self, command: &Command) -> Result<(), Error> {
        self.flush_input()?;
        debug!("Sending command: {:?}", LossyStr(command.as_bytes()));
        self.write(command.as_bytes())?;
        self.write(TERMINATOR)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.transport.write_all(bytes).map_err(Error::transport)?;
        self.transport.flush().map_err(Error::transport)
    }

    fn receive(&mut self, token: &str, timeout: Duration, capture: Capture) -> Result<Response, Error> {
        let res = wait_for(
            &mut self.transport,
            &mut self.delay,
            self.tick,
            token.as_bytes(),
            timeout,
            capture,
        );
        if let Ok(ref response) = res {
            trace!("Response: {:?}", LossyStr(response.observed()));
        }
        res
    }
}
