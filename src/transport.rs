//! Serial link to the modem.
//!
//! Anything implementing the blocking [`embedded_io`] traits can be used, e.g.
//! a HAL UART or a `std` serial port wrapper. [`ReadReady`] is needed so the
//! engine can poll for bytes without blocking past its deadline.

use embedded_io::{Read, ReadReady, Write};

use crate::error::Error;

pub trait Transport: Read + Write + ReadReady {}

impl<T> Transport for T where T: Read + Write + ReadReady {}

/// Read and drop every byte the transport currently has buffered.
///
/// Returns the number of bytes discarded.
pub(crate) fn discard_pending<T: Transport>(transport: &mut T) -> Result<usize, Error> {
    let mut scratch = [0u8; 32];
    let mut discarded = 0;

    while transport.read_ready().map_err(Error::transport)? {
        let n = transport.read(&mut scratch).map_err(Error::transport)?;
        if n == 0 {
            break;
        }
        trace!("Discarding stale bytes: {:?}", crate::fmt::LossyStr(&scratch[..n]));
        discarded += n;
    }

    Ok(discarded)
}
