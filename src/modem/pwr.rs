use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use super::Modem;
use crate::error::Error;
use crate::session::Console;
use crate::transport::Transport;

impl<T, D, C> Modem<T, D, C>
where
    T: Transport,
    D: DelayNs,
    C: Console,
{
    /// Switch the module on by pulling its `PWR_ON` line low for
    /// `Config::with_power_on_pulse`, then wait for it to boot.
    ///
    /// The pin is expected to drive an open drain stage, so idle is high.
    pub fn power_on<P: OutputPin>(&mut self, pin: &mut P) -> Result<(), Error> {
        debug!("Attempting to power up device");
        pin.set_low().map_err(|_| Error::IoPin)?;
        self.pause(self.config.power_on_pulse);
        pin.set_high().map_err(|_| Error::IoPin)?;

        self.pause(self.config.boot_wait);
        debug!("Powered up");
        Ok(())
    }
}
