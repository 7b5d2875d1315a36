use embassy_time::Duration;
use embedded_hal::digital::{ErrorType, OutputPin};
use serde::Deserialize;

use crate::command::CertificateKind;
use crate::module_timing;

/// Placeholder for boards without a `PWR_ON` line wired to the MCU.
pub struct NoPin;

impl ErrorType for NoPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Timing configuration of the driver.
#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) baud_rate: u32,
    pub(crate) bring_up_timeout: Duration,
    pub(crate) poll_tick: Duration,
    pub(crate) registration_timeout: Duration,
    pub(crate) registration_interval: Duration,
    pub(crate) power_on_pulse: Duration,
    pub(crate) boot_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Config {
            baud_rate: 115_200_u32,
            bring_up_timeout: module_timing::bring_up_timeout(),
            poll_tick: Duration::from_millis(1),
            registration_timeout: module_timing::registration_timeout(),
            registration_interval: Duration::from_millis(500),
            power_on_pulse: module_timing::pwr_on_time(),
            boot_wait: module_timing::boot_wait(),
        }
    }

    /// Baud rate the UART is expected to run at. The driver does not touch
    /// the UART configuration; this is informational for the HAL setup.
    pub fn baud_rate<B: Into<u32>>(self, baud_rate: B) -> Self {
        Config {
            baud_rate: baud_rate.into(),
            ..self
        }
    }

    /// Overall deadline for the module to answer `AT`. Exceeding it is a hard
    /// failure of the bring-up.
    pub fn with_bring_up_timeout(self, timeout: Duration) -> Self {
        Config {
            bring_up_timeout: timeout,
            ..self
        }
    }

    /// Idle time between two polls of the serial input while waiting for a
    /// response.
    pub fn with_poll_tick(self, tick: Duration) -> Self {
        Config {
            poll_tick: tick,
            ..self
        }
    }

    pub fn with_registration_timeout(self, timeout: Duration) -> Self {
        Config {
            registration_timeout: timeout,
            ..self
        }
    }

    pub fn with_registration_interval(self, interval: Duration) -> Self {
        Config {
            registration_interval: interval,
            ..self
        }
    }

    pub fn with_power_on_pulse(self, pulse: Duration) -> Self {
        Config {
            power_on_pulse: pulse,
            ..self
        }
    }

    pub fn with_boot_wait(self, wait: Duration) -> Self {
        Config {
            boot_wait: wait,
            ..self
        }
    }

    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

/// Last will registered with the broker at login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub message: &'a str,
}

/// A certificate or private key loaded by the caller from storage.
#[derive(Debug, Clone, Copy)]
pub struct Certificate<'a> {
    /// Internal name the modem stores the data under
    pub name: &'a str,
    pub data: &'a [u8],
}

/// TLS material imported into the modem and bound to a security profile.
#[derive(Debug, Clone, Copy)]
pub struct TlsConfig<'a> {
    /// USECMNG security profile identifier, 0-4
    pub profile: u8,
    pub ca: Certificate<'a>,
    pub client_cert: Certificate<'a>,
    pub client_key: Certificate<'a>,
}

impl<'a> TlsConfig<'a> {
    pub fn certificate(&self, kind: CertificateKind) -> &Certificate<'a> {
        match kind {
            CertificateKind::TrustedRootCA => &self.ca,
            CertificateKind::ClientCertificate => &self.client_cert,
            CertificateKind::ClientPrivateKey => &self.client_key,
        }
    }
}

/// Everything the setup sequence needs to reach a logged-in MQTT session.
///
/// The string fields borrow from the caller, so the whole structure can be
/// deserialized in place from a configuration blob. TLS material is bytes
/// loaded separately and therefore not part of the serialized form.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionInfo<'a> {
    /// `+UMNOPROF` mobile network operator profile set before the APN
    pub mno_profile: Option<u8>,
    #[serde(borrow)]
    pub apn: Option<&'a str>,
    pub host: &'a str,
    pub port: u16,
    #[serde(borrow)]
    pub client_id: Option<&'a str>,
    #[serde(borrow)]
    pub username: Option<&'a str>,
    #[serde(borrow)]
    pub password: Option<&'a str>,
    #[serde(borrow)]
    pub will: Option<Will<'a>>,
    /// MQTT ping interval in seconds; `None` leaves keepalive disabled
    pub keepalive: Option<u16>,
    #[serde(skip)]
    pub tls: Option<TlsConfig<'a>>,
}

impl<'a> ConnectionInfo<'a> {
    pub const fn new(host: &'a str, port: u16) -> Self {
        Self {
            mno_profile: None,
            apn: None,
            host,
            port,
            client_id: None,
            username: None,
            password: None,
            will: None,
            keepalive: None,
            tls: None,
        }
    }
}
