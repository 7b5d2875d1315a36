#![cfg_attr(not(test), no_std)]

//! # u-blox SARA MQTT
//!
//! Blocking driver for u-blox SARA-R4 cellular modules that brings the module
//! online over a UART and drives the MQTT client built into the modem
//! firmware.
//!
//! Every interaction is an AT transaction: the input is flushed, a command
//! line is written, and the incoming bytes are scanned for an expected token
//! until a deadline. [`Modem`] chains those transactions into the named
//! operations (APN, registration, certificate import, MQTT session) and into
//! a linear [`Modem::setup`] sequence whose per-stage failure handling is
//! chosen by the caller through [`StagePolicies`].
//!
//! ```ignore
//! let mut modem = Modem::new(uart, embassy_time::Delay, Config::new(), NoConsole)?;
//! modem.power_on(&mut pwr_pin)?;
//! let report = modem.setup(&info, &StagePolicies::lenient())?;
//! modem.publish("test/", "ping", QoS::AtMostOnce, false)?;
//! ```

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod matcher;
mod modem;
mod module_timing;
pub mod registration;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use command::{CertificateKind, Command, CommandSpec, CommandTable, Operation, SARA_R4};
pub use config::{Certificate, Config, ConnectionInfo, NoPin, TlsConfig, Will};
pub use error::Error;
pub use modem::{ContextInfo, Modem, PdpContext, QoS, SignalQuality, APN_CAPACITY};
pub use registration::{EpsRegistration, Status};
pub use session::{Console, Event, NoConsole, Outcome, SetupReport, Stage, StagePolicies, StagePolicy};
