use atat::serde_at;
use embassy_time::{Duration, Instant};
use heapless::String;
use serde::Deserialize;

use crate::error::Error;

/// EPS registration state as reported by `+CEREG: <n>,<stat>[,...]`.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[serde(from = "u8")]
pub enum Status {
    #[default]
    None,
    NotRegistering,
    Home,
    Searching,
    Denied,
    /// Also used when a poll gets no usable answer
    OutOfCoverage,
    Roaming,
}

impl From<u8> for Status {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::NotRegistering,
            1 => Self::Home,
            2 => Self::Searching,
            3 => Self::Denied,
            4 => Self::OutOfCoverage,
            5 => Self::Roaming,
            _ => Self::None,
        }
    }
}

impl Status {
    pub fn registered(self) -> bool {
        matches!(self, Status::Home | Status::Roaming)
    }
}

/// 18.36 EPS network registration status +CEREG
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EpsRegistration {
    pub n: u8,
    pub stat: Status,
    /// Two byte tracking area code in hexadecimal format
    pub tac: Option<String<4>>,
    /// Four byte E-UTRAN cell ID in hexadecimal format
    pub ci: Option<String<8>>,
    pub act: Option<u8>,
    pub cause_type: Option<u8>,
    pub reject_cause: Option<u8>,
    pub active_time: Option<String<8>>,
    pub periodic_tau: Option<String<8>>,
}

/// Decode the part of a `+CEREG` read response following the token, e.g.
/// `" 0,5"`.
pub fn parse_cereg(tail: &str) -> Result<Status, Error> {
    serde_at::from_str::<EpsRegistration>(tail.trim())
        .map(|reg| reg.stat)
        .map_err(|_| Error::MalformedResponse)
}

/// Remembers the last polled status so that only transitions get reported.
#[derive(Debug, Clone, Default)]
pub struct RegistrationTracker {
    status: Status,
    updated: Option<Instant>,
    started: Option<Instant>,
}

impl RegistrationTracker {
    pub const fn new() -> Self {
        Self {
            status: Status::None,
            updated: None,
            started: None,
        }
    }

    /// Time spent in the current status.
    pub fn duration(&self, ts: Instant) -> Duration {
        self.started
            .and_then(|started| ts.checked_duration_since(started))
            .unwrap_or_else(|| Duration::from_millis(0))
    }

    pub fn get_status(&self) -> Status {
        self.status
    }

    /// Record a poll result, returns `true` if it differs from the previous
    /// one. The very first poll always counts as a change.
    pub fn set_status(&mut self, stat: Status) -> bool {
        let ts = Instant::now();
        let changed = self.updated.is_none() || self.status != stat;
        if changed {
            self.status = stat;
            self.started = Some(ts);
        }
        self.updated = Some(ts);
        changed
    }

    pub fn registered(&self) -> bool {
        self.status.registered()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
