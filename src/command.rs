//! AT command table and command line rendering for SARA-R4 modules.
//!
//! Every operation the driver performs has exactly one [`CommandSpec`] in a
//! [`CommandTable`]: the fixed command prefix (mnemonic plus any constant
//! leading parameters), the token the modem prints on success, and the time
//! the modem is given to print it. Arguments are serialized onto the prefix
//! by [`Command`].

use core::fmt::Write as _;

use atat::serde_at::ser::to_slice;
use atat::serde_at::SerializeOptions;
use embassy_time::Duration;
use heapless::String;
use serde::Serialize;

use crate::error::Error;
use crate::matcher::MAX_TOKEN_LEN;

/// Longest command line the driver renders, terminator excluded.
pub const COMMAND_CAPACITY: usize = 256;

pub type Token = String<MAX_TOKEN_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Operation {
    Attention,
    EchoOff,
    TimeZoneUpdate,
    RegistrationStatus,
    SetMnoProfile,
    SetApn,
    ContextInfo,
    Operator,
    SignalQuality,
    ImportCertificate,
    /// Raw certificate bytes following the import prompt
    CertificateData,
    AssignCertificate,
    EnableTls,
    SetClientId,
    SetBroker,
    SetCredentials,
    SetWillTopic,
    SetWillMessage,
    SetKeepaliveInterval,
    EnableKeepalive,
    Login,
    Publish,
    Subscribe,
    Logout,
}

impl Operation {
    pub const ALL: [Operation; 24] = [
        Operation::Attention,
        Operation::EchoOff,
        Operation::TimeZoneUpdate,
        Operation::RegistrationStatus,
        Operation::SetMnoProfile,
        Operation::SetApn,
        Operation::ContextInfo,
        Operation::Operator,
        Operation::SignalQuality,
        Operation::ImportCertificate,
        Operation::CertificateData,
        Operation::AssignCertificate,
        Operation::EnableTls,
        Operation::SetClientId,
        Operation::SetBroker,
        Operation::SetCredentials,
        Operation::SetWillTopic,
        Operation::SetWillMessage,
        Operation::SetKeepaliveInterval,
        Operation::EnableKeepalive,
        Operation::Login,
        Operation::Publish,
        Operation::Subscribe,
        Operation::Logout,
    ];

    /// Operations whose bytes are written verbatim instead of as an AT line.
    pub fn is_raw(self) -> bool {
        matches!(self, Operation::CertificateData)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub op: Operation,
    pub prefix: &'static str,
    pub ack: &'static str,
    pub timeout: Duration,
}

impl CommandSpec {
    const fn new(op: Operation, prefix: &'static str, ack: &'static str, timeout_ms: u64) -> Self {
        Self {
            op,
            prefix,
            ack,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

#[derive(Debug)]
pub struct CommandTable {
    pub version: u16,
    pub entries: &'static [CommandSpec],
}

impl CommandTable {
    /// Check that every operation is present exactly once and that prefixes,
    /// tokens and timeouts are usable.
    pub fn validate(&self) -> Result<(), Error> {
        for op in Operation::ALL {
            let mut found = self.entries.iter().filter(|e| e.op == op);
            let spec = found.next().ok_or_else(|| {
                error!("Command table v{} lacks {:?}", self.version, op);
                Error::InvalidCommandTable
            })?;
            if found.next().is_some() {
                error!("Command table v{} defines {:?} twice", self.version, op);
                return Err(Error::InvalidCommandTable);
            }

            let prefix_ok = if op.is_raw() {
                spec.prefix.is_empty()
            } else {
                spec.prefix.starts_with("AT") && spec.prefix.len() < COMMAND_CAPACITY
            };
            let ack_ok = !spec.ack.is_empty() && spec.ack.len() < MAX_TOKEN_LEN;

            if !prefix_ok || !ack_ok || spec.timeout.as_ticks() == 0 {
                error!("Command table v{} has an invalid {:?} entry", self.version, op);
                return Err(Error::InvalidCommandTable);
            }
        }
        Ok(())
    }

    pub fn get(&self, op: Operation) -> Result<&CommandSpec, Error> {
        self.entries
            .iter()
            .find(|e| e.op == op)
            .ok_or(Error::InvalidCommandTable)
    }
}

/// Commands, tokens and timeouts of SARA-R410M/R412M firmware with the
/// built-in MQTT client.
pub static SARA_R4: CommandTable = CommandTable {
    version: 1,
    entries: &[
        CommandSpec::new(Operation::Attention, "AT", "OK", 500),
        CommandSpec::new(Operation::EchoOff, "ATE0", "OK", 200),
        CommandSpec::new(Operation::TimeZoneUpdate, "AT+CTZU=1", "OK", 5000),
        CommandSpec::new(Operation::RegistrationStatus, "AT+CEREG?", "+CEREG:", 1000),
        CommandSpec::new(Operation::SetMnoProfile, "AT+UMNOPROF=", "OK", 1000),
        CommandSpec::new(Operation::SetApn, "AT+CGDCONT=1,\"IP\"", "OK", 1000),
        CommandSpec::new(Operation::ContextInfo, "AT+CGDCONT?", "+CGDCONT:", 1000),
        CommandSpec::new(Operation::Operator, "AT+COPS?", "+COPS:", 3000),
        CommandSpec::new(Operation::SignalQuality, "AT+CSQ", "+CSQ:", 1000),
        CommandSpec::new(Operation::ImportCertificate, "AT+USECMNG=0", ">", 10000),
        // Followed by the certificate type digit
        CommandSpec::new(Operation::CertificateData, "", "+USECMNG: 0,", 10000),
        CommandSpec::new(Operation::AssignCertificate, "AT+USECPRF=", "OK", 1000),
        CommandSpec::new(Operation::EnableTls, "AT+UMQTT=11,1", "+UMQTT: 11,1", 5000),
        CommandSpec::new(Operation::SetClientId, "AT+UMQTT=0", "+UMQTT: 0,1", 10000),
        CommandSpec::new(Operation::SetBroker, "AT+UMQTT=2", "+UMQTT: 2,1", 10000),
        CommandSpec::new(Operation::SetCredentials, "AT+UMQTT=4", "+UMQTT: 4,1", 10000),
        CommandSpec::new(Operation::SetWillTopic, "AT+UMQTTWTOPIC=0,0", "+UMQTTWTOPIC: 1", 10000),
        CommandSpec::new(Operation::SetWillMessage, "AT+UMQTTWMSG=", "+UMQTTWMSG: 1", 10000),
        CommandSpec::new(Operation::SetKeepaliveInterval, "AT+UMQTT=10", "+UMQTT: 10,1", 10000),
        CommandSpec::new(Operation::EnableKeepalive, "AT+UMQTTC=8,1", "+UMQTTC: 8,1", 10000),
        CommandSpec::new(Operation::Login, "AT+UMQTTC=1", "+UUMQTTC: 1,0", 60000),
        CommandSpec::new(Operation::Publish, "AT+UMQTTC=2", "+UMQTTC: 2,1", 60000),
        CommandSpec::new(Operation::Subscribe, "AT+UMQTTC=4", "+UMQTTC: 4,1", 10000),
        CommandSpec::new(Operation::Logout, "AT+UMQTTC=0", "+UMQTTC: 0,1", 10000),
    ],
};

/// Type of the security data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CertificateKind {
    /// 0: trusted root CA (certificate authority) certificate
    TrustedRootCA = 0,
    /// 1: client certificate
    ClientCertificate = 1,
    /// 2: client private key
    ClientPrivateKey = 2,
}

impl CertificateKind {
    pub const ALL: [CertificateKind; 3] = [
        CertificateKind::TrustedRootCA,
        CertificateKind::ClientCertificate,
        CertificateKind::ClientPrivateKey,
    ];

    /// `+USECPRF` operation binding this kind of data to a security profile
    pub fn profile_operation(self) -> u8 {
        match self {
            // Trusted root certificate internal name
            CertificateKind::TrustedRootCA => 3,
            // Client certificate internal name
            CertificateKind::ClientCertificate => 5,
            // Client private key internal name
            CertificateKind::ClientPrivateKey => 6,
        }
    }
}

/// Import acknowledgement for `kind`, e.g. `+USECMNG: 0,1`.
pub fn certificate_ack(spec: &CommandSpec, kind: CertificateKind) -> Result<Token, Error> {
    let mut token = Token::new();
    write!(token, "{}{}", spec.ack, kind as u8)?;
    Ok(token)
}

/// A rendered AT command line.
///
/// Arguments are the fields of a `Serialize` value, written by `serde_at`
/// in declaration order: integers in decimal, strings in double quotes, all
/// separated by `,`. The first argument follows the prefix directly when it
/// ends in `=` or `,`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    line: String<COMMAND_CAPACITY>,
}

impl Command {
    pub fn new(prefix: &str) -> Result<Self, Error> {
        let mut line = String::new();
        line.push_str(prefix).map_err(|_| Error::CommandOverflow)?;
        Ok(Self { line })
    }

    pub fn from_spec(spec: &CommandSpec) -> Result<Self, Error> {
        Self::new(spec.prefix)
    }

    /// The prefix of `spec` followed by `args`.
    pub fn with_args<A: Serialize>(spec: &CommandSpec, args: &A) -> Result<Self, Error> {
        Self::from_spec(spec)?.append(args)
    }

    pub fn append<A: Serialize>(mut self, args: &A) -> Result<Self, Error> {
        if !self.line.ends_with('=') && !self.line.ends_with(',') {
            self.line.push(',').map_err(|_| Error::CommandOverflow)?;
        }

        let options = SerializeOptions {
            value_sep: false,
            cmd_prefix: "",
            termination: "",
            ..SerializeOptions::default()
        };
        let mut buf = [0u8; COMMAND_CAPACITY];
        let len = to_slice(args, "", &mut buf, options).map_err(|_| Error::CommandOverflow)?;
        let rendered = core::str::from_utf8(&buf[..len]).map_err(|_| Error::CommandOverflow)?;
        self.line
            .push_str(rendered)
            .map_err(|_| Error::CommandOverflow)?;
        Ok(self)
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.line.as_bytes()
    }
}
