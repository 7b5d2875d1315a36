mod mqtt;
mod pwr;
mod security;
mod setup;

use atat::serde_at;
use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;
use heapless::String;
use no_std_net::Ipv4Addr;
use serde::{Deserialize, Serialize};

use crate::command::{Command, CommandSpec, CommandTable, Operation, SARA_R4};
use crate::config::Config;
use crate::engine::Engine;
use crate::error::Error;
use crate::matcher::Response;
use crate::registration::{parse_cereg, RegistrationTracker, Status};
use crate::session::{Console, Event, Stage};
use crate::transport::Transport;

pub use mqtt::QoS;

/// Longest APN 3GPP TS 23.003 allows
pub const APN_CAPACITY: usize = 100;

/// The context defined by [`Modem::set_apn`]
const CONTEXT_ID: u8 = 1;

/// 18.4 PDP context definition +CGDCONT
///
/// `<cid>,<PDP_type>,<APN>,<PDP_addr>,<d_comp>,<h_comp>`, exactly these six
/// fields.
#[derive(Debug, Clone, Deserialize)]
pub struct PdpContext {
    pub cid: u8,
    pub pdp_type: String<8>,
    pub apn: String<APN_CAPACITY>,
    pub addr: String<15>,
    pub d_comp: u8,
    pub h_comp: u8,
}

/// PDP context 1 as reported by `AT+CGDCONT?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub apn: String<APN_CAPACITY>,
    pub ip: Ipv4Addr,
}

impl ContextInfo {
    /// Decode the first `+CGDCONT` line, which has to describe context 1
    /// with an IPv4 address assigned.
    pub fn parse(line: &str) -> Result<Self, Error> {
        let context: PdpContext =
            serde_at::from_str(line.trim()).map_err(|_| Error::MalformedResponse)?;
        if context.cid != CONTEXT_ID {
            warn!("First PDP context is {}, not {}", context.cid, CONTEXT_ID);
            return Err(Error::MalformedResponse);
        }

        let ip = context
            .addr
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::MalformedResponse)?;
        Ok(Self {
            apn: context.apn,
            ip,
        })
    }
}

/// 7.5 Operator selection +COPS
#[derive(Debug, Clone, Deserialize)]
struct OperatorSelection {
    _mode: u8,
    _format: Option<u8>,
    oper: Option<String<24>>,
    _act: Option<u8>,
}

/// 7.2 Signal quality +CSQ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalQuality {
    /// 0..=31 from -113 dBm upwards in 2 dB steps, 99 when unknown
    pub rssi: u8,
    /// Channel bit error rate class, 99 when unknown
    pub qual: u8,
}

impl SignalQuality {
    /// Received signal strength in dBm, if the module knows it.
    pub fn rssi_dbm(&self) -> Option<i16> {
        match self.rssi {
            0..=31 => Some(-113 + 2 * i16::from(self.rssi)),
            _ => None,
        }
    }
}

/// A SARA-R4 module behind a serial link.
///
/// Owns the transaction engine and therefore the transport. Every operation
/// is a blocking call bounded by the timeout of its command table entry.
pub struct Modem<T, D, C> {
    engine: Engine<T, D>,
    table: &'static CommandTable,
    config: Config,
    console: C,
    registration: RegistrationTracker,
}

impl<T, D, C> Modem<T, D, C>
where
    T: Transport,
    D: DelayNs,
    C: Console,
{
    pub fn new(transport: T, delay: D, config: Config, console: C) -> Result<Self, Error> {
        Self::with_table(transport, delay, config, console, &SARA_R4)
    }

    /// Use a different command table, e.g. for another firmware revision.
    pub fn with_table(
        transport: T,
        delay: D,
        config: Config,
        console: C,
        table: &'static CommandTable,
    ) -> Result<Self, Error> {
        table.validate()?;
        debug!("Using command table v{}", table.version);

        Ok(Self {
            engine: Engine::new(transport, delay, config.poll_tick),
            table,
            config,
            console,
            registration: RegistrationTracker::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn registration(&self) -> &RegistrationTracker {
        &self.registration
    }

    pub fn release(self) -> (T, D, C) {
        let (transport, delay) = self.engine.release();
        (transport, delay, self.console)
    }

    fn spec(&self, op: Operation) -> Result<&'static CommandSpec, Error> {
        self.table.get(op)
    }

    /// Render the command for `op` with `args` and run it against the ack
    /// and timeout from the table.
    fn transact<A: Serialize>(&mut self, op: Operation, args: &A) -> Result<Response, Error> {
        let spec = self.spec(op)?;
        let cmd = Command::with_args(spec, args)?;
        self.engine.execute(&cmd, spec.ack, spec.timeout)
    }

    fn transact_capture(&mut self, op: Operation) -> Result<Response, Error> {
        let spec = self.spec(op)?;
        let cmd = Command::from_spec(spec)?;
        self.engine.execute_capture(&cmd, spec.ack, spec.timeout)
    }

    fn simple(&mut self, op: Operation) -> Result<(), Error> {
        let spec = self.spec(op)?;
        let cmd = Command::from_spec(spec)?;
        self.engine.execute(&cmd, spec.ack, spec.timeout).map(|_| ())
    }

    /// Send `AT` until the module answers or the configured bring-up deadline
    /// passes.
    ///
    /// Each attempt waits at most the attention timeout, cut short to whatever
    /// is left of the deadline.
    pub fn bring_up(&mut self) -> Result<(), Error> {
        let spec = self.spec(Operation::Attention)?;
        let cmd = Command::from_spec(spec)?;
        let deadline = Instant::now() + self.config.bring_up_timeout;
        let mut attempts = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                error!("Module not responding after {} attempts", attempts);
                return Err(Error::NotReady);
            }

            attempts += 1;
            let attempt = core::cmp::min(spec.timeout, deadline - now);
            match self.engine.execute(&cmd, spec.ack, attempt) {
                Ok(_) => {
                    info!("Module answered after {} attempts", attempts);
                    return Ok(());
                }
                Err(Error::Timeout) | Err(Error::ResponseOverflow) => {
                    self.console.event(Event::Waiting(Stage::BringUp));
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn disable_echo(&mut self) -> Result<(), Error> {
        self.simple(Operation::EchoOff)
    }

    /// Let the network update the module clock and time zone.
    pub fn enable_time_zone_update(&mut self) -> Result<(), Error> {
        self.simple(Operation::TimeZoneUpdate)
    }

    /// One `+CEREG` read.
    pub fn registration_status(&mut self) -> Result<Status, Error> {
        let response = self.transact_capture(Operation::RegistrationStatus)?;
        parse_cereg(response.tail_str()?)
    }

    /// Poll the registration status until the module is registered at home or
    /// roaming, or the registration timeout passes.
    ///
    /// A poll without a usable answer counts as [`Status::OutOfCoverage`].
    /// Every change of status is reported once.
    pub fn wait_registered(&mut self) -> Result<Status, Error> {
        let deadline = Instant::now() + self.config.registration_timeout;
        self.registration.reset();

        loop {
            let status = match self.registration_status() {
                Ok(status) => status,
                Err(e @ Error::Transport(_)) => return Err(e),
                Err(e) => {
                    debug!("Registration poll failed: {:?}", e);
                    Status::OutOfCoverage
                }
            };

            if self.registration.set_status(status) {
                info!("Registration status: {:?}", status);
                self.console.event(Event::RegistrationChanged(status));
            }

            if status.registered() {
                return Ok(status);
            }

            if Instant::now() + self.config.registration_interval >= deadline {
                warn!(
                    "Not registered after {} ms",
                    self.registration.duration(Instant::now()).as_millis()
                );
                return Err(Error::Timeout);
            }
            self.engine.pause(self.config.registration_interval);
        }
    }

    /// Select the mobile network operator profile, e.g. 0 for SW default or
    /// 100 for standard Europe.
    ///
    /// The module only accepts this with the radio off and applies it on
    /// the next reboot.
    pub fn set_mno_profile(&mut self, profile: u8) -> Result<(), Error> {
        self.transact(Operation::SetMnoProfile, &profile)
            .map(|_| ())
    }

    /// Define PDP context 1 as IP with the given APN.
    pub fn set_apn(&mut self, apn: &str) -> Result<(), Error> {
        self.transact(Operation::SetApn, &apn).map(|_| ())
    }

    /// Read back APN and IP address of PDP context 1.
    pub fn context_info(&mut self) -> Result<ContextInfo, Error> {
        let response = self.transact_capture(Operation::ContextInfo)?;
        ContextInfo::parse(response.tail_str()?)
    }

    /// Name of the operator the module is attached to, `None` while it
    /// has not selected one.
    pub fn operator(&mut self) -> Result<Option<String<24>>, Error> {
        let response = self.transact_capture(Operation::Operator)?;
        let selection: OperatorSelection = serde_at::from_str(response.tail_str()?.trim())
            .map_err(|_| Error::MalformedResponse)?;
        Ok(selection.oper)
    }

    pub fn signal_quality(&mut self) -> Result<SignalQuality, Error> {
        let response = self.transact_capture(Operation::SignalQuality)?;
        serde_at::from_str(response.tail_str()?.trim()).map_err(|_| Error::MalformedResponse)
    }

    pub(crate) fn pause(&mut self, duration: Duration) {
        self.engine.pause(duration)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::Event;
    use crate::test_helpers::{
        lock_clock, now_ms, FailingSerial, MockDelay, MockSerial, RecordingConsole,
    };

    pub(crate) type TestModem = Modem<MockSerial, MockDelay, RecordingConsole>;

    pub(crate) fn modem(serial: MockSerial, config: Config) -> TestModem {
        Modem::new(serial, MockDelay, config, RecordingConsole::default()).unwrap()
    }

    #[test]
    fn bring_up_retries_until_ok() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        serial
            .expect_silence("AT")
            .expect_silence("AT")
            .expect_after("AT", "\r\nOK\r\n", 30);

        let mut modem = modem(serial, Config::new());
        modem.bring_up().unwrap();

        assert_eq!(now_ms(), 1030);
        assert_eq!(
            modem.console().events,
            [Event::Waiting(Stage::BringUp), Event::Waiting(Stage::BringUp)]
        );
    }

    #[test]
    fn bring_up_deadline_is_not_ready() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        for _ in 0..3 {
            serial.expect_silence("AT");
        }

        let config = Config::new().with_bring_up_timeout(Duration::from_millis(1200));
        let mut modem = modem(serial, config);
        assert_eq!(modem.bring_up(), Err(Error::NotReady));

        // Last attempt only gets what is left of the deadline
        assert_eq!(now_ms(), 1200);
        let (serial, _, _) = modem.release();
        assert!(serial.script_done());
        assert_eq!(serial.written(), b"AT\rAT\rAT\r");
    }

    #[test]
    fn bring_up_stops_on_transport_error() {
        let _clock = lock_clock();
        let serial = FailingSerial::new(embedded_io::ErrorKind::BrokenPipe);
        let mut modem =
            Modem::new(serial, MockDelay, Config::new(), RecordingConsole::default()).unwrap();

        assert_eq!(
            modem.bring_up(),
            Err(Error::Transport(embedded_io::ErrorKind::BrokenPipe))
        );
        // Fails on the first attempt instead of retrying until the deadline
        assert_eq!(now_ms(), 0);
        assert!(modem.console().events.is_empty());
    }

    #[test]
    fn registration_poll_stops_on_transport_error() {
        let _clock = lock_clock();
        let serial = FailingSerial::new(embedded_io::ErrorKind::Other);
        let mut modem =
            Modem::new(serial, MockDelay, Config::new(), RecordingConsole::default()).unwrap();

        assert_eq!(
            modem.wait_registered(),
            Err(Error::Transport(embedded_io::ErrorKind::Other))
        );
        assert_eq!(now_ms(), 0);
        assert!(modem.console().events.is_empty());
    }

    #[test]
    fn registration_changes_are_debounced() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        serial
            .expect("AT+CEREG?", "\r\n+CEREG: 0,2\r\n\r\nOK\r\n")
            .expect("AT+CEREG?", "\r\n+CEREG: 0,2\r\n\r\nOK\r\n")
            .expect("AT+CEREG?", "\r\n+CEREG: 0,1\r\n\r\nOK\r\n");

        let mut modem = modem(serial, Config::new());
        assert_eq!(modem.wait_registered(), Ok(Status::Home));

        assert_eq!(
            modem.console().events,
            [
                Event::RegistrationChanged(Status::Searching),
                Event::RegistrationChanged(Status::Home),
            ]
        );
        assert!(modem.registration().registered());
    }

    #[test]
    fn silent_poll_counts_as_out_of_coverage() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        serial
            .expect_silence("AT+CEREG?")
            .expect("AT+CEREG?", "\r\n+CEREG: 0,5\r\n\r\nOK\r\n");

        let mut modem = modem(serial, Config::new());
        assert_eq!(modem.wait_registered(), Ok(Status::Roaming));
        assert_eq!(
            modem.console().events,
            [
                Event::RegistrationChanged(Status::OutOfCoverage),
                Event::RegistrationChanged(Status::Roaming),
            ]
        );
    }

    #[test]
    fn registration_gives_up_at_timeout() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        for _ in 0..3 {
            serial.expect("AT+CEREG?", "\r\n+CEREG: 0,3\r\n\r\nOK\r\n");
        }

        let config = Config::new()
            .with_registration_timeout(Duration::from_millis(1500))
            .with_registration_interval(Duration::from_millis(500));
        let mut modem = modem(serial, config);

        assert_eq!(modem.wait_registered(), Err(Error::Timeout));
        assert_eq!(
            modem.console().events,
            [Event::RegistrationChanged(Status::Denied)]
        );
        let (serial, _, _) = modem.release();
        assert!(serial.script_done());
    }

    #[test]
    fn set_apn_renders_context_definition() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        serial.expect("AT+CGDCONT=1,\"IP\",\"lpwa.telia.iot\"", "\r\nOK\r\n");

        let mut modem = modem(serial, Config::new());
        modem.set_apn("lpwa.telia.iot").unwrap();
    }

    #[test]
    fn context_info_extracts_apn_and_ip() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        serial.expect(
            "AT+CGDCONT?",
            "\r\n+CGDCONT: 1,\"IP\",\"lpwa.telia.iot\",\"10.160.17.5\",0,0\r\n\r\nOK\r\n",
        );

        let mut modem = modem(serial, Config::new());
        let info = modem.context_info().unwrap();
        assert_eq!(info.apn.as_str(), "lpwa.telia.iot");
        assert_eq!(info.ip, Ipv4Addr::new(10, 160, 17, 5));
    }

    #[test]
    fn context_info_rejects_unexpected_layout() {
        // Extra trailing fields
        assert_eq!(
            ContextInfo::parse(" 1,\"IP\",\"apn\",\"10.0.0.1\",0,0,0,0"),
            Err(Error::MalformedResponse)
        );
        // Missing fields
        assert_eq!(
            ContextInfo::parse(" 1,\"IP\",\"apn\""),
            Err(Error::MalformedResponse)
        );
        // Unquoted or invalid address
        assert_eq!(
            ContextInfo::parse(" 1,\"IP\",\"apn\",10.0.0.1,0,0"),
            Err(Error::MalformedResponse)
        );
        assert_eq!(
            ContextInfo::parse(" 1,\"IP\",\"apn\",\"10.0.0\",0,0"),
            Err(Error::MalformedResponse)
        );
        // No address assigned yet
        assert_eq!(
            ContextInfo::parse(" 1,\"IP\",\"apn\",\"\",0,0"),
            Err(Error::MalformedResponse)
        );
    }

    #[test]
    fn context_info_requires_the_first_context() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        serial.expect(
            "AT+CGDCONT?",
            "\r\n+CGDCONT: 2,\"IP\",\"internet\",\"10.0.0.2\",0,0\r\n\
             +CGDCONT: 1,\"IP\",\"lpwa.telia.iot\",\"10.0.0.1\",0,0\r\n\r\nOK\r\n",
        );

        let mut modem = modem(serial, Config::new());
        assert_eq!(modem.context_info(), Err(Error::MalformedResponse));
    }

    #[test]
    fn context_info_accepts_longest_apn() {
        let _clock = lock_clock();
        let apn = "a".repeat(APN_CAPACITY);
        let reply = format!(
            "\r\n+CGDCONT: 1,\"IP\",\"{}\",\"255.255.255.255\",0,0\r\n\r\nOK\r\n",
            apn
        );
        let mut serial = MockSerial::new();
        serial.expect("AT+CGDCONT?", &reply);

        let mut modem = modem(serial, Config::new());
        let info = modem.context_info().unwrap();
        assert_eq!(info.apn.as_str(), apn);
        assert_eq!(info.ip, Ipv4Addr::new(255, 255, 255, 255));

        let too_long = format!(" 1,\"IP\",\"{}a\",\"10.0.0.1\",0,0", apn);
        assert_eq!(ContextInfo::parse(&too_long), Err(Error::MalformedResponse));
    }

    #[test]
    fn reports_operator_and_signal_quality() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        serial
            .expect("AT+COPS?", "\r\n+COPS: 0,0,\"Telia Telia\",7\r\n\r\nOK\r\n")
            .expect("AT+CSQ", "\r\n+CSQ: 17,99\r\n\r\nOK\r\n")
            .expect("AT+COPS?", "\r\n+COPS: 2\r\n\r\nOK\r\n")
            .expect("AT+CSQ", "\r\n+CSQ: 99,99\r\n\r\nOK\r\n");

        let mut modem = modem(serial, Config::new());
        let operator = modem.operator().unwrap();
        assert_eq!(operator.as_deref(), Some("Telia Telia"));

        let quality = modem.signal_quality().unwrap();
        assert_eq!(quality, SignalQuality { rssi: 17, qual: 99 });
        assert_eq!(quality.rssi_dbm(), Some(-79));

        // Deregistered and no measurement
        assert_eq!(modem.operator(), Ok(None));
        assert_eq!(modem.signal_quality().unwrap().rssi_dbm(), None);
    }

    #[test]
    fn mno_profile_is_a_plain_integer() {
        let _clock = lock_clock();
        let mut serial = MockSerial::new();
        serial.expect("AT+UMNOPROF=100", "\r\nOK\r\n");

        let mut modem = modem(serial, Config::new());
        modem.set_mno_profile(100).unwrap();
        let (serial, _, _) = modem.release();
        assert!(serial.script_done());
    }

    #[test]
    fn invalid_table_is_rejected_at_construction() {
        static EMPTY: CommandTable = CommandTable {
            version: 0,
            entries: &[],
        };
        let res = Modem::with_table(
            MockSerial::new(),
            MockDelay,
            Config::new(),
            RecordingConsole::default(),
            &EMPTY,
        );
        assert!(matches!(res, Err(Error::InvalidCommandTable)));
    }
}
