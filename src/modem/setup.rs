use embedded_hal::delay::DelayNs;

use super::Modem;
use crate::command::CertificateKind;
use crate::config::ConnectionInfo;
use crate::error::Error;
use crate::session::{Console, Event, Outcome, SetupReport, Stage, StagePolicies, StagePolicy};
use crate::transport::Transport;

fn import_stage(kind: CertificateKind) -> Stage {
    match kind {
        CertificateKind::TrustedRootCA => Stage::ImportCa,
        CertificateKind::ClientCertificate => Stage::ImportClientCert,
        CertificateKind::ClientPrivateKey => Stage::ImportClientKey,
    }
}

fn assign_stage(kind: CertificateKind) -> Stage {
    match kind {
        CertificateKind::TrustedRootCA => Stage::AssignCa,
        CertificateKind::ClientCertificate => Stage::AssignClientCert,
        CertificateKind::ClientPrivateKey => Stage::AssignClientKey,
    }
}

impl<T, D, C> Modem<T, D, C>
where
    T: Transport,
    D: DelayNs,
    C: Console,
{
    /// Take a powered module all the way to a logged in MQTT session.
    ///
    /// Stages run strictly in the order of [`Stage::ALL`]. A stage whose input
    /// is absent from `info` is skipped. A failing stage either ends the
    /// sequence with [`Error::StageFailed`] or is recorded and passed over,
    /// as chosen by `policies`. A failed bring-up always ends the sequence
    /// with its own error, [`Error::NotReady`] once the deadline passed.
    pub fn setup(
        &mut self,
        info: &ConnectionInfo<'_>,
        policies: &StagePolicies,
    ) -> Result<SetupReport, Error> {
        let mut report = SetupReport::new();

        self.stage(&mut report, policies, Stage::BringUp, Self::bring_up)?;
        self.stage(&mut report, policies, Stage::EchoOff, Self::disable_echo)?;
        self.stage(&mut report, policies, Stage::TimeZone, Self::enable_time_zone_update)?;

        match info.mno_profile {
            Some(profile) => self.stage(&mut report, policies, Stage::MnoProfile, |m| {
                m.set_mno_profile(profile)
            })?,
            None => self.skip(&mut report, Stage::MnoProfile),
        }

        match info.apn {
            Some(apn) => self.stage(&mut report, policies, Stage::Apn, |m| m.set_apn(apn))?,
            None => self.skip(&mut report, Stage::Apn),
        }

        self.stage(&mut report, policies, Stage::Registration, |m| {
            m.wait_registered().map(|_| ())
        })?;

        match info.tls {
            Some(tls) => {
                for kind in CertificateKind::ALL {
                    let cert = tls.certificate(kind);
                    self.stage(&mut report, policies, import_stage(kind), |m| {
                        m.import_certificate(kind, cert.name, cert.data)
                    })?;
                }
                for kind in CertificateKind::ALL {
                    let cert = tls.certificate(kind);
                    self.stage(&mut report, policies, assign_stage(kind), |m| {
                        m.assign_certificate(tls.profile, kind, cert.name)
                    })?;
                }
                self.stage(&mut report, policies, Stage::Tls, |m| m.enable_tls(tls.profile))?;
            }
            None => {
                for kind in CertificateKind::ALL {
                    self.skip(&mut report, import_stage(kind));
                }
                for kind in CertificateKind::ALL {
                    self.skip(&mut report, assign_stage(kind));
                }
                self.skip(&mut report, Stage::Tls);
            }
        }

        match info.client_id {
            Some(id) => self.stage(&mut report, policies, Stage::ClientId, |m| m.set_client_id(id))?,
            None => self.skip(&mut report, Stage::ClientId),
        }

        self.stage(&mut report, policies, Stage::Broker, |m| {
            m.set_broker(info.host, info.port)
        })?;

        match info.username {
            Some(user) => self.stage(&mut report, policies, Stage::Credentials, |m| {
                m.set_credentials(user, info.password.unwrap_or(""))
            })?,
            None => self.skip(&mut report, Stage::Credentials),
        }

        match info.will {
            Some(will) => {
                self.stage(&mut report, policies, Stage::WillTopic, |m| {
                    m.set_will_topic(will.topic)
                })?;
                self.stage(&mut report, policies, Stage::WillMessage, |m| {
                    m.set_will_message(will.message)
                })?;
            }
            None => {
                self.skip(&mut report, Stage::WillTopic);
                self.skip(&mut report, Stage::WillMessage);
            }
        }

        match info.keepalive {
            Some(seconds) => {
                self.stage(&mut report, policies, Stage::KeepaliveInterval, |m| {
                    m.set_keepalive_interval(seconds)
                })?;
                self.stage(&mut report, policies, Stage::Keepalive, Self::enable_keepalive)?;
            }
            None => {
                self.skip(&mut report, Stage::KeepaliveInterval);
                self.skip(&mut report, Stage::Keepalive);
            }
        }

        self.stage(&mut report, policies, Stage::Login, Self::login)?;

        Ok(report)
    }

    fn stage<F>(
        &mut self,
        report: &mut SetupReport,
        policies: &StagePolicies,
        stage: Stage,
        run: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        self.console.event(Event::StageStarted(stage));

        match run(self) {
            Ok(()) => {
                debug!("Stage {:?} done", stage);
                report.record(stage, Outcome::Succeeded);
                self.console.event(Event::StageSucceeded(stage));
                Ok(())
            }
            Err(e) => {
                report.record(stage, Outcome::Failed(e));
                self.console.event(Event::StageFailed(stage, e));

                match policies.policy(stage) {
                    StagePolicy::Abort if stage == Stage::BringUp => {
                        error!("Stage {:?} failed: {:?}", stage, e);
                        Err(e)
                    }
                    StagePolicy::Abort => {
                        error!("Stage {:?} failed: {:?}", stage, e);
                        Err(Error::StageFailed(stage))
                    }
                    StagePolicy::Continue => {
                        warn!("Stage {:?} failed: {:?}, continuing", stage, e);
                        Ok(())
                    }
                }
            }
        }
    }

    fn skip(&mut self, report: &mut SetupReport, stage: Stage) {
        debug!("Stage {:?} not configured", stage);
        report.record(stage, Outcome::Skipped);
        self.console.event(Event::StageSkipped(stage));
    }
}
