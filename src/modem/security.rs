use embedded_hal::delay::DelayNs;
use serde::Serialize;

use super::Modem;
use crate::command::{certificate_ack, CertificateKind, Command, Operation};
use crate::error::Error;
use crate::session::Console;
use crate::transport::Transport;

/// `+USECMNG=0,<type>,<internal_name>,<data_size>`
#[derive(Serialize)]
struct PrepareImport<'a> {
    kind: u8,
    name: &'a str,
    size: usize,
}

/// `+USECPRF=<profile_id>,<op_code>,<internal_name>`
#[derive(Serialize)]
struct SecurityProfileName<'a> {
    profile: u8,
    op_code: u8,
    name: &'a str,
}

impl<T, D, C> Modem<T, D, C>
where
    T: Transport,
    D: DelayNs,
    C: Console,
{
    /// Store `data` in the module under `name`.
    ///
    /// Announces the size with `+USECMNG`, waits for the `>` prompt and then
    /// writes exactly `data.len()` bytes with nothing appended. Succeeds only
    /// once the import is acknowledged for this kind of data.
    pub fn import_certificate(
        &mut self,
        kind: CertificateKind,
        name: &str,
        data: &[u8],
    ) -> Result<(), Error> {
        let prompt = self.spec(Operation::ImportCertificate)?;
        let cmd = Command::with_args(
            prompt,
            &PrepareImport {
                kind: kind as u8,
                name,
                size: data.len(),
            },
        )?;
        self.engine.execute(&cmd, prompt.ack, prompt.timeout)?;

        let upload = self.spec(Operation::CertificateData)?;
        let ack = certificate_ack(upload, kind)?;
        self.engine.send_raw(data, &ack, upload.timeout)?;

        info!("Imported {:?} {:?} ({} bytes)", kind, name, data.len());
        Ok(())
    }

    /// Bind a stored certificate or key to security `profile`.
    pub fn assign_certificate(
        &mut self,
        profile: u8,
        kind: CertificateKind,
        name: &str,
    ) -> Result<(), Error> {
        let args = SecurityProfileName {
            profile,
            op_code: kind.profile_operation(),
            name,
        };
        self.transact(Operation::AssignCertificate, &args)
            .map(|_| ())
    }

    /// Make the MQTT client use TLS with security `profile`.
    pub fn enable_tls(&mut self, profile: u8) -> Result<(), Error> {
        self.transact(Operation::EnableTls, &profile).map(|_| ())
    }
}
