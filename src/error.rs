use crate::session::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The module never answered `AT` before the bring-up deadline
    NotReady,
    /// The expected token was not seen before the deadline
    Timeout,
    /// A structured reply could not be decoded
    MalformedResponse,
    /// The modem sent more bytes than the response buffer holds
    ResponseOverflow,
    /// A rendered command does not fit the command buffer
    CommandOverflow,
    /// The command table failed validation
    InvalidCommandTable,
    /// A stage configured to abort the setup sequence failed
    StageFailed(Stage),

    Transport(embedded_io::ErrorKind),
    IoPin,
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Self::NotReady => defmt::write!(f, "NotReady"),
            Self::Timeout => defmt::write!(f, "Timeout"),
            Self::MalformedResponse => defmt::write!(f, "MalformedResponse"),
            Self::ResponseOverflow => defmt::write!(f, "ResponseOverflow"),
            Self::CommandOverflow => defmt::write!(f, "CommandOverflow"),
            Self::InvalidCommandTable => defmt::write!(f, "InvalidCommandTable"),
            Self::StageFailed(s) => defmt::write!(f, "StageFailed({:?})", s),
            Self::Transport(k) => defmt::write!(f, "Transport({:?})", k),
            Self::IoPin => defmt::write!(f, "IoPin"),
        }
    }
}

impl Error {
    pub(crate) fn transport<E: embedded_io::Error>(e: E) -> Self {
        Self::Transport(e.kind())
    }
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Self::CommandOverflow
    }
}
