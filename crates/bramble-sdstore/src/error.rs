use bramble_proto::Errno;
use thiserror::Error;

/// Driver-level failures. Device timeouts stay in-band (the card may
/// still be usable after a line reset); only the mapping to errno at
/// the RPC boundary flattens them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SdError {
    #[error("i/o failure talking to the gateway")]
    Io,
    #[error("mailbox transaction failed")]
    Mailbox,
    #[error("operation not implemented")]
    NotImplemented,
    #[error("no card in the slot")]
    CardAbsent,
    #[error("card was ejected")]
    CardEjected,
    #[error("card rejected the operation")]
    CardError,
    #[error("timeout waiting for completion")]
    Timeout,
    #[error("invalid sd command issued")]
    InvalidCommand,
    #[error("command reported an error")]
    CommandError,
    #[error("unknown failure")]
    Unknown,
}

impl SdError {
    pub fn errno(self) -> Errno {
        match self {
            SdError::Io | SdError::Mailbox => Errno::EIO,
            SdError::NotImplemented => Errno::ENOSYS,
            SdError::InvalidCommand => Errno::EINVAL,
            // device-side failures surface as i/o errors to callers
            _ => Errno::EIO,
        }
    }
}
