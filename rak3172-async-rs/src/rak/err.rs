//! Error types for the RAK3172 driver.

use core::fmt::{self, Debug};

/// The main error type for the RAK3172 driver, generic over the serial
/// transport error.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Error<TSERR> {
    /// An argument fell outside the range the module accepts.
    InvalidArgument,
    /// The session state does not allow the operation.
    InvalidState,
    /// The module or an in-flight transfer is still busy.
    Busy,
    /// The module answered with an error status.
    CommandFailed,
    /// No reply arrived in time.
    Timeout,
    /// A reply arrived but could not be interpreted.
    InvalidResponse,
    /// Not enough buffer memory for the operation.
    NoMemory,
    /// The LoRaWAN session is not joined.
    NotJoined,
    /// The operation is not available in the current working mode.
    InvalidMode,
    /// The regional duty-cycle limit refused the transmission.
    Restricted,
    /// A reply belonged to a different application port.
    WrongPort,
    /// The reset line could not be driven.
    Pin,
    /// The serial transport failed.
    Serial(TSERR),
}

impl<TSERR: Debug> Debug for Error<TSERR> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "InvalidArgument"),
            Self::InvalidState => write!(f, "InvalidState"),
            Self::Busy => write!(f, "Busy"),
            Self::CommandFailed => write!(f, "CommandFailed"),
            Self::Timeout => write!(f, "Timeout"),
            Self::InvalidResponse => write!(f, "InvalidResponse"),
            Self::NoMemory => write!(f, "NoMemory"),
            Self::NotJoined => write!(f, "NotJoined"),
            Self::InvalidMode => write!(f, "InvalidMode"),
            Self::Restricted => write!(f, "Restricted"),
            Self::WrongPort => write!(f, "WrongPort"),
            Self::Pin => write!(f, "Pin"),
            Self::Serial(err) => write!(f, "Serial({err:?})"),
        }
    }
}
