//! Error types returned by the engine and by transports.
use alloc::string::String;
use core::fmt;

use crate::statemachine::JtagState;
use crate::swd::Ack;

/// A failure reported by the adapter backend behind a [`Transport`](crate::cable::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The adapter did not answer in time.
    #[error("adapter did not respond in time")]
    Timeout,
    /// The underlying USB or pin I/O failed.
    #[error("adapter I/O failed: {0}")]
    Io(String),
    /// The adapter returned fewer bytes or bits than were queued for reading.
    #[error("adapter returned {actual} bits, expected {expected}")]
    ShortRead { expected: usize, actual: usize },
    /// The backend cannot perform the requested operation.
    #[error("adapter does not support {0}")]
    Unsupported(&'static str),
}

/// The signal operation that an [`Error::UnsupportedSignal`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalOperation {
    /// The signal has neither a data nor an output-enable mask.
    Use,
    /// Driving the signal high.
    DriveHigh,
    /// Tri-stating the signal.
    TriState,
    /// Reading the signal.
    Read,
}

impl fmt::Display for SignalOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SignalOperation::Use => "be used by this interface",
            SignalOperation::DriveHigh => "be driven high",
            SignalOperation::TriState => "be tri-stated",
            SignalOperation::Read => "be read",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A signal, sequence or adapter setting is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
    /// The signal's masks do not allow the requested operation.
    #[error("signal '{name}' cannot {operation}")]
    UnsupportedSignal {
        name: String,
        operation: SignalOperation,
    },
    /// A path move asked for a step that no single TMS bit performs.
    #[error("{from:?} -> {to:?} isn't a valid TAP state transition")]
    InvalidTransition { from: JtagState, to: JtagState },
    /// A command named an end state the TAP cannot rest in.
    #[error("{0:?} is not a stable end state")]
    NotStable(JtagState),
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The SWD target answered with something other than OK.
    #[error("SWD target answered {0}")]
    ProtocolAck(Ack),
    /// The parity bit of SWD read data did not match the data.
    #[error("SWD read data parity mismatch")]
    DataIntegrity,
}

impl Error {
    /// Returns `true` for errors caused by a bad configuration or a bad command stream, which
    /// retrying cannot fix.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::InvalidTransition { .. }
                | Error::NotStable(_)
                | Error::DataIntegrity
        )
    }
}
