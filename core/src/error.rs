//! Error types for the request builder.
//!
//! # Design
//! Setter rejections (`InvalidInput`) are local: the builder keeps its prior
//! state and stays usable. `Transport` only ends the current execution; the
//! builder has already been reset by the time the caller sees it.

use thiserror::Error;

use crate::transport::TransportFailure;

/// Errors returned by `RequestBuilder` and `Transport` implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The transport could not hand out a handle.
    #[error("transport capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A setter rejected its argument. The builder state is unchanged.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `execute()` was called before the request was complete enough to run.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The transport reported a failure while performing the request.
    #[error("transport error {code}: {message}")]
    Transport { code: i64, message: String },
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    /// The numeric transport code, if this is a transport failure.
    pub fn transport_code(&self) -> Option<i64> {
        match self {
            Error::Transport { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<TransportFailure> for Error {
    fn from(failure: TransportFailure) -> Self {
        Error::Transport {
            code: failure.code,
            message: failure.message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
