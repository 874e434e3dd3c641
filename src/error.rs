//! Error types for guarded calls.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Result type for guarded calls.
pub type GuardResult<T, E> = Result<T, GuardError<E>>;

/// Error type for guarded calls.
#[derive(Debug)]
pub enum GuardError<E> {
    /// The guard refused to run the operation.
    Open(OpenError),

    /// The operation ran and failed. The error is passed through untouched.
    Operation(E),
}

impl<E> GuardError<E> {
    /// Returns `true` if the guard refused the call.
    pub fn is_open(&self) -> bool {
        matches!(self, GuardError::Open(_))
    }

    /// Returns the operation's own error, if the operation ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            GuardError::Operation(e) => Some(e),
            GuardError::Open(_) => None,
        }
    }
}

/// A refusal issued by an open guard.
///
/// Says nothing about the dependency itself, only that the guard would not
/// let the call through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenError {
    retry_after: Duration,
}

impl OpenError {
    pub(crate) fn new(retry_after: Duration) -> Self {
        Self { retry_after }
    }

    /// Time left in the reset window. Zero when the refusal was caused by a
    /// trial that is still running.
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }
}

impl<E> Display for GuardError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GuardError::Open(e) => write!(f, "{}", e),
            GuardError::Operation(e) => write!(f, "Operation error: {}", e),
        }
    }
}

impl Display for OpenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Guard is open")
    }
}

impl<E: Error + 'static> Error for GuardError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GuardError::Open(e) => Some(e),
            GuardError::Operation(e) => Some(e),
        }
    }
}

impl Error for OpenError {}
