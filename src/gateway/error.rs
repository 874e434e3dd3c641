//! What the gateway reports to its own callers.

use std::time::Duration;
use thiserror::Error;

use super::backend::AuthError;

/// Errors returned by [`LoginGateway::login`](super::LoginGateway::login).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The guard is open; the dependency was not contacted.
    #[error(transparent)]
    Unavailable(Unavailable),

    /// The dependency was contacted and failed. Passed through unchanged.
    #[error(transparent)]
    Backend(AuthError),
}

impl GatewayError {
    /// Returns `true` for the fixed "temporarily unavailable" outcome.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// The stable outcome shown while a dependency is guarded off.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{dependency} is temporarily unavailable. Please try again later.")]
pub struct Unavailable {
    dependency: String,
    retry_after: Duration,
}

impl Unavailable {
    /// HTTP status used for the outcome.
    pub const STATUS: u16 = 503;

    pub(crate) fn new(dependency: &str, retry_after: Duration) -> Self {
        Self {
            dependency: dependency.to_string(),
            retry_after,
        }
    }

    /// Display name of the unavailable dependency.
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Hint for a `Retry-After` header. Zero means "try again shortly".
    pub fn retry_after(&self) -> Duration {
        self.retry_after
    }

    /// Always 503.
    pub fn status(&self) -> u16 {
        Self::STATUS
    }

    /// The user-facing message.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Builds the `{ status, body: { message } }` response shape.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            status: self.status(),
            body: ErrorBody {
                message: self.message(),
            },
        }
    }
}

/// A status and message pair for end users.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ErrorResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: ErrorBody,
}

/// Body of an [`ErrorResponse`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ErrorBody {
    /// Human-readable explanation.
    pub message: String,
}
