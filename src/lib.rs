//! # authgate-rs
//!
//! A call guard (circuit breaker) for a degraded authentication dependency,
//! and the login gateway that turns the guard's refusals into a stable,
//! user-facing "temporarily unavailable" outcome.
//!
//! ## The guard
//!
//! A [`Guard`] wraps calls to exactly one dependency and moves between three
//! states:
//!
//! - **Closed**: calls pass through. `max_failures` consecutive failures open
//!   the guard.
//! - **Open**: calls are refused with [`GuardError::Open`] without running.
//!   Once `reset_timeout` has passed since the last failure, the next call is
//!   admitted as a trial.
//! - **Half-Open**: exactly one trial runs at a time. Success closes the guard.
//!   A failed trial is handled by the [`TrialFailurePolicy`].
//!
//! Operation failures are never swallowed: they come back as
//! [`GuardError::Operation`] carrying the original error.
//!
//! ```rust
//! use authgate_rs::{Guard, GuardError, GuardState};
//! use std::fmt;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct ServiceError(String);
//!
//! impl fmt::Display for ServiceError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "Service error: {}", self.0)
//!     }
//! }
//!
//! impl std::error::Error for ServiceError {}
//!
//! let guard = Guard::<ServiceError>::builder()
//!     .name("users-api")
//!     .max_failures(3)
//!     .reset_timeout(Duration::from_secs(30))
//!     .build()
//!     .expect("valid guard settings");
//!
//! match guard.call(|| Ok::<_, ServiceError>("alice".to_string())) {
//!     Ok(user) => println!("found {}", user),
//!     Err(GuardError::Open(refusal)) => println!("retry in {:?}", refusal.retry_after()),
//!     Err(GuardError::Operation(err)) => println!("call failed: {}", err),
//! }
//!
//! assert_eq!(guard.state(), GuardState::Closed);
//! ```
//!
//! ## The gateway
//!
//! [`LoginGateway`] owns the guard for the authentication service. It maps a
//! refusal to [`GatewayError::Unavailable`] (status 503 with a fixed message)
//! and passes genuine backend failures through as [`GatewayError::Backend`].
//!
//! ## Features
//!
//! - `serde` - Serialize status snapshots and user-facing error bodies
//! - `http` - [`HttpAuthBackend`], a reqwest client for the login endpoint
//! - `prometheus` - `PrometheusSink`, a Prometheus metrics integration

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod clock;
mod config;
mod error;
pub mod gateway;
mod guard;
mod hook;
mod metrics;
mod policy;
pub mod prelude;
mod state;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ConfigError, GatewayConfig, GuardBuilder, GuardConfig, DEFAULT_AUTH_API_ADDRESS,
    DEFAULT_DEPENDENCY_NAME, DEFAULT_MAX_FAILURES, DEFAULT_RESET_TIMEOUT,
};
pub use error::{GuardError, GuardResult, OpenError};
#[cfg(feature = "http")]
pub use gateway::HttpAuthBackend;
pub use gateway::{
    AuthBackend, AuthError, Credentials, ErrorBody, ErrorResponse, GatewayError, InMemorySession,
    LoginGateway, LoginResponse, Navigator, NoopNavigator, SessionStore, Unavailable,
};
pub use guard::Guard;
pub use hook::HookRegistry;
#[cfg(feature = "prometheus")]
pub use metrics::PrometheusSink;
pub use metrics::{MetricSink, NullMetricSink};
pub use policy::TrialFailurePolicy;
pub use state::{GuardState, GuardStatus};
