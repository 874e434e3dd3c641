//! Login gateway.
//!
//! # Data Flow
//! ```text
//! login(credentials, redirect)
//!     → Guard::call_async(backend.login)
//!         → refused         → GatewayError::Unavailable (503, fixed message)
//!         → backend failure → GatewayError::Backend (unchanged)
//!         → success         → session.save_token, navigator.push(redirect)
//! ```
//!
//! The gateway tells refusals apart from backend failures by variant only.
//! A backend failure that happens to trip the guard is still reported as that
//! failure; only calls that were never attempted become `Unavailable`.

mod backend;
mod error;
mod session;

#[cfg(feature = "http")]
pub use backend::HttpAuthBackend;
pub use backend::{AuthBackend, AuthError, Credentials, LoginResponse};
pub use error::{ErrorBody, ErrorResponse, GatewayError, Unavailable};
pub use session::{InMemorySession, Navigator, NoopNavigator, SessionStore};

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::GatewayConfig;
use crate::error::GuardError;
use crate::guard::Guard;
use crate::hook::HookRegistry;
use crate::metrics::NullMetricSink;
use crate::state::GuardStatus;

/// Route the user is sent to on logout.
pub const LOGIN_ROUTE: &str = "login";

/// Guard name used for the authentication dependency.
pub const AUTH_GUARD_NAME: &str = "auth-api";

/// Front door for logging users in through a guarded authentication service.
pub struct LoginGateway<B, S, N, C = SystemClock>
where
    B: AuthBackend,
    S: SessionStore,
    N: Navigator,
    C: Clock,
{
    backend: B,
    session: S,
    navigator: N,
    guard: Guard<AuthError, C>,
    dependency: String,
}

impl<B, S, N> LoginGateway<B, S, N, SystemClock>
where
    B: AuthBackend,
    S: SessionStore,
    N: Navigator,
{
    /// Creates a gateway whose guard is built from `config`.
    pub fn new(backend: B, session: S, navigator: N, config: &GatewayConfig) -> Self {
        let guard = Guard::new(
            AUTH_GUARD_NAME.to_string(),
            config.guard,
            SystemClock,
            Arc::new(NullMetricSink),
            Arc::new(HookRegistry::new()),
        );

        Self::with_guard(backend, session, navigator, guard, &config.dependency_name)
    }
}

impl<B, S, N, C> LoginGateway<B, S, N, C>
where
    B: AuthBackend,
    S: SessionStore,
    N: Navigator,
    C: Clock,
{
    /// Creates a gateway around an existing guard.
    pub fn with_guard(
        backend: B,
        session: S,
        navigator: N,
        guard: Guard<AuthError, C>,
        dependency: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            session,
            navigator,
            guard,
            dependency: dependency.into(),
        }
    }

    /// Logs a user in and, on success, stores the token and navigates to
    /// `redirect`.
    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn login(
        &self,
        credentials: &Credentials,
        redirect: Option<&str>,
    ) -> Result<LoginResponse, GatewayError> {
        let result = self
            .guard
            .call_async(|| self.backend.login(credentials))
            .await;

        match result {
            Ok(response) => {
                self.session.save_token(&response.access_token);
                if let Some(route) = redirect {
                    self.navigator.push(route);
                }
                info!("login succeeded");
                Ok(response)
            }
            Err(GuardError::Open(refusal)) => {
                warn!(
                    dependency = %self.dependency,
                    retry_after_ms = refusal.retry_after().as_millis() as u64,
                    "login refused, dependency guarded off"
                );
                Err(GatewayError::Unavailable(Unavailable::new(
                    &self.dependency,
                    refusal.retry_after(),
                )))
            }
            Err(GuardError::Operation(err)) => {
                match &err {
                    AuthError::InvalidCredentials => info!(error = %err, "login rejected"),
                    _ => warn!(error = %err, "login failed"),
                }
                Err(GatewayError::Backend(err))
            }
        }
    }

    /// Clears the session and sends the user back to the login route.
    pub fn logout(&self) {
        self.session.clear();
        self.navigator.push(LOGIN_ROUTE);
    }

    /// Returns `true` if a token is stored.
    pub fn is_logged_in(&self) -> bool {
        self.session.token().is_some()
    }

    /// `Authorization` header value for requests to other services.
    pub fn bearer_header(&self) -> Option<String> {
        self.session.token().map(|token| format!("Bearer {}", token))
    }

    /// Health snapshot of the authentication guard.
    pub fn guard_status(&self) -> GuardStatus {
        self.guard.status()
    }

    /// The guard protecting the authentication dependency.
    pub fn guard(&self) -> &Guard<AuthError, C> {
        &self.guard
    }

    /// Display name used in the unavailable message.
    pub fn dependency(&self) -> &str {
        &self.dependency
    }
}
