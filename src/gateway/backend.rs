//! The remote login call.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Username and password submitted to the authentication service.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Plain-text password, sent as-is to the authentication service.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Successful response of the authentication service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LoginResponse {
    /// Bearer token for subsequent requests.
    pub access_token: String,
}

/// Failures of the authentication call itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The service rejected the credentials.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The service answered with an unexpected status.
    #[error("authentication service responded with status {0}")]
    Status(u16),

    /// The request never got a response.
    #[error("authentication service unreachable: {0}")]
    Transport(String),

    /// The response could not be understood.
    #[error("malformed login response: {0}")]
    MalformedResponse(String),
}

/// Asynchronous client for the authentication service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchanges credentials for an access token.
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, AuthError>;
}

#[async_trait]
impl<T> AuthBackend for Arc<T>
where
    T: AuthBackend + ?Sized,
{
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, AuthError> {
        (**self).login(credentials).await
    }
}

#[cfg(feature = "http")]
pub use self::http::HttpAuthBackend;

#[cfg(feature = "http")]
mod http {
    use super::{AuthBackend, AuthError, Credentials, LoginResponse};
    use crate::config::GatewayConfig;
    use async_trait::async_trait;
    use reqwest::StatusCode;

    /// [`AuthBackend`] that posts JSON credentials to `<address>/login`.
    #[derive(Debug, Clone)]
    pub struct HttpAuthBackend {
        client: reqwest::Client,
        login_url: String,
    }

    impl HttpAuthBackend {
        /// Creates a backend with a default reqwest client.
        pub fn new(config: &GatewayConfig) -> Self {
            Self::with_client(reqwest::Client::new(), config)
        }

        /// Creates a backend that sends requests through `client`.
        pub fn with_client(client: reqwest::Client, config: &GatewayConfig) -> Self {
            Self {
                client,
                login_url: config.login_url(),
            }
        }

        /// The endpoint credentials are posted to.
        pub fn login_url(&self) -> &str {
            &self.login_url
        }
    }

    #[async_trait]
    impl AuthBackend for HttpAuthBackend {
        async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, AuthError> {
            let response = self
                .client
                .post(&self.login_url)
                .json(credentials)
                .send()
                .await
                .map_err(|e| AuthError::Transport(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(AuthError::InvalidCredentials);
            }
            if !status.is_success() {
                return Err(AuthError::Status(status.as_u16()));
            }

            response
                .json::<LoginResponse>()
                .await
                .map_err(|e| AuthError::MalformedResponse(e.to_string()))
        }
    }
}
