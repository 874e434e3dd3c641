//! Login gateway against a flaky in-process auth service.
//!
//! Run with `RUST_LOG=debug cargo run --example login`.

use async_trait::async_trait;
use authgate_rs::{
    AuthBackend, AuthError, Credentials, GatewayConfig, GatewayError, InMemorySession,
    LoginGateway, LoginResponse, NoopNavigator,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Refuses connections for a stretch of calls, then comes back.
#[derive(Default)]
struct FlakyAuthService {
    calls: AtomicU32,
}

#[async_trait]
impl AuthBackend for FlakyAuthService {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, AuthError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(50)).await;

        match call {
            2..=5 => Err(AuthError::Transport("connection refused".to_string())),
            _ if credentials.password != "secret" => Err(AuthError::InvalidCredentials),
            _ => Ok(LoginResponse {
                access_token: format!("token-for-{}-{}", credentials.username, call),
            }),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = GatewayConfig::from_env()?;
    config.guard = authgate_rs::GuardConfig::new(3, Duration::from_secs(2))?;

    let gateway = LoginGateway::new(
        FlakyAuthService::default(),
        InMemorySession::new(),
        NoopNavigator,
        &config,
    );

    let credentials = Credentials::new("alice", "secret");

    for attempt in 1..=10 {
        match gateway.login(&credentials, Some("todos")).await {
            Ok(response) => println!("#{attempt}: logged in, token {}", response.access_token),
            Err(GatewayError::Unavailable(outcome)) => {
                let response = outcome.to_response();
                println!("#{attempt}: {} {}", response.status, response.body.message);
            }
            Err(GatewayError::Backend(err)) => println!("#{attempt}: backend error: {err}"),
        }

        println!("    guard: {:?}", gateway.guard_status());
        gateway.logout();
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    Ok(())
}
