//! Configuration for guards and the login gateway.

use std::env::VarError;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::guard::Guard;
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::TrialFailurePolicy;

/// Default number of consecutive failures that opens a guard.
pub const DEFAULT_MAX_FAILURES: u32 = 3;

/// Default time an open guard refuses calls before admitting a trial.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default base address of the authentication service.
pub const DEFAULT_AUTH_API_ADDRESS: &str = "http://auth-api";

/// Default display name of the guarded authentication dependency.
pub const DEFAULT_DEPENDENCY_NAME: &str = "Authentication service";

/// Errors raised while building configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_failures` must be at least one.
    #[error("max_failures must be at least 1")]
    ZeroMaxFailures,

    /// A configuration value could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Name of the offending setting.
        key: &'static str,
        /// The raw value that was rejected.
        value: String,
    },
}

/// Immutable guard settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    max_failures: u32,
    reset_timeout: Duration,
    trial_policy: TrialFailurePolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            trial_policy: TrialFailurePolicy::default(),
        }
    }
}

impl GuardConfig {
    /// Creates a configuration, rejecting a zero failure threshold.
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Result<Self, ConfigError> {
        if max_failures == 0 {
            return Err(ConfigError::ZeroMaxFailures);
        }

        Ok(Self {
            max_failures,
            reset_timeout,
            trial_policy: TrialFailurePolicy::default(),
        })
    }

    /// Returns a copy using `policy` for failed trials.
    pub fn with_trial_policy(mut self, policy: TrialFailurePolicy) -> Self {
        self.trial_policy = policy;
        self
    }

    /// Consecutive failures that open the guard.
    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    /// How long an open guard refuses calls.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// What a failed trial does.
    pub fn trial_policy(&self) -> TrialFailurePolicy {
        self.trial_policy
    }
}

/// Builder for creating guards with custom configurations.
pub struct GuardBuilder<E, C = SystemClock>
where
    E: std::error::Error + 'static,
    C: Clock,
{
    name: String,
    max_failures: u32,
    reset_timeout: Duration,
    trial_policy: TrialFailurePolicy,
    clock: C,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: Arc<HookRegistry>,
    _error_type: PhantomData<E>,
}

impl<E> Default for GuardBuilder<E, SystemClock>
where
    E: std::error::Error + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> GuardBuilder<E, SystemClock>
where
    E: std::error::Error + 'static,
{
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            name: "guard".to_string(),
            max_failures: DEFAULT_MAX_FAILURES,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            trial_policy: TrialFailurePolicy::default(),
            clock: SystemClock,
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: Arc::new(HookRegistry::new()),
            _error_type: PhantomData,
        }
    }
}

impl<E, C> GuardBuilder<E, C>
where
    E: std::error::Error + 'static,
    C: Clock,
{
    /// Sets the name used in log events and metric labels.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the number of consecutive failures that opens the guard.
    pub fn max_failures(mut self, count: u32) -> Self {
        self.max_failures = count;
        self
    }

    /// Sets how long the guard stays open before admitting a trial.
    pub fn reset_timeout(mut self, duration: Duration) -> Self {
        self.reset_timeout = duration;
        self
    }

    /// Sets what a failed trial does.
    pub fn trial_policy(mut self, policy: TrialFailurePolicy) -> Self {
        self.trial_policy = policy;
        self
    }

    /// Sets a metric sink for the guard.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry for the guard.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hook_registry = Arc::new(hooks);
        self
    }

    /// Swaps the time source.
    pub fn clock<NewC: Clock>(self, clock: NewC) -> GuardBuilder<E, NewC> {
        GuardBuilder {
            name: self.name,
            max_failures: self.max_failures,
            reset_timeout: self.reset_timeout,
            trial_policy: self.trial_policy,
            clock,
            metric_sink: self.metric_sink,
            hook_registry: self.hook_registry,
            _error_type: PhantomData,
        }
    }

    /// Builds the guard, validating the settings.
    pub fn build(self) -> Result<Guard<E, C>, ConfigError> {
        let config = GuardConfig::new(self.max_failures, self.reset_timeout)?
            .with_trial_policy(self.trial_policy);

        Ok(Guard::new(
            self.name,
            config,
            self.clock,
            self.metric_sink,
            self.hook_registry,
        ))
    }
}

/// Settings for the login gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Base address of the authentication service.
    pub auth_api_address: String,

    /// Name shown to users when the dependency is unavailable.
    pub dependency_name: String,

    /// Settings for the guard around the authentication call.
    pub guard: GuardConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            auth_api_address: DEFAULT_AUTH_API_ADDRESS.to_string(),
            dependency_name: DEFAULT_DEPENDENCY_NAME.to_string(),
            guard: GuardConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Environment variable holding the auth service address.
    pub const AUTH_API_ADDRESS: &'static str = "AUTH_API_ADDRESS";

    /// Environment variable holding the failure threshold.
    pub const MAX_FAILURES: &'static str = "AUTH_GUARD_MAX_FAILURES";

    /// Environment variable holding the reset timeout in milliseconds.
    pub const RESET_TIMEOUT_MS: &'static str = "AUTH_GUARD_RESET_TIMEOUT_MS";

    /// Reads the configuration from the process environment.
    ///
    /// A variable that is set but not valid unicode is rejected rather than
    /// treated as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(env_value)
    }

    /// Reads the configuration through `lookup`, falling back to defaults for
    /// unset or empty keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_source(|key| Ok(lookup(key)))
    }

    fn from_source<F>(source: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Result<Option<String>, ConfigError>,
    {
        let get = |key: &'static str| {
            source(key).map(|value| value.filter(|value| !value.trim().is_empty()))
        };

        let auth_api_address =
            get(Self::AUTH_API_ADDRESS)?.unwrap_or_else(|| DEFAULT_AUTH_API_ADDRESS.to_string());

        let max_failures = match get(Self::MAX_FAILURES)? {
            Some(raw) => parse_value(Self::MAX_FAILURES, &raw)?,
            None => DEFAULT_MAX_FAILURES,
        };

        let reset_timeout = match get(Self::RESET_TIMEOUT_MS)? {
            Some(raw) => Duration::from_millis(parse_value(Self::RESET_TIMEOUT_MS, &raw)?),
            None => DEFAULT_RESET_TIMEOUT,
        };

        Ok(Self {
            auth_api_address,
            dependency_name: DEFAULT_DEPENDENCY_NAME.to_string(),
            guard: GuardConfig::new(max_failures, reset_timeout)?,
        })
    }

    /// Full URL of the login endpoint.
    pub fn login_url(&self) -> String {
        format!("{}/login", self.auth_api_address.trim_end_matches('/'))
    }
}

fn env_value(key: &'static str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string_lossy().into_owned(),
        }),
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
