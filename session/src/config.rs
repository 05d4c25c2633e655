use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::error::RegistryError;
use crate::retry::RetryPolicy;

/// Construction-time settings for a `SessionRegistry`.
///
/// There is no default namespace: every registry names its own prefix, and
/// registries sharing one store must use distinct prefixes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Namespace prepended to every token to form the physical key.
    pub prefix: String,

    /// Lease granted on registration and on refresh.
    /// `None` means sessions only expire if the caller sets `expires_at_ms`.
    pub session_ttl: Option<Duration>,

    /// Deadline for a single store round trip.
    pub op_timeout: Duration,

    /// Round trips slower than this are logged under the `performance` target.
    pub slow_op_threshold: Duration,

    /// Maximum number of in-flight per-key round trips during sweeps and listings.
    pub sweep_concurrency: usize,

    /// Backoff applied to transport failures.
    pub retry: RetryPolicy,
}

impl RegistryConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            session_ttl: None,
            op_timeout: Duration::from_secs(2),
            slow_op_threshold: Duration::from_millis(100),
            sweep_concurrency: 32,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    pub fn with_sweep_concurrency(mut self, n: usize) -> Self {
        self.sweep_concurrency = n;
        self
    }

    /// Build from `SESSION_REGISTRY_*` / `SESSION_*` variables resolved by
    /// `lookup` (usually `std::env::var`).
    ///
    /// `SESSION_REGISTRY_PREFIX` is required. Optional:
    /// `SESSION_TTL_SECS`, `SESSION_STORE_TIMEOUT_MS`, `SESSION_SWEEP_CONCURRENCY`,
    /// `SESSION_RETRY_ATTEMPTS`, `SESSION_RETRY_BASE_MS`.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = lookup("SESSION_REGISTRY_PREFIX")
            .context("SESSION_REGISTRY_PREFIX must be set")?;
        let mut config = Self::new(prefix);

        if let Some(secs) = parse_var::<u64, _>(&lookup, "SESSION_TTL_SECS")? {
            config.session_ttl = Some(Duration::from_secs(secs));
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "SESSION_STORE_TIMEOUT_MS")? {
            config.op_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "SESSION_SWEEP_CONCURRENCY")? {
            config.sweep_concurrency = n;
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, "SESSION_RETRY_ATTEMPTS")? {
            config.retry.max_attempts = n;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "SESSION_RETRY_BASE_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.prefix.is_empty() {
            return Err(RegistryError::InvalidConfig(
                "prefix must not be empty".into(),
            ));
        }
        if self.sweep_concurrency == 0 {
            return Err(RegistryError::InvalidConfig(
                "sweep_concurrency must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RegistryError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.op_timeout.is_zero() {
            return Err(RegistryError::InvalidConfig(
                "op_timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {name}: {raw:?}"))
        })
        .transpose()
}
