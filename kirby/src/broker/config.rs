//! Broker connection settings read from `KAFKA_*` environment variables.

use super::retry::RetryConfig;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Comma-separated `host:port` list. Unset or empty disables provisioning.
pub const KAFKA_BOOTSTRAP_SERVERS: &str = "KAFKA_BOOTSTRAP_SERVERS";
/// Enables TLS; the three certificate paths below become required.
pub const KAFKA_USE_TLS: &str = "KAFKA_USE_TLS";
/// CA bundle path.
pub const KAFKA_SSL_CAFILE: &str = "KAFKA_SSL_CAFILE";
/// Client certificate path.
pub const KAFKA_SSL_CERTFILE: &str = "KAFKA_SSL_CERTFILE";
/// Client key path.
pub const KAFKA_SSL_KEYFILE: &str = "KAFKA_SSL_KEYFILE";
/// Create-call timeout in milliseconds.
pub const KAFKA_TIMEOUT_MS: &str = "KAFKA_TIMEOUT_MS";
/// Partitions of provisioned topics.
pub const KAFKA_PARTITIONS: &str = "KAFKA_PARTITIONS";
/// Replication factor of provisioned topics.
pub const KAFKA_REPLICATION_FACTOR: &str = "KAFKA_REPLICATION_FACTOR";

const fn default_timeout_ms() -> u64 {
    1500
}

const fn default_partitions() -> u32 {
    1
}

const fn default_replication_factor() -> u16 {
    1
}

/// Certificate files for a TLS connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsFiles {
    /// CA bundle.
    pub ca_file: PathBuf,
    /// Client certificate.
    pub cert_file: PathBuf,
    /// Client key.
    pub key_file: PathBuf,
}

/// Settings of an enabled provisioner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Bootstrap `host:port` endpoints.
    pub bootstrap_endpoints: Vec<String>,
    /// TLS files, when TLS is enabled.
    #[serde(default)]
    pub tls: Option<TlsFiles>,
    /// Create-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Partitions of provisioned topics.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    /// Replication factor of provisioned topics.
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u16,
    /// Retry policy for every admin call.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl BrokerSettings {
    /// Creates plaintext settings with defaults.
    #[must_use]
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bootstrap_endpoints: endpoints.into_iter().map(Into::into).collect(),
            tls: None,
            timeout_ms: default_timeout_ms(),
            partitions: default_partitions(),
            replication_factor: default_replication_factor(),
            retry: RetryConfig::default(),
        }
    }

    /// Enables TLS.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsFiles) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets the create-call timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the topic layout.
    #[must_use]
    pub fn with_layout(mut self, partitions: u32, replication_factor: u16) -> Self {
        self.partitions = partitions;
        self.replication_factor = replication_factor;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The create-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Endpoints joined with commas, for log fields and errors.
    #[must_use]
    pub fn endpoints(&self) -> String {
        self.bootstrap_endpoints.join(",")
    }

    /// Checks the settings are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap_endpoints.is_empty() {
            return Err(ConfigError::Invalid("no bootstrap endpoint".to_string()));
        }
        if let Some(bad) = self.bootstrap_endpoints.iter().find(|e| !is_endpoint(e)) {
            return Err(ConfigError::Invalid(format!("endpoint '{bad}' is not host:port")));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".to_string()));
        }
        if self.partitions == 0 || self.replication_factor == 0 {
            return Err(ConfigError::Invalid(
                "partitions and replication_factor must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be positive".to_string()));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms exceeds retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_endpoint(endpoint: &str) -> bool {
    match endpoint.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Whether topics are provisioned, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BrokerConfig {
    /// Provision against these brokers.
    Configured(BrokerSettings),
    /// No broker: every provisioning call is a logged no-op.
    Disabled,
}

impl BrokerConfig {
    /// Reads the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unparsable values or missing TLS files.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads variables through `lookup`, so tests never touch the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unparsable values or missing TLS files.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoints: Vec<String> = lookup(KAFKA_BOOTSTRAP_SERVERS)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        if endpoints.is_empty() {
            return Ok(Self::Disabled);
        }

        let mut settings = BrokerSettings::new(endpoints);

        let use_tls = match lookup(KAFKA_USE_TLS) {
            Some(raw) => parse_bool(KAFKA_USE_TLS, &raw)?,
            None => false,
        };
        if use_tls {
            let file = |var: &'static str| {
                lookup(var)
                    .filter(|v| !v.trim().is_empty())
                    .map(PathBuf::from)
                    .ok_or(ConfigError::MissingTlsFile { var })
            };
            settings.tls = Some(TlsFiles {
                ca_file: file(KAFKA_SSL_CAFILE)?,
                cert_file: file(KAFKA_SSL_CERTFILE)?,
                key_file: file(KAFKA_SSL_KEYFILE)?,
            });
        }

        if let Some(timeout_ms) = parse_optional(&lookup, KAFKA_TIMEOUT_MS)? {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(partitions) = parse_optional(&lookup, KAFKA_PARTITIONS)? {
            settings.partitions = partitions;
        }
        if let Some(replication_factor) = parse_optional(&lookup, KAFKA_REPLICATION_FACTOR)? {
            settings.replication_factor = replication_factor;
        }

        settings.validate()?;
        Ok(Self::Configured(settings))
    }

    /// Returns the settings, or `None` when disabled.
    #[must_use]
    pub const fn settings(&self) -> Option<&BrokerSettings> {
        match self {
            Self::Configured(settings) => Some(settings),
            Self::Disabled => None,
        }
    }

    /// Returns true if provisioning is disabled.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Validates configured settings; a disabled config is always valid.
    ///
    /// # Errors
    ///
    /// See [`BrokerSettings::validate`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings().map_or(Ok(()), BrokerSettings::validate)
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::InvalidValue {
            var,
            value: raw.to_string(),
        }),
    }
}

fn parse_optional<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}
