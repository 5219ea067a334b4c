//! Engine configuration
//!
//! Provides configuration structures and presets for key strength, revocation
//! lookups and default issuance parameters.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest RSA modulus the engine will ever accept
pub const RSA_FLOOR_BITS: u32 = 2048;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum RSA modulus size accepted by key generation
    pub min_rsa_bits: u32,
    /// Deadline for a single revocation lookup
    #[serde(with = "duration_ms")]
    pub revocation_timeout: Duration,
    /// Extra attempts after a failed revocation lookup
    pub revocation_retries: u32,
    /// Delay before the first retry; doubled for every further retry
    #[serde(with = "duration_ms")]
    pub revocation_backoff: Duration,
    /// How long a downloaded CRL is reused when it has no nextUpdate
    #[serde(with = "duration_ms")]
    pub crl_cache_ttl: Duration,
    /// Leaf validity applied by `RequestBuilder::with_config`
    pub default_validity_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_rsa_bits: RSA_FLOOR_BITS,
            revocation_timeout: Duration::from_secs(5),
            revocation_retries: 2,
            revocation_backoff: Duration::from_millis(200),
            crl_cache_ttl: Duration::from_secs(24 * 3600),
            default_validity_days: 365,
        }
    }
}

impl EngineConfig {
    /// Create production configuration with stronger keys
    #[must_use]
    pub fn production() -> Self {
        Self {
            min_rsa_bits: 3072,
            revocation_timeout: Duration::from_secs(5),
            revocation_retries: 2,
            revocation_backoff: Duration::from_millis(250),
            crl_cache_ttl: Duration::from_secs(12 * 3600),
            default_validity_days: 365,
        }
    }

    /// Create configuration for constrained devices on slow links
    #[must_use]
    pub fn embedded_device() -> Self {
        Self {
            min_rsa_bits: RSA_FLOOR_BITS,
            revocation_timeout: Duration::from_secs(10),
            revocation_retries: 1,
            revocation_backoff: Duration::from_secs(1),
            crl_cache_ttl: Duration::from_secs(48 * 3600),
            default_validity_days: 730,
        }
    }

    /// Parse configuration from a JSON document; missing fields take defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails validation
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!("Loaded engine configuration from {:?}", path.as_ref());
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_rsa_bits < RSA_FLOOR_BITS {
            return Err(ConfigError::Invalid {
                field: "min_rsa_bits",
                reason: format!("must be at least {RSA_FLOOR_BITS}"),
            });
        }
        if self.revocation_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "revocation_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.default_validity_days == 0 {
            return Err(ConfigError::Invalid {
                field: "default_validity_days",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Retry delays for revocation lookups, one entry per retry
    pub(crate) fn backoff_schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.revocation_retries).map(|attempt| {
            self.revocation_backoff
                .saturating_mul(2u32.saturating_pow(attempt))
        })
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        #[allow(clippy::cast_possible_truncation)]
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
