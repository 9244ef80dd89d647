//! Host configuration, loaded from `config.toml`.
//!
//! ```toml
//! strict_providers = false
//!
//! [logging]
//! level = "hcso=info,hcso_query=info"
//!
//! [cache]
//! backend = "file"
//!
//! [defaults]
//! base_interval_ms = 5000
//! max_attempts = 5
//!
//! [providers.shodan]
//! calls_per_second = 1.0
//! max_attempts = 3
//! ```
//!
//! `[defaults]` is a full [`ClientConfig`]; each `[providers.<name>]` table
//! overrides individual fields of it for one provider.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hcso_query::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::error::{HcsoError, Result};
use crate::hcso_dirs;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HcsoConfig {
    /// Reject providers that have no `[providers.<name>]` table.
    pub strict_providers: bool,
    /// Log output.
    pub logging: LoggingConfig,
    /// Result cache.
    pub cache: CacheConfig,
    /// Client settings shared by every provider.
    pub defaults: ClientConfig,
    /// Per-provider overrides, keyed by provider name.
    pub providers: BTreeMap<String, ProviderOverrides>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
    /// Write logs to daily rolling files in this directory instead of stderr.
    pub log_dir: Option<PathBuf>,
    /// File name prefix for rolling log files.
    pub file_prefix: String,
    /// Colourise stderr output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "hcso=info,hcso_query=info".to_owned(),
            log_dir: None,
            file_prefix: "hcso.log".to_owned(),
            ansi: true,
        }
    }
}

/// Which cache backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// One JSON file per entry on disk.
    #[default]
    File,
    /// In-process, lost on exit.
    Memory,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Storage backend.
    pub backend: CacheBackendKind,
    /// Directory for the file backend. Defaults to the query cache dir.
    pub dir: Option<PathBuf>,
    /// Entry limit for the memory backend.
    pub memory_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::File,
            dir: None,
            memory_capacity: hcso_query::cache::DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Directory used by the file backend.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(hcso_dirs::query_cache_dir)
    }
}

/// Optional per-provider overrides of [`ClientConfig`] fields.
///
/// Unset fields inherit from `[defaults]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderOverrides {
    /// Published quota as calls per second; sets `base_interval_ms`.
    pub calls_per_second: Option<f64>,
    /// Minimum spacing between calls, in milliseconds.
    pub base_interval_ms: Option<u64>,
    /// Attempts per query before giving up.
    pub max_attempts: Option<u32>,
    /// First retry delay, in milliseconds.
    pub base_delay_ms: Option<u64>,
    /// Ceiling on the retry delay, in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// How long a cached result stays fresh, in seconds.
    pub cache_max_age_secs: Option<u64>,
    /// Consecutive failures before call spacing stretches.
    pub failure_threshold: Option<u32>,
    /// Spacing growth factor per failure past the threshold.
    pub backoff_multiplier: Option<f64>,
    /// Cap on how many times the multiplier applies.
    pub max_backoff_steps: Option<u32>,
    /// Random extra spacing range `[min, max]`, in milliseconds.
    pub jitter_ms: Option<(u64, u64)>,
    /// Whether this provider reads and writes the cache.
    pub use_cache: Option<bool>,
    /// Per-request HTTP timeout, in seconds.
    pub timeout_seconds: Option<u64>,
    /// Fixed User-Agent instead of a rotated browser one.
    pub user_agent: Option<String>,
}

impl ProviderOverrides {
    /// Layer these overrides on top of `base`.
    ///
    /// An explicit `base_interval_ms` wins over `calls_per_second`.
    pub fn apply(&self, base: &ClientConfig) -> ClientConfig {
        let mut config = base.clone();
        if let Some(rate) = self.calls_per_second {
            config = config.with_calls_per_second(rate);
        }
        if let Some(v) = self.base_interval_ms {
            config.base_interval_ms = v;
        }
        if let Some(v) = self.max_attempts {
            config.max_attempts = v;
        }
        if let Some(v) = self.base_delay_ms {
            config.base_delay_ms = v;
        }
        if let Some(v) = self.max_delay_ms {
            config.max_delay_ms = v;
        }
        if let Some(v) = self.cache_max_age_secs {
            config.cache_max_age_secs = v;
        }
        if let Some(v) = self.failure_threshold {
            config.failure_threshold = v;
        }
        if let Some(v) = self.backoff_multiplier {
            config.backoff_multiplier = v;
        }
        if let Some(v) = self.max_backoff_steps {
            config.max_backoff_steps = v;
        }
        if let Some(v) = self.jitter_ms {
            config.jitter_ms = v;
        }
        if let Some(v) = self.use_cache {
            config.use_cache = v;
        }
        if let Some(v) = self.timeout_seconds {
            config.timeout_seconds = v;
        }
        if let Some(ref v) = self.user_agent {
            config.user_agent = Some(v.clone());
        }
        config
    }
}

impl HcsoConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| HcsoError::Config(e.to_string()))
    }

    /// Load from `path` if it exists, otherwise return the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HcsoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `config_dir()/config.toml`.
    pub fn default_config_path() -> PathBuf {
        hcso_dirs::config_file()
    }

    /// Validate the defaults and every provider's resolved configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HcsoError::Config`] naming the offending section.
    pub fn validate(&self) -> Result<()> {
        self.defaults
            .validate()
            .map_err(|e| HcsoError::Config(format!("[defaults] {e}")))?;
        for (name, overrides) in &self.providers {
            overrides
                .apply(&self.defaults)
                .validate()
                .map_err(|e| HcsoError::Config(format!("[providers.{name}] {e}")))?;
        }
        if self.cache.backend == CacheBackendKind::Memory && self.cache.memory_capacity == 0 {
            return Err(HcsoError::Config(
                "[cache] memory_capacity must be greater than 0".into(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(HcsoError::Config("[logging] level must not be empty".into()));
        }
        Ok(())
    }

    /// Resolved client configuration for `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`HcsoError::UnknownProvider`] when `strict_providers` is set
    /// and the provider has no table.
    pub fn client_config_for(&self, provider: &str) -> Result<ClientConfig> {
        match self.providers.get(provider) {
            Some(overrides) => Ok(overrides.apply(&self.defaults)),
            None if self.strict_providers => Err(HcsoError::UnknownProvider(provider.to_owned())),
            None => Ok(self.defaults.clone()),
        }
    }

    /// Names of all configured providers, sorted.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}
