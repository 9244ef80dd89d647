//! hcso: host layer for the hcso query client.
//!
//! Wires the [`hcso_query`] core into an application:
//! - **Configuration**: `config.toml` with shared defaults and per-provider overrides
//! - **Directories**: platform config/cache/data paths with env overrides
//! - **Logging**: `tracing-subscriber` to stderr or rolling files
//! - **Registry**: one rate-limited, cached [`QueryClient`](hcso_query::QueryClient)
//!   per provider
//!
//! ```no_run
//! # async fn example() -> hcso::Result<()> {
//! use hcso::{HcsoConfig, ProviderRegistry};
//! use hcso_query::QueryDescriptor;
//!
//! let config = HcsoConfig::load_or_default(&HcsoConfig::default_config_path())?;
//! let _guard = hcso::logging::init_logging(&config.logging)?;
//! let registry = ProviderRegistry::from_config(&config)?;
//!
//! let client = registry.client("nominatim")?;
//! let descriptor = QueryDescriptor::new("nominatim.geocode").param("q", "10 Downing Street");
//! let outcome = client
//!     .query(&descriptor, || async { Ok(serde_json::json!([])) })
//!     .await;
//! println!("{}", outcome.status());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hcso_dirs;
pub mod logging;
pub mod registry;

pub use config::{CacheBackendKind, CacheConfig, HcsoConfig, LoggingConfig, ProviderOverrides};
pub use error::{HcsoError, Result};
pub use registry::ProviderRegistry;
