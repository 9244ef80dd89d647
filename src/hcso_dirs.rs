//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/hcso/` | `~/.config/hcso/` |
//! | Cache | `~/Library/Caches/hcso/` | `~/.cache/hcso/` |
//! | Data (logs) | `~/Library/Application Support/hcso/` | `~/.local/share/hcso/` |
//!
//! # Environment Overrides
//!
//! - `HCSO_CONFIG_DIR` overrides [`config_dir`]
//! - `HCSO_CACHE_DIR` overrides [`cache_dir`]
//! - `HCSO_DATA_DIR` overrides [`data_dir`]

use std::ffi::OsString;
use std::path::PathBuf;

const APP_DIR: &str = "hcso";

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/hcso/` by default. Override with the
/// `HCSO_CONFIG_DIR` environment variable.
#[must_use]
pub fn config_dir() -> PathBuf {
    resolve(
        std::env::var_os("HCSO_CONFIG_DIR"),
        dirs::config_dir(),
        "/tmp/hcso-config",
    )
}

/// Application cache directory.
///
/// Resolves to `dirs::cache_dir()/hcso/` by default. Override with the
/// `HCSO_CACHE_DIR` environment variable.
#[must_use]
pub fn cache_dir() -> PathBuf {
    resolve(
        std::env::var_os("HCSO_CACHE_DIR"),
        dirs::cache_dir(),
        "/tmp/hcso-cache",
    )
}

/// Application data directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    resolve(
        std::env::var_os("HCSO_DATA_DIR"),
        dirs::data_dir(),
        "/tmp/hcso-data",
    )
}

/// Query result cache (`cache_dir()/queries/`).
#[must_use]
pub fn query_cache_dir() -> PathBuf {
    cache_dir().join("queries")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Default config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

fn resolve(override_dir: Option<OsString>, platform_dir: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    platform_dir
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins() {
        let path = resolve(
            Some(OsString::from("/srv/hcso")),
            Some(PathBuf::from("/home/u/.config")),
            "/tmp/x",
        );
        assert_eq!(path, PathBuf::from("/srv/hcso"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let path = resolve(
            Some(OsString::new()),
            Some(PathBuf::from("/home/u/.cache")),
            "/tmp/x",
        );
        assert_eq!(path, PathBuf::from("/home/u/.cache/hcso"));
    }

    #[test]
    fn fallback_without_platform_dir() {
        assert_eq!(resolve(None, None, "/tmp/x"), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn derived_paths() {
        assert!(query_cache_dir().ends_with("queries"));
        assert!(logs_dir().ends_with("logs"));
        assert!(config_file().ends_with("config.toml"));
    }
}
