//! Error types for the hcso-query crate.
//!
//! Provider failures are structured ([`ProviderError`] carries a kind and an
//! optional status code) so that retry classification never has to sniff
//! message strings. No credentials or query text appear in error messages.

use std::fmt;

/// What went wrong talking to a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// The provider is throttling us (HTTP 429, quota exceeded).
    Throttled,
    /// The provider is temporarily unavailable (HTTP 503, maintenance).
    Unavailable,
    /// The request or the tool invocation timed out.
    Timeout,
    /// Connection-level failure before any response arrived.
    Transport,
    /// Any other 5xx-class server failure.
    Server,
    /// Credentials rejected or missing permissions (HTTP 401/403).
    Auth,
    /// The request itself is malformed (other 4xx responses).
    InvalidRequest,
    /// The looked-up resource does not exist (HTTP 404).
    NotFound,
    /// The external command-line tool is not installed.
    ToolMissing,
    /// The external tool ran but exited unsuccessfully.
    ToolFailed,
    /// The response arrived but could not be decoded.
    Decode,
    /// Unrecognised failure shape.
    Other,
}

impl ProviderErrorKind {
    /// Stable lower-case label used in logs and messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Throttled => "throttled",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Server => "server",
            Self::Auth => "auth",
            Self::InvalidRequest => "invalid request",
            Self::NotFound => "not found",
            Self::ToolMissing => "tool missing",
            Self::ToolFailed => "tool failed",
            Self::Decode => "decode",
            Self::Other => "other",
        }
    }

    /// Map an HTTP status code to a failure kind.
    ///
    /// Only meaningful for non-success statuses; a 2xx maps to
    /// [`ProviderErrorKind::Other`].
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::Throttled,
            401 | 403 => Self::Auth,
            404 | 410 => Self::NotFound,
            408 => Self::Timeout,
            503 => Self::Unavailable,
            500..=599 => Self::Server,
            400..=499 => Self::InvalidRequest,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A failed attempt to fetch from an external provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider error ({kind}{}): {message}", status_suffix(.status))]
pub struct ProviderError {
    /// Structured failure kind used for retry classification.
    pub kind: ProviderErrorKind,
    /// HTTP status or process exit code, when one exists.
    pub status: Option<u16>,
    /// Human-readable detail.
    pub message: String,
}

impl ProviderError {
    /// Create an error of the given kind.
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Create an error from a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::from_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Shorthand for [`ProviderErrorKind::Throttled`].
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Throttled, message)
    }

    /// Shorthand for [`ProviderErrorKind::Auth`].
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    /// Shorthand for [`ProviderErrorKind::Timeout`].
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, message)
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(", status {s}")).unwrap_or_default()
}

/// Errors raised by cache backends.
///
/// These never reach query callers: reads degrade to a miss and writes are
/// discarded by the client after logging.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache directory or file could not be read or written.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An existing entry could not be decoded.
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),

    /// A payload could not be serialised for storage.
    #[error("cache serialisation error: {0}")]
    Serialize(String),
}

/// Errors surfaced to callers of the query client.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts performed.
        attempts: u32,
        /// The failure of the final attempt.
        last: ProviderError,
    },

    /// The provider reported a failure that retrying cannot fix.
    #[error("fatal provider failure: {0}")]
    Fatal(ProviderError),

    /// The caller abandoned the query.
    #[error("query cancelled after {attempts} attempts")]
    Cancelled {
        /// Number of attempts started before cancellation was observed.
        attempts: u32,
    },
}

/// Convenience type alias for hcso-query results.
pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_provider_error_with_status() {
        let err = ProviderError::from_status(429, "slow down");
        assert_eq!(
            err.to_string(),
            "provider error (throttled, status 429): slow down"
        );
    }

    #[test]
    fn display_provider_error_without_status() {
        let err = ProviderError::timeout("exceeded 15s");
        assert_eq!(err.to_string(), "provider error (timeout): exceeded 15s");
    }

    #[test]
    fn status_mapping_covers_common_codes() {
        assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::Throttled);
        assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_status(403), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_status(404), ProviderErrorKind::NotFound);
        assert_eq!(ProviderErrorKind::from_status(408), ProviderErrorKind::Timeout);
        assert_eq!(ProviderErrorKind::from_status(400), ProviderErrorKind::InvalidRequest);
        assert_eq!(ProviderErrorKind::from_status(503), ProviderErrorKind::Unavailable);
        assert_eq!(ProviderErrorKind::from_status(502), ProviderErrorKind::Server);
        assert_eq!(ProviderErrorKind::from_status(200), ProviderErrorKind::Other);
    }

    #[test]
    fn display_exhausted() {
        let err = QueryError::Exhausted {
            attempts: 5,
            last: ProviderError::throttled("quota"),
        };
        assert_eq!(
            err.to_string(),
            "gave up after 5 attempts: provider error (throttled): quota"
        );
    }

    #[test]
    fn display_cancelled() {
        let err = QueryError::Cancelled { attempts: 2 };
        assert_eq!(err.to_string(), "query cancelled after 2 attempts");
    }

    #[test]
    fn display_config() {
        let err = QueryError::Config("max_attempts must be greater than 0".into());
        assert_eq!(
            err.to_string(),
            "config error: max_attempts must be greater than 0"
        );
    }

    #[test]
    fn display_cache_corrupt() {
        let err = CacheError::Corrupt("expected value at line 1".into());
        assert_eq!(
            err.to_string(),
            "corrupt cache entry: expected value at line 1"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProviderError>();
        assert_send_sync::<CacheError>();
        assert_send_sync::<QueryError>();
    }
}
