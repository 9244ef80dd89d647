//! Error types for the hcso host layer.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum HcsoError {
    /// Configuration could not be loaded, saved or validated.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the query client core.
    #[error("query error: {0}")]
    Query(#[from] hcso_query::QueryError),

    /// A client was requested for a provider that is not configured while
    /// `strict_providers` is set.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The tracing subscriber could not be installed.
    #[error("logging error: {0}")]
    Logging(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, HcsoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_provider() {
        let err = HcsoError::UnknownProvider("shodan".into());
        assert_eq!(err.to_string(), "unknown provider: shodan");
    }

    #[test]
    fn query_errors_convert() {
        let err: HcsoError = hcso_query::QueryError::Config("bad".into()).into();
        assert_eq!(err.to_string(), "query error: config error: bad");
    }

    #[test]
    fn io_errors_convert() {
        let err: HcsoError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, HcsoError::Io(_)));
    }
}
