//! Retry classification for provider failures.

use crate::error::{ProviderError, ProviderErrorKind};

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    /// Transient: throttling, temporary unavailability, timeouts.
    Retryable,
    /// Retrying cannot help: bad credentials, malformed input, unknown shapes.
    Fatal,
}

/// Default classification policy.
///
/// Throttling, unavailability, timeouts, transport failures and other 5xx
/// responses are retryable. Everything else is fatal, including any failure
/// of kind [`ProviderErrorKind::Other`]: an unrecognised error is never
/// retried.
pub fn default_classifier(error: &ProviderError) -> Retryability {
    match error.kind {
        ProviderErrorKind::Throttled
        | ProviderErrorKind::Unavailable
        | ProviderErrorKind::Timeout
        | ProviderErrorKind::Transport
        | ProviderErrorKind::Server => Retryability::Retryable,
        ProviderErrorKind::Auth
        | ProviderErrorKind::InvalidRequest
        | ProviderErrorKind::NotFound
        | ProviderErrorKind::ToolMissing
        | ProviderErrorKind::ToolFailed
        | ProviderErrorKind::Decode
        | ProviderErrorKind::Other => Retryability::Fatal,
    }
}

/// Classify only throttling as retryable.
///
/// For providers whose outages are long-lived, where hammering them with
/// retries during maintenance only burns quota.
pub fn throttling_only(error: &ProviderError) -> Retryability {
    if error.kind == ProviderErrorKind::Throttled {
        Retryability::Retryable
    } else {
        Retryability::Fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(kind: ProviderErrorKind) -> ProviderError {
        ProviderError::new(kind, "test")
    }

    #[test]
    fn transient_kinds_are_retryable() {
        for k in [
            ProviderErrorKind::Throttled,
            ProviderErrorKind::Unavailable,
            ProviderErrorKind::Timeout,
            ProviderErrorKind::Transport,
            ProviderErrorKind::Server,
        ] {
            assert_eq!(default_classifier(&kind(k)), Retryability::Retryable, "{k}");
        }
    }

    #[test]
    fn permanent_kinds_are_fatal() {
        for k in [
            ProviderErrorKind::Auth,
            ProviderErrorKind::InvalidRequest,
            ProviderErrorKind::NotFound,
            ProviderErrorKind::ToolMissing,
            ProviderErrorKind::ToolFailed,
            ProviderErrorKind::Decode,
        ] {
            assert_eq!(default_classifier(&kind(k)), Retryability::Fatal, "{k}");
        }
    }

    #[test]
    fn unknown_shape_defaults_to_fatal() {
        let err = ProviderError::new(ProviderErrorKind::Other, "rate limit exceeded");
        assert_eq!(default_classifier(&err), Retryability::Fatal);
    }

    #[test]
    fn status_codes_classify_through_kind() {
        assert_eq!(
            default_classifier(&ProviderError::from_status(429, "")),
            Retryability::Retryable
        );
        assert_eq!(
            default_classifier(&ProviderError::from_status(504, "")),
            Retryability::Retryable
        );
        assert_eq!(
            default_classifier(&ProviderError::from_status(401, "")),
            Retryability::Fatal
        );
        assert_eq!(
            default_classifier(&ProviderError::from_status(422, "")),
            Retryability::Fatal
        );
    }

    #[test]
    fn throttling_only_policy() {
        assert_eq!(
            throttling_only(&kind(ProviderErrorKind::Throttled)),
            Retryability::Retryable
        );
        assert_eq!(
            throttling_only(&kind(ProviderErrorKind::Unavailable)),
            Retryability::Fatal
        );
    }
}
