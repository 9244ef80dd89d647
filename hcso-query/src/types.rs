//! Core types: query descriptors, attempt results and caller-facing outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, QueryError};

/// A primitive query parameter value.
///
/// Only primitives are representable so that every descriptor has a
/// canonical serialised form for cache keying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// JSON `null`.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    Str(String),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// The logical unit of work handed to the query client.
///
/// Two descriptors with the same operation and the same parameter values
/// are identical for caching purposes, whatever order the parameters were
/// added in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    /// Operation name, e.g. `"lookup"` or `"search_text"`.
    pub operation: String,
    /// Primitive parameters, kept sorted by name.
    pub params: BTreeMap<String, ParamValue>,
    /// Maximum acceptable age of a cached result. `None` defers to the
    /// client's configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,
}

impl QueryDescriptor {
    /// Start a descriptor for the given operation with no parameters.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            params: BTreeMap::new(),
            max_age: None,
        }
    }

    /// Add or replace a parameter.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Set the freshness requirement for this query.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }
}

/// Final result of running a fetch through the retry engine.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientResult<T> {
    /// The fetch succeeded. `attempts` is 0 when served from cache.
    Success {
        /// The fetched (or cached) payload.
        payload: T,
        /// Attempts used to obtain it.
        attempts: u32,
    },
    /// Every attempt failed with a retryable error.
    Exhausted {
        /// Failure of the final attempt.
        last_reason: ProviderError,
        /// Attempts used (always the configured maximum).
        attempts: u32,
    },
    /// A failure that retrying cannot fix.
    Fatal {
        /// The classified-fatal failure.
        reason: ProviderError,
        /// Attempts used, including the fatal one.
        attempts: u32,
    },
    /// The caller abandoned the query between attempts.
    Cancelled {
        /// Attempts started before cancellation was observed.
        attempts: u32,
    },
}

impl<T> ClientResult<T> {
    /// Whether this is a [`ClientResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Number of fetch attempts performed.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Fatal { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Borrow the payload of a successful result.
    pub fn payload(&self) -> Option<&T> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Convert into a plain `Result` for `?`-style callers.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Exhausted`], [`QueryError::Fatal`] or
    /// [`QueryError::Cancelled`] for the matching non-success variants.
    pub fn into_result(self) -> Result<T, QueryError> {
        match self {
            Self::Success { payload, .. } => Ok(payload),
            Self::Exhausted {
                last_reason,
                attempts,
            } => Err(QueryError::Exhausted {
                attempts,
                last: last_reason,
            }),
            Self::Fatal { reason, .. } => Err(QueryError::Fatal(reason)),
            Self::Cancelled { attempts } => Err(QueryError::Cancelled { attempts }),
        }
    }

    /// Transform the payload of a successful result.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ClientResult<U> {
        match self {
            Self::Success { payload, attempts } => ClientResult::Success {
                payload: f(payload),
                attempts,
            },
            Self::Exhausted {
                last_reason,
                attempts,
            } => ClientResult::Exhausted {
                last_reason,
                attempts,
            },
            Self::Fatal { reason, attempts } => ClientResult::Fatal { reason, attempts },
            Self::Cancelled { attempts } => ClientResult::Cancelled { attempts },
        }
    }
}

/// How the cache participated in a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    /// Served from a fresh cache entry; fetch was not invoked.
    Hit,
    /// No fresh entry; fetch was invoked.
    Miss,
    /// Caching is disabled for this client.
    Bypassed,
}

/// What the query client returns: the result plus cache metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome<T> {
    /// Terminal result of the query.
    pub result: ClientResult<T>,
    /// Whether the cache answered.
    pub cache: CacheStatus,
}

impl<T> QueryOutcome<T> {
    /// Whether the payload came from the cache.
    pub fn from_cache(&self) -> bool {
        self.cache == CacheStatus::Hit
    }
}

impl<T: ResultCount> QueryOutcome<T> {
    /// Summarise the outcome for presentation.
    ///
    /// A query that completed with nothing to report and a query that could
    /// not complete never map to the same status.
    pub fn status(&self) -> QueryStatus {
        match &self.result {
            ClientResult::Success { payload, .. } => match payload.result_count() {
                0 => QueryStatus::NoResults,
                count => QueryStatus::Found { count },
            },
            ClientResult::Exhausted {
                last_reason,
                attempts,
            } => QueryStatus::Exhausted {
                attempts: *attempts,
                reason: last_reason.to_string(),
            },
            ClientResult::Fatal { reason, .. } => QueryStatus::Failed {
                reason: reason.to_string(),
            },
            ClientResult::Cancelled { .. } => QueryStatus::Cancelled,
        }
    }
}

/// Caller-facing summary of a query outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryStatus {
    /// The query completed and returned results.
    Found {
        /// Number of results.
        count: usize,
    },
    /// The query completed and legitimately returned nothing.
    NoResults,
    /// The provider kept failing transiently until attempts ran out.
    Exhausted {
        /// Attempts performed.
        attempts: u32,
        /// Final failure message.
        reason: String,
    },
    /// The provider failed in a way retrying cannot fix.
    Failed {
        /// Failure message.
        reason: String,
    },
    /// The caller abandoned the query.
    Cancelled,
}

impl QueryStatus {
    /// Whether the query ran to completion (with or without results).
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Found { .. } | Self::NoResults)
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found { count } => write!(f, "found {count} result(s)"),
            Self::NoResults => f.write_str("query completed with no results"),
            Self::Exhausted { attempts, reason } => {
                write!(f, "query could not be completed after {attempts} attempts: {reason}")
            }
            Self::Failed { reason } => write!(f, "query could not be completed: {reason}"),
            Self::Cancelled => f.write_str("query was cancelled"),
        }
    }
}

/// Counts the results inside a payload, for [`QueryOutcome::status`].
pub trait ResultCount {
    /// Number of results this payload represents.
    fn result_count(&self) -> usize;
}

impl<T> ResultCount for Vec<T> {
    fn result_count(&self) -> usize {
        self.len()
    }
}

impl<T: ResultCount> ResultCount for Option<T> {
    fn result_count(&self) -> usize {
        self.as_ref().map_or(0, ResultCount::result_count)
    }
}

impl ResultCount for serde_json::Value {
    /// Arrays count their elements, `null` counts as nothing, objects with a
    /// `results` array count that array, any other value is one result.
    fn result_count(&self) -> usize {
        match self {
            serde_json::Value::Null => 0,
            serde_json::Value::Array(items) => items.len(),
            serde_json::Value::Object(map) => match map.get("results") {
                Some(serde_json::Value::Array(items)) => items.len(),
                _ if map.is_empty() => 0,
                _ => 1,
            },
            _ => 1,
        }
    }
}

/// A single search-style result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Result URL.
    #[serde(alias = "href", alias = "link")]
    pub url: String,
    /// Text snippet or body summarising the result.
    #[serde(alias = "body", alias = "description", default)]
    pub snippet: String,
}
