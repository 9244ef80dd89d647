//! Content-addressed result cache with lazy, age-based expiry.
//!
//! Entries are keyed by a SHA-256 digest of the canonical form of a
//! [`QueryDescriptor`] and carry the time they were written. An entry is
//! fresh while `now - stored_at < max_age`; stale entries are simply
//! ignored and later overwritten, never actively deleted.
//!
//! Two backends are provided: [`FileCacheBackend`] (one JSON file per key)
//! and [`MemoryCacheBackend`] (an in-process [`moka`] cache). Cache
//! failures never fail a query. [`CacheStore::lookup`] degrades every
//! read problem to a miss; [`CacheStore::store`] returns the error so the
//! client can log and discard it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CacheError;
use crate::types::{ParamValue, QueryDescriptor};

/// Default number of entries kept by [`MemoryCacheBackend`].
pub const DEFAULT_MEMORY_CAPACITY: u64 = 1_000;

/// Deterministic digest identifying a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build the key for a descriptor.
    ///
    /// The operation name and the parameters (already sorted by name) are
    /// serialised as canonical JSON and hashed, so parameter insertion order
    /// never affects the key. Non-finite floats have no JSON number form and
    /// are written as `{"float": "NaN"}` and the like. The descriptor's
    /// freshness requirement is not part of the key.
    pub fn from_descriptor(descriptor: &QueryDescriptor) -> Self {
        let params: serde_json::Map<String, serde_json::Value> = descriptor
            .params
            .iter()
            .map(|(name, value)| (name.clone(), canonical_param(value)))
            .collect();
        let canonical = serde_json::json!({
            "op": descriptor.operation,
            "params": params,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn canonical_param(value: &ParamValue) -> serde_json::Value {
    match value {
        ParamValue::Null => serde_json::Value::Null,
        ParamValue::Bool(b) => serde_json::Value::Bool(*b),
        ParamValue::Int(i) => serde_json::Value::from(*i),
        ParamValue::Float(f) if f.is_finite() => serde_json::Value::from(*f),
        ParamValue::Float(f) => serde_json::json!({ "float": f.to_string() }),
        ParamValue::Str(s) => serde_json::Value::String(s.clone()),
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored payload and the time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Key the entry is stored under.
    pub key: CacheKey,
    /// Arbitrary JSON payload.
    pub payload: serde_json::Value,
    /// Write time.
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry stamped with the current time.
    pub fn new(key: CacheKey, payload: serde_json::Value) -> Self {
        Self {
            key,
            payload,
            stored_at: Utc::now(),
        }
    }

    /// Whether this entry satisfies `max_age` at time `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        is_fresh(self.stored_at, now, max_age)
    }
}

/// Freshness rule shared by all backends.
///
/// Fresh only when `now - stored_at < max_age`; an age equal to `max_age`
/// is stale. Entries stamped in the future (clock skew) count as age zero.
pub fn is_fresh(stored_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    let age = (now - stored_at).to_std().unwrap_or(Duration::ZERO);
    age < max_age
}

/// Raw storage behind a [`CacheStore`].
///
/// Implementations report problems as [`CacheError`]; the store decides
/// how to degrade them.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read the entry for `key`, if any.
    async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    /// Write `entry`, replacing any previous entry for the same key.
    async fn write(&self, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// Flat-file backend: `<dir>/<key>.json` per entry.
///
/// Writes go to a uniquely named temporary file that is renamed over the
/// target, so concurrent writers of one key are last-writer-wins and a
/// reader never observes a partially written entry.
#[derive(Debug, Clone)]
pub struct FileCacheBackend {
    dir: PathBuf,
}

impl FileCacheBackend {
    /// Use `dir` as the cache directory. It is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CacheBackend for FileCacheBackend {
    async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        if entry.key != *key {
            return Err(CacheError::Corrupt(format!(
                "entry at {} belongs to key {}",
                path.display(),
                entry.key
            )));
        }
        Ok(Some(entry))
    }

    async fn write(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes =
            serde_json::to_vec(entry).map_err(|e| CacheError::Serialize(e.to_string()))?;
        let target = self.entry_path(&entry.key);
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            entry.key,
            rand::random::<u64>()
        ));
        let written = match tokio::fs::write(&tmp, &bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &target).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }
}

/// In-process backend on top of [`moka`].
///
/// Capacity-bounded; expiry is still decided by `stored_at`, not by moka.
#[derive(Clone)]
pub struct MemoryCacheBackend {
    entries: Cache<CacheKey, CacheEntry>,
}

impl MemoryCacheBackend {
    /// Create a backend holding at most `capacity` entries.
    pub fn new(capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
        }
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl fmt::Debug for MemoryCacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCacheBackend")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn read(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key).await)
    }

    async fn write(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry.clone()).await;
        Ok(())
    }
}

/// The cache as seen by the query client.
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
}

impl CacheStore {
    /// Wrap a backend.
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Store backed by files in `dir`.
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self::new(FileCacheBackend::new(dir))
    }

    /// Store backed by an in-memory cache of the given capacity.
    pub fn memory(capacity: u64) -> Self {
        Self::new(MemoryCacheBackend::new(capacity))
    }

    /// Return the payload for `key` if an entry younger than `max_age` exists.
    ///
    /// A missing, stale, unreadable or corrupt entry is a miss.
    pub async fn lookup(&self, key: &CacheKey, max_age: Duration) -> Option<serde_json::Value> {
        self.lookup_at(key, max_age, Utc::now()).await
    }

    /// [`lookup`](Self::lookup) against an explicit clock reading.
    pub async fn lookup_at(
        &self,
        key: &CacheKey,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Option<serde_json::Value> {
        match self.backend.read(key).await {
            Ok(Some(entry)) if entry.is_fresh_at(now, max_age) => {
                tracing::debug!(%key, "cache hit");
                Some(entry.payload)
            }
            Ok(Some(_)) => {
                tracing::debug!(%key, "cache entry expired");
                None
            }
            Ok(None) => {
                tracing::debug!(%key, "cache miss");
                None
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Persist `payload` under `key`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`CacheError`]; callers are expected to log and
    /// discard it.
    pub async fn store(&self, key: &CacheKey, payload: serde_json::Value) -> Result<(), CacheError> {
        self.store_entry(&CacheEntry::new(key.clone(), payload)).await
    }

    /// Persist a fully formed entry, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`CacheError`].
    pub async fn store_entry(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.backend.write(entry).await?;
        tracing::debug!(key = %entry.key, "cache entry stored");
        Ok(())
    }
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}
