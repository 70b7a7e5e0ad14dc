//! Object storage boundary.
//!
//! Conversion only needs prefix-level operations on object storage: copy
//! everything under one prefix to another, delete a prefix, and list the
//! objects beneath a prefix. Paths are full URIs (`s3://bucket/key`), and
//! "folder" placeholder keys ending in `/` are never reported as objects.
//!
//! [`RetryingBackend`] wraps any backend so throttled calls (errors for which
//! [`Error::is_retryable`] holds) are retried under a [`RetryPolicy`].

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::retry::{RetryPolicy, retry};

/// Storage backend trait for object storage.
///
/// All storage backends (S3, memory) implement this trait.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Lists object URIs under the given prefix.
    ///
    /// Returns an empty vec if nothing matches. Ordering is backend-defined.
    async fn list_prefix(&self, uri: &str) -> Result<Vec<String>>;

    /// Copies every object under `source_uri` to the same relative key under
    /// `target_uri`, returning the number of objects copied.
    async fn copy_prefix(&self, source_uri: &str, target_uri: &str) -> Result<usize>;

    /// Deletes every object under the given prefix.
    ///
    /// Succeeds even if nothing exists (idempotent).
    async fn delete_prefix(&self, uri: &str) -> Result<()>;

    /// Deletes every object under each of the given prefixes.
    async fn delete_prefixes(&self, uris: &[String]) -> Result<()> {
        for uri in uris {
            self.delete_prefix(uri).await?;
        }
        Ok(())
    }
}

/// Rewrites `key` from under `source_prefix` to under `target_prefix`.
#[must_use]
pub fn relocate(key: &str, source_prefix: &str, target_prefix: &str) -> String {
    let relative = key.strip_prefix(source_prefix).unwrap_or(key);
    format!("{target_prefix}{relative}")
}

/// In-memory storage backend for tests and dry runs.
///
/// Thread-safe via `RwLock`. Not suitable for production.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Internal {
        message: "memory backend lock poisoned".into(),
    }
}

impl MemoryBackend {
    /// Creates a new empty memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn put(&self, uri: impl Into<String>, data: impl Into<Bytes>) -> Result<()> {
        self.objects
            .write()
            .map_err(poison_err)?
            .insert(uri.into(), data.into());
        Ok(())
    }

    /// Reads an object, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn get(&self, uri: &str) -> Result<Option<Bytes>> {
        Ok(self.objects.read().map_err(poison_err)?.get(uri).cloned())
    }

    /// Returns every stored object URI, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.objects.read().map_err(poison_err)?.keys().cloned().collect())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn list_prefix(&self, uri: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().map_err(poison_err)?;
        Ok(objects
            .range(uri.to_string()..)
            .take_while(|(key, _)| key.starts_with(uri))
            .filter(|(key, _)| !key.ends_with('/'))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn copy_prefix(&self, source_uri: &str, target_uri: &str) -> Result<usize> {
        if source_uri == target_uri {
            return Ok(0);
        }
        let mut objects = self.objects.write().map_err(poison_err)?;
        let copies: Vec<(String, Bytes)> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(source_uri) && !key.ends_with('/'))
            .map(|(key, data)| (relocate(key, source_uri, target_uri), data.clone()))
            .collect();
        let count = copies.len();
        objects.extend(copies);
        Ok(count)
    }

    async fn delete_prefix(&self, uri: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(poison_err)?
            .retain(|key, _| !key.starts_with(uri));
        Ok(())
    }
}

/// Storage backend decorator that retries transient failures.
#[derive(Clone)]
pub struct RetryingBackend {
    inner: Arc<dyn StorageBackend>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RetryingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingBackend")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryingBackend {
    /// Wraps `inner` with the given retry policy.
    #[must_use]
    pub fn new(inner: Arc<dyn StorageBackend>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl StorageBackend for RetryingBackend {
    async fn list_prefix(&self, uri: &str) -> Result<Vec<String>> {
        retry(&self.policy, Error::is_retryable, || self.inner.list_prefix(uri)).await
    }

    async fn copy_prefix(&self, source_uri: &str, target_uri: &str) -> Result<usize> {
        retry(&self.policy, Error::is_retryable, || {
            self.inner.copy_prefix(source_uri, target_uri)
        })
        .await
    }

    async fn delete_prefix(&self, uri: &str) -> Result<()> {
        retry(&self.policy, Error::is_retryable, || self.inner.delete_prefix(uri)).await
    }
}
