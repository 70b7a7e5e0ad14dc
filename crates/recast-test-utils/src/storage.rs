//! Test storage with operation tracing and failure injection.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use recast_core::error::{Error, Result};
use recast_core::{MemoryBackend, StorageBackend};

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// Prefix listing.
    List {
        /// Prefix that was listed.
        prefix: String,
    },
    /// Prefix copy.
    Copy {
        /// Source prefix.
        source: String,
        /// Target prefix.
        target: String,
    },
    /// Prefix delete.
    Delete {
        /// Prefix that was deleted.
        prefix: String,
    },
}

#[derive(Debug, Clone)]
enum Injected {
    Permanent(String),
    Throttle { prefix: String, remaining: u32 },
}

/// In-memory storage backend that records operations and fails on demand.
///
/// Data lives in a shared [`MemoryBackend`], available through
/// [`inner`](Self::inner) for seeding and inspection.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryBackend {
    inner: MemoryBackend,
    operations: Arc<Mutex<Vec<StorageOp>>>,
    failures: Arc<Mutex<Vec<Injected>>>,
}

impl TracingMemoryBackend {
    /// Creates a new empty tracing storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing in-memory store.
    #[must_use]
    pub fn inner(&self) -> MemoryBackend {
        self.inner.clone()
    }

    /// Stores an object.
    pub fn put(&self, uri: impl Into<String>, data: &'static str) {
        self.inner.put(uri, data).expect("memory put");
    }

    /// Returns all stored keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys().expect("memory keys")
    }

    /// Returns stored keys under `prefix`.
    #[must_use]
    pub fn keys_under(&self, prefix: &str) -> Vec<String> {
        self.keys().into_iter().filter(|k| k.starts_with(prefix)).collect()
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StorageOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Fails every operation touching `prefix` with a storage error.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.failures
            .lock()
            .expect("lock")
            .push(Injected::Permanent(prefix.into()));
    }

    /// Fails the next `times` operations touching `prefix` with a transient
    /// error.
    pub fn inject_throttle(&self, prefix: impl Into<String>, times: u32) {
        self.failures.lock().expect("lock").push(Injected::Throttle {
            prefix: prefix.into(),
            remaining: times,
        });
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failures.lock().expect("lock").clear();
    }

    fn record(&self, op: StorageOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, uris: &[&str]) -> Result<()> {
        let mut failures = self.failures.lock().expect("lock");
        for failure in failures.iter_mut() {
            match failure {
                Injected::Permanent(prefix) => {
                    if let Some(uri) = uris.iter().find(|u| u.starts_with(prefix.as_str())) {
                        return Err(Error::storage(format!("injected failure for {uri}")));
                    }
                }
                Injected::Throttle { prefix, remaining } => {
                    if *remaining > 0 && uris.iter().any(|u| u.starts_with(prefix.as_str())) {
                        *remaining -= 1;
                        return Err(Error::transient("slow down"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for TracingMemoryBackend {
    async fn list_prefix(&self, uri: &str) -> Result<Vec<String>> {
        self.record(StorageOp::List {
            prefix: uri.to_string(),
        });
        self.check_failure(&[uri])?;
        self.inner.list_prefix(uri).await
    }

    async fn copy_prefix(&self, source_uri: &str, target_uri: &str) -> Result<usize> {
        self.record(StorageOp::Copy {
            source: source_uri.to_string(),
            target: target_uri.to_string(),
        });
        self.check_failure(&[source_uri, target_uri])?;
        self.inner.copy_prefix(source_uri, target_uri).await
    }

    async fn delete_prefix(&self, uri: &str) -> Result<()> {
        self.record(StorageOp::Delete {
            prefix: uri.to_string(),
        });
        self.check_failure(&[uri])?;
        self.inner.delete_prefix(uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_operations_and_injects_failures() {
        let storage = TracingMemoryBackend::new();
        storage.put("s3://lake/a/part-0", "x");
        storage.inject_failure("s3://lake/b/");

        assert_eq!(storage.copy_prefix("s3://lake/a/", "s3://lake/c/").await.unwrap(), 1);
        assert!(storage.copy_prefix("s3://lake/a/", "s3://lake/b/").await.is_err());
        assert_eq!(storage.operations().len(), 2);
    }

    #[tokio::test]
    async fn throttles_a_limited_number_of_times() {
        let storage = TracingMemoryBackend::new();
        storage.inject_throttle("s3://lake/", 1);

        let err = storage.delete_prefix("s3://lake/a/").await.unwrap_err();
        assert!(err.is_retryable());
        storage.delete_prefix("s3://lake/a/").await.unwrap();
    }
}
