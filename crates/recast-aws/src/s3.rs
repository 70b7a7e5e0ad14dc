//! Amazon S3 implementation of [`StorageBackend`] on `object_store`.
//!
//! One store is built per bucket on first use. A prefix ending in `/` is
//! listed by whole segments, so `s3://lake/raw/events/` never matches
//! `raw/events2/...`. Any other prefix matches keys as raw strings, the way
//! S3 does: `s3://results/q-1.csv` covers the object itself and
//! `q-1.csv.metadata`.
//! Copies within a bucket use server-side copy; copies across buckets read
//! and rewrite each object.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;

use recast_core::{Error, ObjectUri, Result, StorageBackend};

/// Concurrent object copies or deletes per prefix operation.
pub const TRANSFER_CONCURRENCY: usize = 16;

type Connect = dyn Fn(&str) -> object_store::Result<Arc<dyn ObjectStore>> + Send + Sync;

/// S3 storage backend.
pub struct S3Backend {
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    connect: Box<Connect>,
}

impl fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets: Vec<String> = self
            .stores
            .lock()
            .map(|stores| stores.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("S3Backend").field("buckets", &buckets).finish_non_exhaustive()
    }
}

/// Maps an `object_store` error. Generic failures have already exhausted the
/// store's own retries and are reported as transient.
fn storage_error(err: object_store::Error, context: &str) -> Error {
    match err {
        object_store::Error::Generic { .. } => Error::transient_with_source(context.to_string(), err),
        other => Error::storage_with_source(context.to_string(), other),
    }
}

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::Internal {
        message: "s3 store cache lock poisoned".into(),
    }
}

fn prefix_path(uri: &ObjectUri) -> Result<Path> {
    Path::parse(uri.key.trim_matches('/'))
        .map_err(|e| Error::configuration(format!("invalid object key '{}': {e}", uri.key)))
}

impl S3Backend {
    /// Creates a backend whose stores are configured from the standard AWS
    /// environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::with_connector(|bucket| {
            let store = AmazonS3Builder::from_env().with_bucket_name(bucket).build()?;
            Ok(Arc::new(store) as Arc<dyn ObjectStore>)
        })
    }

    /// Creates a backend that builds the store of each bucket with `connect`.
    #[must_use]
    pub fn with_connector<F>(connect: F) -> Self
    where
        F: Fn(&str) -> object_store::Result<Arc<dyn ObjectStore>> + Send + Sync + 'static,
    {
        Self {
            stores: Mutex::new(HashMap::new()),
            connect: Box::new(connect),
        }
    }

    /// Creates a backend over fixed per-bucket stores. Other buckets are
    /// rejected.
    #[must_use]
    pub fn with_stores(stores: impl IntoIterator<Item = (String, Arc<dyn ObjectStore>)>) -> Self {
        let backend = Self::with_connector(|bucket| {
            Err(object_store::Error::NotSupported {
                source: format!("no store configured for bucket {bucket}").into(),
            })
        });
        if let Ok(mut cache) = backend.stores.lock() {
            cache.extend(stores);
        }
        backend
    }

    fn store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let mut stores = self.stores.lock().map_err(poison_err)?;
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }
        let store = (self.connect)(bucket)
            .map_err(|e| Error::configuration(format!("cannot open bucket {bucket}: {e}")))?;
        stores.insert(bucket.to_string(), Arc::clone(&store));
        drop(stores);
        Ok(store)
    }

    async fn list_paths(&self, uri: &ObjectUri) -> Result<Vec<Path>> {
        let store = self.store(&uri.bucket)?;
        let key = uri.key.trim_start_matches('/');
        if key.is_empty() || key.ends_with('/') {
            let prefix = prefix_path(uri)?;
            return store
                .list(Some(&prefix))
                .map_ok(|meta| meta.location)
                .try_collect()
                .await
                .map_err(|e| storage_error(e, &format!("failed to list {uri}")));
        }

        let parent = match key.rsplit_once('/') {
            Some((parent, _)) => Some(
                Path::parse(parent)
                    .map_err(|e| Error::configuration(format!("invalid object key '{}': {e}", uri.key)))?,
            ),
            None => None,
        };
        store
            .list(parent.as_ref())
            .try_filter_map(|meta| async move {
                Ok(meta.location.as_ref().starts_with(key).then_some(meta.location))
            })
            .try_collect()
            .await
            .map_err(|e| storage_error(e, &format!("failed to list {uri}")))
    }
}

#[async_trait]
impl StorageBackend for S3Backend {
    async fn list_prefix(&self, uri: &str) -> Result<Vec<String>> {
        let uri = ObjectUri::parse(uri)?;
        let paths = self.list_paths(&uri).await?;
        Ok(paths
            .into_iter()
            .map(|path| uri.with_key(path.to_string()).to_string())
            .collect())
    }

    async fn copy_prefix(&self, source_uri: &str, target_uri: &str) -> Result<usize> {
        let source = ObjectUri::parse(source_uri)?;
        let target = ObjectUri::parse(target_uri)?;
        let source_store = self.store(&source.bucket)?;
        let target_store = self.store(&target.bucket)?;
        let source_prefix = prefix_path(&source)?.to_string();
        let target_prefix = prefix_path(&target)?.to_string();
        let same_bucket = source.bucket == target.bucket;

        let paths = self.list_paths(&source).await?;
        let count = paths.len();
        futures::stream::iter(paths)
            .map(|from| {
                let source_store = Arc::clone(&source_store);
                let target_store = Arc::clone(&target_store);
                let relative = from
                    .as_ref()
                    .strip_prefix(source_prefix.as_str())
                    .unwrap_or(from.as_ref())
                    .trim_start_matches('/')
                    .to_string();
                let to = if relative.is_empty() {
                    Path::parse(&target_prefix)
                } else {
                    Path::parse(format!("{target_prefix}/{relative}"))
                };
                async move {
                    let to = to.map_err(|e| Error::configuration(format!("invalid copy target for {from}: {e}")))?;
                    let context = format!("failed to copy {from} to {to}");
                    if same_bucket {
                        return source_store.copy(&from, &to).await.map_err(|e| storage_error(e, &context));
                    }
                    let data = source_store
                        .get(&from)
                        .await
                        .map_err(|e| storage_error(e, &context))?
                        .bytes()
                        .await
                        .map_err(|e| storage_error(e, &context))?;
                    target_store
                        .put(&to, data.into())
                        .await
                        .map(|_| ())
                        .map_err(|e| storage_error(e, &context))
                }
            })
            .buffer_unordered(TRANSFER_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        tracing::debug!(source = source_uri, target = target_uri, count, "copied prefix");
        Ok(count)
    }

    async fn delete_prefix(&self, uri: &str) -> Result<()> {
        let parsed = ObjectUri::parse(uri)?;
        let store = self.store(&parsed.bucket)?;
        let paths = self.list_paths(&parsed).await?;
        let count = paths.len();
        futures::stream::iter(paths)
            .map(|path| {
                let store = Arc::clone(&store);
                async move {
                    match store.delete(&path).await {
                        Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                        Err(e) => Err(storage_error(e, &format!("failed to delete {path}"))),
                    }
                }
            })
            .buffer_unordered(TRANSFER_CONCURRENCY)
            .try_collect::<Vec<()>>()
            .await?;

        tracing::debug!(prefix = uri, count, "deleted prefix");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use object_store::memory::InMemory;

    use super::*;

    async fn backend() -> (S3Backend, Arc<dyn ObjectStore>, Arc<dyn ObjectStore>) {
        let lake: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let archive: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        for key in [
            "raw/events/dt=1/part-0.csv",
            "raw/events/dt=2/part-0.csv",
            "raw/events2/part-0.csv",
        ] {
            lake.put(&Path::from(key), "x".into()).await.unwrap();
        }
        let backend = S3Backend::with_stores([
            ("lake".to_string(), Arc::clone(&lake)),
            ("archive".to_string(), Arc::clone(&archive)),
        ]);
        (backend, lake, archive)
    }

    #[tokio::test]
    async fn lists_only_whole_segments() {
        let (backend, _, _) = backend().await;
        let mut keys = backend.list_prefix("s3://lake/raw/events/").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "s3://lake/raw/events/dt=1/part-0.csv",
                "s3://lake/raw/events/dt=2/part-0.csv",
            ]
        );
    }

    #[tokio::test]
    async fn copies_within_and_across_buckets() {
        let (backend, lake, archive) = backend().await;

        let copied = backend
            .copy_prefix("s3://lake/raw/events/", "s3://lake/curated/events/")
            .await
            .unwrap();
        assert_eq!(copied, 2);
        lake.head(&Path::from("curated/events/dt=2/part-0.csv")).await.unwrap();

        backend
            .copy_prefix("s3://lake/raw/events/", "s3://archive/events/")
            .await
            .unwrap();
        archive.head(&Path::from("events/dt=1/part-0.csv")).await.unwrap();
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (backend, _, _) = backend().await;
        backend.delete_prefix("s3://lake/raw/events/").await.unwrap();
        backend.delete_prefix("s3://lake/raw/events/").await.unwrap();

        assert!(backend.list_prefix("s3://lake/raw/events/").await.unwrap().is_empty());
        assert_eq!(backend.list_prefix("s3://lake/raw/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_an_object_key_removes_it_and_its_siblings() {
        let results: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        for key in ["athena/q-1.csv", "athena/q-1.csv.metadata", "athena/q-2.csv"] {
            results.put(&Path::from(key), "x".into()).await.unwrap();
        }
        let backend = S3Backend::with_stores([("results".to_string(), results)]);

        assert_eq!(backend.list_prefix("s3://results/athena/q-1.csv").await.unwrap().len(), 2);
        backend.delete_prefix("s3://results/athena/q-1.csv").await.unwrap();

        assert_eq!(
            backend.list_prefix("s3://results/athena/").await.unwrap(),
            vec!["s3://results/athena/q-2.csv"]
        );
    }

    #[tokio::test]
    async fn copies_a_single_object() {
        let (backend, lake, _) = backend().await;
        let copied = backend
            .copy_prefix("s3://lake/raw/events2/part-0.csv", "s3://lake/curated/one.csv")
            .await
            .unwrap();
        assert_eq!(copied, 1);
        lake.head(&Path::from("curated/one.csv")).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_buckets_are_configuration_errors() {
        let (backend, _, _) = backend().await;
        let err = backend.list_prefix("s3://elsewhere/x/").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
