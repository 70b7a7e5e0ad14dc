//! Object storage URIs (`s3://bucket/key`).

use std::fmt;

use crate::error::{Error, Result};

/// A parsed object storage URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUri {
    /// URI scheme without `://` (`s3`, `s3a`, `memory`).
    pub scheme: String,
    /// Bucket name.
    pub bucket: String,
    /// Object key or key prefix, without a leading slash. May be empty.
    pub key: String,
}

impl ObjectUri {
    /// Parses `scheme://bucket/key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the URI has no scheme or bucket.
    pub fn parse(raw: &str) -> Result<Self> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| Error::configuration(format!("object URI '{raw}' has no scheme")))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if scheme.is_empty() || bucket.is_empty() {
            return Err(Error::configuration(format!(
                "object URI '{raw}' must look like s3://bucket/prefix"
            )));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Returns a URI for `key` in the same bucket.
    #[must_use]
    pub fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            scheme: self.scheme.clone(),
            bucket: self.bucket.clone(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

/// Joins path segments onto a base URI and terminates the result with `/`.
///
/// Empty segments are skipped and duplicate separators are collapsed, so
/// `join("s3://lake/out/", &["events"])` is `s3://lake/out/events/`.
#[must_use]
pub fn join(base: &str, segments: &[&str]) -> String {
    let mut joined = base.trim_end_matches('/').to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if segment.is_empty() {
            continue;
        }
        joined.push('/');
        joined.push_str(segment);
    }
    joined.push('/');
    joined
}
