//! # recast-core
//!
//! Core abstractions shared by every recast component.
//!
//! - **Error Types**: The shared error taxonomy and result alias
//! - **Retry**: A bounded retry combinator and the backoff schedules it drives
//! - **Storage Formats**: Catalog descriptors for each supported output format
//! - **Object Storage**: The prefix-oriented storage boundary and an in-memory backend
//! - **Observability**: Logging initialization and span helpers
//!
//! ## Example
//!
//! ```rust
//! use recast_core::prelude::*;
//!
//! let format = StorageFormat::parse("Parquet").unwrap();
//! assert_eq!(format.descriptor().compression, "snappy");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod observability;
pub mod retry;
pub mod storage;
pub mod storage_format;
pub mod uri;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::retry::{Backoff, RetryPolicy};
    pub use crate::storage::{MemoryBackend, RetryingBackend, StorageBackend};
    pub use crate::storage_format::{FormatDescriptor, SerdeInfo, StorageFormat};
}

pub use error::{Error, Result};
pub use observability::{LogFormat, init_logging};
pub use retry::{Backoff, RetryPolicy, retry};
pub use storage::{MemoryBackend, RetryingBackend, StorageBackend};
pub use storage_format::{FormatDescriptor, SerdeInfo, StorageFormat};
pub use uri::ObjectUri;
