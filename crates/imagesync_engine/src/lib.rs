//! # imagesync engine
//!
//! Replication engine for image stores.
//!
//! This crate provides:
//! - Change detection ([`dict_diff`], [`decide`])
//! - A crash-safe on-disk snapshot format ([`SnapshotStore`])
//! - Four replication modes plus a size survey:
//!   [`dump`], [`load`], [`live_copy`], [`compare`], [`size`]
//! - Retry with exponential backoff ([`Retrying`], [`with_backoff`])
//!
//! ## Failure policy
//!
//! Each image is processed to completion before the next. A failure on one
//! image is logged, recorded in the run report and the run moves on; an
//! authentication failure ends the run. Transient failures (transport
//! errors, HTTP 5xx) are retried with capped exponential backoff first.
//! A create that finds the image already present counts as done.
//!
//! ## Example
//!
//! ```rust
//! use imagesync_client::MemoryImageStore;
//! use imagesync_codec::ImageRecord;
//! use imagesync_engine::{compare, live_copy, ReplicationConfig};
//!
//! let source = MemoryImageStore::new();
//! source.insert(ImageRecord::new("a", "active", 4), Some(&b"data"[..]));
//! let destination = MemoryImageStore::new();
//!
//! let config = ReplicationConfig::default();
//! let copied = live_copy(&source, &destination, &config).unwrap();
//! assert!(copied.contains("a"));
//! assert!(compare(&source, &destination, &config).unwrap().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod compare;
mod config;
mod diff;
mod dump;
mod error;
mod live_copy;
mod load;
mod report;
mod retry;
mod size;
mod snapshot;
mod transfer;

pub use compare::compare;
pub use config::{
    Endpoint, ExcludedAttributes, ReplicationConfig, RetryConfig, DEFAULT_CHUNK_SIZE,
    DEFAULT_DONT_REPLICATE,
};
pub use diff::{
    decide, dict_diff, field_differences, is_image_present, records_differ, DestinationIndex,
    FieldDifference, SkipReason, SyncAction,
};
pub use dump::dump;
pub use error::{EngineError, EngineResult};
pub use live_copy::live_copy;
pub use load::load;
pub use report::{
    Change, ChangeKind, ChangeReport, Difference, DifferenceReport, DumpReport, FailedImage,
    SizeReport, SkippedImage,
};
pub use retry::{with_backoff, Retryable, Retrying};
pub use size::size;
pub use snapshot::{SnapshotEntries, SnapshotEntry, SnapshotStore, PAYLOAD_SUFFIX};
pub use transfer::{copy_chunked, metered, ByteCounter, ChunkedReader};
