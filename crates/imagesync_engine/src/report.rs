//! Run reports.

use crate::diff::{FieldDifference, SkipReason};
use imagesync_codec::ImageRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// An image that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedImage {
    /// Image id.
    pub id: String,
    /// Rendered error.
    pub error: String,
}

/// An image left alone on purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedImage {
    /// Image id.
    pub id: String,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// Result of a size survey.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SizeReport {
    /// Sum of the sizes of active images.
    pub total_bytes: u64,
    /// Number of active images.
    pub image_count: usize,
}

impl fmt::Display for SizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total size is {} bytes across {} images",
            self.total_bytes, self.image_count
        )
    }
}

/// Result of a dump.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DumpReport {
    /// Metadata files written.
    pub metadata_written: usize,
    /// Payload files downloaded.
    pub payloads_written: usize,
    /// Payload files already complete on disk.
    pub payloads_reused: usize,
    /// Payload bytes downloaded.
    pub bytes_written: u64,
    /// Images that failed.
    pub failed: Vec<FailedImage>,
}

impl fmt::Display for DumpReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Dumped {} images ({} payloads, {} bytes; {} payloads already present), {} failed",
            self.metadata_written,
            self.payloads_written,
            self.bytes_written,
            self.payloads_reused,
            self.failed.len()
        )
    }
}

/// How an image changed on the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Newly registered.
    Created,
    /// Metadata replaced.
    Updated,
}

/// One image written to the destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Whether the image was created or updated.
    pub kind: ChangeKind,
    /// Whether its payload was uploaded.
    pub with_payload: bool,
    /// Payload bytes uploaded.
    pub bytes: u64,
    /// The record that was sent.
    pub record: ImageRecord,
}

/// Result of a load or live copy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeReport {
    /// Images created or updated, by id.
    pub changed: BTreeMap<String, Change>,
    /// Images skipped on purpose.
    pub skipped: Vec<SkippedImage>,
    /// Images that failed.
    pub failed: Vec<FailedImage>,
    /// Payload bytes uploaded.
    pub bytes_transferred: u64,
}

impl ChangeReport {
    /// Returns true if `id` was created or updated.
    pub fn contains(&self, id: &str) -> bool {
        self.changed.contains_key(id)
    }

    /// Number of images created or updated.
    pub fn len(&self) -> usize {
        self.changed.len()
    }

    /// Returns true if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Number of created images.
    pub fn created(&self) -> usize {
        self.count(ChangeKind::Created)
    }

    /// Number of updated images.
    pub fn updated(&self) -> usize {
        self.count(ChangeKind::Updated)
    }

    fn count(&self, kind: ChangeKind) -> usize {
        self.changed.values().filter(|c| c.kind == kind).count()
    }
}

impl fmt::Display for ChangeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped, {} failed, {} bytes transferred",
            self.created(),
            self.updated(),
            self.skipped.len(),
            self.failed.len(),
            self.bytes_transferred
        )
    }
}

/// How a destination image differs from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difference {
    /// Absent from the destination.
    Missing,
    /// Present with different metadata.
    Diff,
}

impl Difference {
    /// Returns the report spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Difference::Missing => "missing",
            Difference::Diff => "diff",
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a compare.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DifferenceReport {
    /// Differing images, by id. Identical images are omitted.
    pub differences: BTreeMap<String, Difference>,
    /// Per-field details for images reported as `diff`.
    pub fields: BTreeMap<String, Vec<FieldDifference>>,
    /// Images that could not be compared.
    pub failed: Vec<FailedImage>,
}

impl DifferenceReport {
    /// Returns the difference recorded for `id`.
    pub fn get(&self, id: &str) -> Option<Difference> {
        self.differences.get(id).copied()
    }

    /// Returns true if no differences were found.
    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }

    /// Number of differing images.
    pub fn len(&self) -> usize {
        self.differences.len()
    }
}

impl fmt::Display for DifferenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing = self
            .differences
            .values()
            .filter(|d| **d == Difference::Missing)
            .count();
        write!(
            f,
            "{} missing, {} differing, {} failed",
            missing,
            self.differences.len() - missing,
            self.failed.len()
        )
    }
}
