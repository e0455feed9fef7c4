//! Fixture image sets and helpers.
//!
//! The fixture sets mirror a small real deployment: a destination holding
//! three images and a live source that has moved on since (one image
//! deleted, one added).

use bytes::Bytes;
use imagesync_client::MemoryImageStore;
use imagesync_codec::{ImageRecord, ImageStatus};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Active in both fixture sets.
pub const IMAGE_A: &str = "5dcddce0-cba5-4f18-9cf4-9853c7b207a6";
/// Deleted in both fixture sets.
pub const IMAGE_B: &str = "f4da1d2a-40e8-4710-b3aa-0222a4cc887b";
/// Active in [`fake_images`], deleted in [`live_master_images`].
pub const IMAGE_C: &str = "37ff82db-afca-48c7-ae0b-ddc7cf83e3db";
/// Only in [`live_master_images`].
pub const IMAGE_D: &str = "15648dd7-8dd0-401c-bd51-550e1ba9a088";

fn fixture(id: &str, status: ImageStatus, size: u64) -> ImageRecord {
    ImageRecord::new(id, status, size).with_attribute("dontrepl", "banana")
}

/// Three images: A active (100 bytes), B deleted (200), C active (300).
pub fn fake_images() -> Vec<ImageRecord> {
    vec![
        fixture(IMAGE_A, ImageStatus::Active, 100),
        fixture(IMAGE_B, ImageStatus::Deleted, 200),
        fixture(IMAGE_C, ImageStatus::Active, 300),
    ]
}

/// The live source: like [`fake_images`] but C is deleted and D is new.
pub fn live_master_images() -> Vec<ImageRecord> {
    vec![
        fixture(IMAGE_A, ImageStatus::Active, 100),
        fixture(IMAGE_B, ImageStatus::Deleted, 200),
        fixture(IMAGE_C, ImageStatus::Deleted, 300),
        fixture(IMAGE_D, ImageStatus::Active, 100),
    ]
}

/// A fully populated active image, as a store reports it.
pub fn active_image_record() -> ImageRecord {
    ImageRecord::new(
        "6d55dd55-053a-4765-b7bc-b30df0ea3861",
        ImageStatus::Active,
        4660272,
    )
    .with_attribute("name", "cirros-0.3.0-x86_64-uec-kernel")
    .with_attribute("disk_format", "aki")
    .with_attribute("container_format", "aki")
    .with_attribute("owner", "8aef75b5c0074a59aa99188fdb4b9e90")
    .with_attribute("is_public", true)
    .with_attribute("protected", false)
    .with_attribute("min_disk", 0)
    .with_attribute("min_ram", 0)
    .with_attribute("checksum", "f46cfe7fb3acaff49a3567031b9b53bb")
    .with_attribute("created_at", "2012-06-18T02:34:40")
    .with_attribute("updated_at", "2012-06-18T02:34:41")
    .with_attribute("deleted_at", json!(null))
    .with_attribute("deleted", false)
    .with_property("architecture", "x86_64")
    .with_property("image_location", "None")
    .with_property("image_state", "available")
    .with_property("project_id", "8aef75b5c0074a59aa99188fdb4b9e90")
    .with_property("kernel_id", json!(null))
}

/// Deterministic payload of exactly `record.size` bytes.
pub fn payload_for(record: &ImageRecord) -> Vec<u8> {
    let seed = record.id.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
    (0..record.size)
        .map(|i| seed.wrapping_add((i % 251) as u8))
        .collect()
}

/// A store holding `records`, with a [`payload_for`] payload on each active one.
pub fn store_with(records: impl IntoIterator<Item = ImageRecord>) -> MemoryImageStore {
    let store = MemoryImageStore::new();
    for record in records {
        let payload = record.is_active().then(|| Bytes::from(payload_for(&record)));
        store.insert(record, payload);
    }
    store
}

/// A store holding [`fake_images`].
pub fn fake_store() -> MemoryImageStore {
    store_with(fake_images())
}

/// A store holding [`live_master_images`].
pub fn live_master_store() -> MemoryImageStore {
    store_with(live_master_images())
}

/// Returns a fresh random image id.
pub fn random_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A temporary snapshot directory filled by hand.
///
/// Files are written directly, not through the engine, so tests can place
/// exactly what a previous run (or a user) left behind.
pub struct SnapshotDir {
    dir: TempDir,
}

impl SnapshotDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `<id>` as JSON and, if given, `<id>.img`.
    pub fn write_image(&self, record: &ImageRecord, payload: Option<&[u8]>) -> PathBuf {
        let path = self.dir.path().join(&record.id);
        fs::write(&path, serde_json::to_vec(record).expect("Failed to encode record"))
            .expect("Failed to write metadata file");
        if let Some(payload) = payload {
            fs::write(self.dir.path().join(format!("{}.img", record.id)), payload)
                .expect("Failed to write payload file");
        }
        path
    }

    /// Writes an arbitrary file.
    pub fn write_raw(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("Failed to write file");
        path
    }

    /// Returns true if `name` exists in the directory.
    pub fn exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }
}

impl Default for SnapshotDir {
    fn default() -> Self {
        Self::new()
    }
}
