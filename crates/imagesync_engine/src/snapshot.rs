//! On-disk image snapshots.
//!
//! A snapshot is a flat directory holding, per image:
//!
//! ```text
//! <dir>/<id>       JSON metadata (always)
//! <dir>/<id>.img   raw payload (active images whose data was dumped)
//! ```
//!
//! Files are written to a `.part` sibling and renamed into place, so an
//! interrupted dump never leaves a truncated payload behind under its final
//! name. Anything in the directory that does not parse as an image record
//! is ignored when listing.

use crate::error::{EngineError, EngineResult};
use crate::transfer::copy_chunked;
use imagesync_client::ImagePayload;
use imagesync_codec::ImageRecord;
use std::fs::{self, File, ReadDir};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix of payload files.
pub const PAYLOAD_SUFFIX: &str = ".img";

/// Suffix of files still being written.
const PARTIAL_SUFFIX: &str = ".part";

/// One image found in a snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    /// The stored metadata.
    pub record: ImageRecord,
    /// Payload file, if the image's data was dumped.
    pub payload_path: Option<PathBuf>,
}

impl SnapshotEntry {
    /// Returns true if the entry has a payload file.
    pub fn has_payload(&self) -> bool {
        self.payload_path.is_some()
    }
}

/// A snapshot directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    chunk_size: usize,
}

impl SnapshotStore {
    /// Opens `dir`, creating it if it does not exist.
    pub fn create(dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = dir.as_ref();
        match fs::create_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }
        Self::open(dir)
    }

    /// Opens an existing snapshot directory.
    pub fn open(dir: impl AsRef<Path>) -> EngineResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(EngineError::invalid_argument(format!(
                "snapshot path is not a directory: {}",
                dir.display()
            )));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
        })
    }

    /// Sets the block size used when writing payloads.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Returns the snapshot directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the metadata file for `id`.
    pub fn metadata_path(&self, id: &str) -> EngineResult<PathBuf> {
        check_id(id)?;
        Ok(self.dir.join(id))
    }

    /// Path of the payload file for `id`.
    pub fn payload_path(&self, id: &str) -> EngineResult<PathBuf> {
        check_id(id)?;
        Ok(self.dir.join(format!("{id}{PAYLOAD_SUFFIX}")))
    }

    /// Writes the metadata and, if given, the payload of one image.
    ///
    /// Returns the number of payload bytes written.
    pub fn write(&self, record: &ImageRecord, payload: Option<&mut dyn Read>) -> EngineResult<u64> {
        self.write_metadata(record)?;
        match payload {
            Some(reader) => self.write_payload(&record.id, reader),
            None => Ok(0),
        }
    }

    /// Writes the metadata file of one image.
    pub fn write_metadata(&self, record: &ImageRecord) -> EngineResult<()> {
        let path = self.metadata_path(&record.id)?;
        let json = record.to_json()?;
        write_atomic(&path, |file| {
            file.write_all(&json)?;
            Ok(json.len() as u64)
        })?;
        Ok(())
    }

    /// Streams a payload into the payload file of `id`.
    ///
    /// Returns the number of bytes written.
    pub fn write_payload(&self, id: &str, reader: &mut dyn Read) -> EngineResult<u64> {
        let path = self.payload_path(id)?;
        let chunk_size = self.chunk_size;
        write_atomic(&path, |file| copy_chunked(reader, file, chunk_size))
    }

    /// Returns true if a payload file exists for `id`.
    pub fn has_payload(&self, id: &str) -> bool {
        self.payload_path(id).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Length of the payload file for `id`, if it exists.
    pub fn payload_len(&self, id: &str) -> Option<u64> {
        let path = self.payload_path(id).ok()?;
        let metadata = fs::metadata(path).ok()?;
        metadata.is_file().then(|| metadata.len())
    }

    /// Opens the payload of `id` for upload, `None` if there is none.
    pub fn open_payload(&self, id: &str) -> EngineResult<Option<ImagePayload>> {
        let path = self.payload_path(id)?;
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let length = file.metadata()?.len();
        Ok(Some(ImagePayload::new(file, length)))
    }

    /// Reads the record stored for `id`.
    pub fn read(&self, id: &str) -> EngineResult<ImageRecord> {
        let bytes = fs::read(self.metadata_path(id)?)?;
        Ok(ImageRecord::from_json(&bytes)?)
    }

    /// Lazily lists the images in the snapshot.
    ///
    /// Payload files, partial files, directories and unparsable files are
    /// skipped. The order is whatever the filesystem returns.
    pub fn list(&self) -> EngineResult<SnapshotEntries> {
        Ok(SnapshotEntries {
            store: self.clone(),
            read_dir: fs::read_dir(&self.dir)?,
        })
    }
}

/// Iterator over the images of a snapshot.
///
/// Yields an error only when the directory itself cannot be read.
pub struct SnapshotEntries {
    store: SnapshotStore,
    read_dir: ReadDir,
}

impl SnapshotEntries {
    fn parse(&self, path: &Path) -> Option<SnapshotEntry> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(PAYLOAD_SUFFIX) || name.ends_with(PARTIAL_SUFFIX) || !path.is_file() {
            return None;
        }

        let record = match fs::read(path)
            .map_err(EngineError::from)
            .and_then(|bytes| Ok(ImageRecord::from_json(&bytes)?))
        {
            Ok(record) => record,
            Err(e) => {
                debug!(file = %path.display(), error = %e, "ignoring file in snapshot");
                return None;
            }
        };

        let payload_path = self
            .store
            .payload_path(&record.id)
            .ok()
            .filter(|p| p.is_file());
        Some(SnapshotEntry {
            record,
            payload_path,
        })
    }
}

impl Iterator for SnapshotEntries {
    type Item = EngineResult<SnapshotEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dir_entry = match self.read_dir.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            if let Some(entry) = self.parse(&dir_entry.path()) {
                return Some(Ok(entry));
            }
        }
    }
}

/// Rejects ids that cannot be used as a plain file name.
fn check_id(id: &str) -> EngineResult<()> {
    let usable = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
        && !id.ends_with(PAYLOAD_SUFFIX)
        && !id.ends_with(PARTIAL_SUFFIX);
    if usable {
        Ok(())
    } else {
        Err(EngineError::invalid_argument(format!(
            "image id {id:?} cannot be stored as a file name"
        )))
    }
}

/// Writes `path` through a temporary sibling that is renamed into place.
fn write_atomic<F>(path: &Path, write: F) -> EngineResult<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<u64>,
{
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(PARTIAL_SUFFIX);
    let temp_path = PathBuf::from(temp_name);

    match write_then_rename(&temp_path, path, write) {
        Ok(written) => Ok(written),
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            Err(e.into())
        }
    }
}

fn write_then_rename<F>(temp_path: &Path, path: &Path, write: F) -> std::io::Result<u64>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<u64>,
{
    let mut file = BufWriter::new(File::create(temp_path)?);
    let written = write(&mut file)?;
    let file = file.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn snapshot() -> (TempDir, SnapshotStore) {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::create(dir.path()).unwrap();
        (dir, store)
    }

    fn list(store: &SnapshotStore) -> BTreeMap<String, SnapshotEntry> {
        store
            .list()
            .unwrap()
            .map(|e| e.unwrap())
            .map(|e| (e.record.id.clone(), e))
            .collect()
    }

    #[test]
    fn write_metadata_and_payload() {
        let (_dir, store) = snapshot();
        let record = ImageRecord::new("a", "active", 4).with_attribute("owner", "me");

        let written = store
            .write(&record, Some(&mut Cursor::new(b"data".to_vec())))
            .unwrap();
        assert_eq!(written, 4);
        assert_eq!(store.read("a").unwrap(), record);
        assert!(store.has_payload("a"));
        assert_eq!(store.payload_len("a"), Some(4));
        assert_eq!(fs::read(store.payload_path("a").unwrap()).unwrap(), b"data");
    }

    #[test]
    fn metadata_only_entry() {
        let (_dir, store) = snapshot();
        store
            .write(&ImageRecord::new("b", "deleted", 200), None)
            .unwrap();

        assert!(store.metadata_path("b").unwrap().is_file());
        assert!(!store.has_payload("b"));
        assert!(store.open_payload("b").unwrap().is_none());
    }

    #[test]
    fn open_payload_reports_file_length() {
        let (_dir, store) = snapshot();
        store
            .write_payload("a", &mut Cursor::new(vec![1u8; 5000]))
            .unwrap();

        let payload = store.open_payload("a").unwrap().unwrap();
        assert_eq!(payload.length(), 5000);
    }

    #[test]
    fn list_skips_junk() {
        let (dir, store) = snapshot();
        store
            .write(
                &ImageRecord::new("a", "active", 1),
                Some(&mut Cursor::new(b"x".to_vec())),
            )
            .unwrap();
        store.write(&ImageRecord::new("b", "queued", 0), None).unwrap();

        fs::write(dir.path().join("kjdfhf"), b"[1, 2, 3, 4, 5]").unwrap();
        fs::write(dir.path().join("noid"), br#"{"status": "active", "size": 1}"#).unwrap();
        fs::write(dir.path().join("garbage"), b"\xff\xfe not json").unwrap();
        fs::write(dir.path().join("c.part"), br#"{"id": "c", "status": "active", "size": 1}"#)
            .unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let entries = list(&store);
        assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(entries["a"].has_payload());
        assert!(!entries["b"].has_payload());
    }

    #[test]
    fn rewrite_replaces_previous_content() {
        let (_dir, store) = snapshot();
        store
            .write_payload("a", &mut Cursor::new(b"longer payload".to_vec()))
            .unwrap();
        store
            .write_payload("a", &mut Cursor::new(b"short".to_vec()))
            .unwrap();
        assert_eq!(store.payload_len("a"), Some(5));
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "gone"))
            }
        }

        let (dir, store) = snapshot();
        assert!(store.write_payload("a", &mut Broken).is_err());
        assert!(!store.has_payload("a"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unsafe_ids_are_rejected() {
        let (_dir, store) = snapshot();
        for id in ["", ".", "..", "../escape", "a/b", "x.part", "x.img"] {
            assert!(
                matches!(store.metadata_path(id), Err(EngineError::InvalidArgument(_))),
                "{id:?}"
            );
        }
        let err = store
            .write(&ImageRecord::new("../escape", "active", 0), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn payload_named_id_cannot_overwrite_a_payload() {
        let (_dir, store) = snapshot();
        store
            .write(
                &ImageRecord::new("x", "active", 4),
                Some(&mut Cursor::new(b"data".to_vec())),
            )
            .unwrap();

        let err = store
            .write(&ImageRecord::new("x.img", "queued", 0), None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));

        let mut payload = Vec::new();
        store
            .open_payload("x")
            .unwrap()
            .unwrap()
            .into_reader()
            .read_to_end(&mut payload)
            .unwrap();
        assert_eq!(payload, b"data");
    }

    #[test]
    fn open_requires_directory() {
        let (dir, _store) = snapshot();
        let file = dir.path().join("file");
        fs::write(&file, b"").unwrap();
        assert!(matches!(
            SnapshotStore::open(&file),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(SnapshotStore::create(dir.path().join("x/y")).is_ok());
    }
}
