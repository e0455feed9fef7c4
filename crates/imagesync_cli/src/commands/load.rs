//! Load command implementation.

use super::{connect, render, CommandResult, Options, Outcome};
use imagesync_client::ImageStore;
use imagesync_engine::SnapshotStore;
use std::path::Path;

/// Runs the load command from `path` onto `server`.
pub fn execute(server: &str, path: &Path, options: &Options) -> CommandResult<Outcome> {
    let store = connect(server, &options.destination_token)?;
    run(path, &store, options)
}

/// Loads the snapshot directory at `path` into `store`.
pub fn run<D: ImageStore>(path: &Path, store: &D, options: &Options) -> CommandResult<Outcome> {
    let snapshot = SnapshotStore::open(path)?.with_chunk_size(options.chunk_size);
    let report = imagesync_engine::load(&snapshot, store, &options.replication_config())?;
    Ok(Outcome {
        output: render(&report, options.format, super::livecopy::text)?,
        failed: report.failed.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_options;
    use imagesync_client::MemoryImageStore;
    use imagesync_codec::ImageRecord;
    use imagesync_testkit::SnapshotDir;

    #[test]
    fn loads_into_empty_store() {
        let dir = SnapshotDir::new();
        dir.write_image(&ImageRecord::new("a", "active", 4), Some(b"data"));
        let store = MemoryImageStore::new();

        let outcome = run(dir.path(), &store, &test_options()).unwrap();
        assert!(outcome.output.contains("created a"));
        assert_eq!(store.payload("a").unwrap().as_ref(), b"data");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = MemoryImageStore::new();
        assert!(run(&dir.path().join("absent"), &store, &test_options()).is_err());
    }
}
