//! Dump command implementation.

use super::{connect, render, CommandResult, Options, Outcome};
use imagesync_client::ImageStore;
use imagesync_engine::{DumpReport, SnapshotStore};
use std::fmt::Write;
use std::path::Path;

/// Runs the dump command from `server` into `path`.
pub fn execute(server: &str, path: &Path, options: &Options) -> CommandResult<Outcome> {
    let store = connect(server, &options.source_token)?;
    run(&store, path, options)
}

/// Dumps `store` into the snapshot directory at `path`, creating it if needed.
pub fn run<S: ImageStore>(store: &S, path: &Path, options: &Options) -> CommandResult<Outcome> {
    let snapshot = SnapshotStore::create(path)?.with_chunk_size(options.chunk_size);
    let report = imagesync_engine::dump(store, &snapshot, &options.replication_config())?;
    Ok(Outcome {
        output: render(&report, options.format, text)?,
        failed: report.failed.len(),
    })
}

fn text(report: &DumpReport) -> String {
    let mut out = String::new();
    for failure in &report.failed {
        let _ = writeln!(out, "failed {}: {}", failure.id, failure.error);
    }
    out.push_str(&report.to_string());
    out
}
