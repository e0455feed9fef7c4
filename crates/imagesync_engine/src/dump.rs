//! Dump: live store to snapshot directory.

use crate::apply::record_failure;
use crate::config::ReplicationConfig;
use crate::error::EngineResult;
use crate::report::DumpReport;
use crate::retry::Retrying;
use crate::snapshot::SnapshotStore;
use imagesync_client::ImageStore;
use imagesync_codec::ImageRecord;
use tracing::{debug, info, warn};

/// Copies every image of `source` into `snapshot`.
///
/// Metadata is always written. Payloads are written for active images
/// unless the run is metadata-only; a payload file that already has the
/// record's size is kept as is.
pub fn dump<S: ImageStore>(
    source: &S,
    snapshot: &SnapshotStore,
    config: &ReplicationConfig,
) -> EngineResult<DumpReport> {
    config.validate()?;
    let source = Retrying::new(source, config.retry.clone());
    let snapshot = snapshot.clone().with_chunk_size(config.chunk_size);

    let mut report = DumpReport::default();
    for record in source.list_images(config.list_filter) {
        let record = record?;
        if let Err(e) = dump_image(&source, &snapshot, &record, config, &mut report) {
            record_failure(&mut report.failed, &record.id, e)?;
        }
    }

    info!(
        images = report.metadata_written,
        payloads = report.payloads_written,
        reused = report.payloads_reused,
        bytes = report.bytes_written,
        failed = report.failed.len(),
        dir = %snapshot.dir().display(),
        "dump complete"
    );
    Ok(report)
}

fn dump_image<S: ImageStore>(
    source: &S,
    snapshot: &SnapshotStore,
    record: &ImageRecord,
    config: &ReplicationConfig,
    report: &mut DumpReport,
) -> EngineResult<()> {
    snapshot.write_metadata(record)?;
    report.metadata_written += 1;

    if config.metadata_only || !record.is_active() {
        debug!(image_id = %record.id, status = %record.status, "dumped metadata only");
        return Ok(());
    }

    if snapshot.payload_len(&record.id) == Some(record.size) {
        debug!(image_id = %record.id, "payload already on disk");
        report.payloads_reused += 1;
        return Ok(());
    }

    let mut stream = source.get_image(&record.id)?;
    let written = snapshot.write_payload(&record.id, &mut stream)?;
    if written != record.size {
        warn!(
            image_id = %record.id,
            expected = record.size,
            written,
            "payload size differs from metadata"
        );
    }

    report.payloads_written += 1;
    report.bytes_written += written;
    info!(image_id = %record.id, bytes = written, "dumped image");
    Ok(())
}
