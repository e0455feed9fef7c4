//! Per-image execution shared by the writing orchestrators.

use crate::config::ReplicationConfig;
use crate::diff::{decide, SyncAction};
use crate::error::{EngineError, EngineResult};
use crate::report::{Change, ChangeKind, ChangeReport, FailedImage, SkippedImage};
use crate::retry::with_backoff;
use crate::transfer::{metered, ByteCounter};
use imagesync_client::{ImagePayload, ImageStore};
use imagesync_codec::ImageRecord;
use tracing::{debug, error, info, warn};

/// Records a per-image failure, or hands it back if it must end the run.
pub(crate) fn record_failure(
    failed: &mut Vec<FailedImage>,
    id: &str,
    err: EngineError,
) -> EngineResult<()> {
    if err.is_fatal() {
        error!(image_id = id, error = %err, "aborting run");
        return Err(err);
    }
    warn!(image_id = id, error = %err, "image failed");
    failed.push(FailedImage {
        id: id.to_string(),
        error: err.to_string(),
    });
    Ok(())
}

/// Brings `destination` in line with `source` and records the outcome.
///
/// `current` is the destination's record, `None` if it has none.
/// `open_payload` is called once per upload attempt. Only the bytes of the
/// attempt that succeeds are added to the report.
pub(crate) fn sync_image<D, P>(
    destination: &D,
    source: &ImageRecord,
    current: Option<&ImageRecord>,
    payload_available: bool,
    config: &ReplicationConfig,
    report: &mut ChangeReport,
    open_payload: P,
) -> EngineResult<()>
where
    D: ImageStore,
    P: FnMut() -> EngineResult<ImagePayload>,
{
    let action = decide(source, current, &config.excluded, payload_available);
    match action {
        SyncAction::NoOp => {
            debug!(image_id = %source.id, "image up to date");
            Ok(())
        }
        SyncAction::Skip(reason) => {
            info!(image_id = %source.id, reason = reason.as_str(), "skipping image");
            report.skipped.push(SkippedImage {
                id: source.id.clone(),
                reason,
            });
            Ok(())
        }
        SyncAction::Create { .. } | SyncAction::Update { .. } => {
            let outgoing = config.excluded.strip(source);
            if let Some(change) = apply(destination, action, &outgoing, config, open_payload)? {
                report.bytes_transferred += change.bytes;
                report.changed.insert(source.id.clone(), change);
            }
            Ok(())
        }
    }
}

/// Performs a create or update on `destination`.
///
/// Returns `None` when nothing was written: the action was not a write, or
/// a create found the image already present.
pub(crate) fn apply<D, P>(
    destination: &D,
    action: SyncAction,
    record: &ImageRecord,
    config: &ReplicationConfig,
    mut open_payload: P,
) -> EngineResult<Option<Change>>
where
    D: ImageStore,
    P: FnMut() -> EngineResult<ImagePayload>,
{
    let (kind, with_payload) = match action {
        SyncAction::Create { with_payload } => (ChangeKind::Created, with_payload),
        SyncAction::Update { with_payload } => (ChangeKind::Updated, with_payload),
        SyncAction::Skip(_) | SyncAction::NoOp => return Ok(None),
    };

    let retry = &config.retry;
    // Replaced on every attempt so a retried upload is counted once.
    let mut sent = ByteCounter::new();
    let result: EngineResult<_> = match (kind, with_payload) {
        (_, false) => with_backoff(retry, "add image metadata", || {
            Ok(destination.add_image_meta(record)?)
        }),
        (ChangeKind::Created, true) => with_backoff(retry, "add image", || {
            sent = ByteCounter::new();
            let payload = metered(open_payload()?, config.chunk_size, &sent);
            Ok(destination.add_image(record, payload)?)
        }),
        (ChangeKind::Updated, true) => with_backoff(retry, "update image", || {
            sent = ByteCounter::new();
            let payload = metered(open_payload()?, config.chunk_size, &sent);
            Ok(destination.update_image(record, payload)?)
        }),
    };

    match result {
        Ok(_) => {
            let bytes = sent.get();
            info!(
                image_id = %record.id,
                kind = ?kind,
                with_payload,
                bytes,
                "replicated image"
            );
            Ok(Some(Change {
                kind,
                with_payload,
                bytes,
                record: record.clone(),
            }))
        }
        Err(e) if kind == ChangeKind::Created && e.is_already_present() => {
            info!(image_id = %record.id, "image already present on destination");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
