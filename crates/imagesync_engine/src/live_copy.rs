//! Live copy: one live store to another.

use crate::apply::{record_failure, sync_image};
use crate::config::ReplicationConfig;
use crate::diff::DestinationIndex;
use crate::error::{EngineError, EngineResult};
use crate::report::ChangeReport;
use crate::retry::Retrying;
use imagesync_client::ImageStore;
use tracing::{info, warn};

/// Replicates every image of `source` onto `destination`.
///
/// Payloads stream straight from the source response into the destination
/// request in `chunk_size` blocks and never touch disk.
pub fn live_copy<S: ImageStore, D: ImageStore>(
    source: &S,
    destination: &D,
    config: &ReplicationConfig,
) -> EngineResult<ChangeReport> {
    config.validate()?;
    let source = Retrying::new(source, config.retry.clone());
    let reader = Retrying::new(destination, config.retry.clone());
    let index = DestinationIndex::build(&reader)?;

    let mut report = ChangeReport::default();
    for record in source.list_images(config.list_filter) {
        let record = record?;
        let payload_available = !config.metadata_only && record.is_active();

        let result = index
            .fetch(&reader, &record.id)
            .map_err(EngineError::from)
            .and_then(|current| {
                sync_image(
                    destination,
                    &record,
                    current.as_ref(),
                    payload_available,
                    config,
                    &mut report,
                    || {
                        let download = source.get_image(&record.id)?;
                        let announced = download.content_length();
                        if let Some(length) = announced.filter(|&n| n != record.size) {
                            warn!(
                                image_id = %record.id,
                                listed = record.size,
                                announced = length,
                                "payload length differs from listing"
                            );
                        }
                        Ok(download.into_payload(record.size))
                    },
                )
            });
        if let Err(e) = result {
            record_failure(&mut report.failed, &record.id, e)?;
        }
    }

    info!(
        created = report.created(),
        updated = report.updated(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        bytes = report.bytes_transferred,
        "live copy complete"
    );
    Ok(report)
}
