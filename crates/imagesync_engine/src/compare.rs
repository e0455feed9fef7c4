//! Compare: read-only difference report between two live stores.

use crate::apply::record_failure;
use crate::config::ReplicationConfig;
use crate::diff::{field_differences, DestinationIndex};
use crate::error::EngineResult;
use crate::report::{Difference, DifferenceReport};
use crate::retry::Retrying;
use imagesync_client::ImageStore;
use tracing::info;

/// Reports how `destination` differs from `source` without writing to either.
///
/// Source images absent from the destination are `missing`; present ones
/// with different metadata are `diff`. Images only on the destination are
/// not reported.
pub fn compare<S: ImageStore, D: ImageStore>(
    source: &S,
    destination: &D,
    config: &ReplicationConfig,
) -> EngineResult<DifferenceReport> {
    config.validate()?;
    let source = Retrying::new(source, config.retry.clone());
    let destination = Retrying::new(destination, config.retry.clone());
    let index = DestinationIndex::build(&destination)?;

    let mut report = DifferenceReport::default();
    for record in source.list_images(config.list_filter) {
        let record = record?;
        let current = match index.fetch(&destination, &record.id) {
            Ok(current) => current,
            Err(e) => {
                record_failure(&mut report.failed, &record.id, e.into())?;
                continue;
            }
        };

        let Some(current) = current else {
            info!(image_id = %record.id, "image missing on destination");
            report
                .differences
                .insert(record.id.clone(), Difference::Missing);
            continue;
        };

        let fields = field_differences(&record, &current, &config.excluded);
        if fields.is_empty() {
            continue;
        }
        for field in &fields {
            info!(
                image_id = %record.id,
                field = %field.field,
                source = %field.source,
                destination = field.destination.as_deref().unwrap_or("<absent>"),
                "image differs"
            );
        }
        report.differences.insert(record.id.clone(), Difference::Diff);
        report.fields.insert(record.id.clone(), fields);
    }

    info!(
        differences = report.len(),
        failed = report.failed.len(),
        "compare complete"
    );
    Ok(report)
}
