//! Load: snapshot directory to live store.

use crate::apply::{record_failure, sync_image};
use crate::config::ReplicationConfig;
use crate::diff::DestinationIndex;
use crate::error::{EngineError, EngineResult};
use crate::report::ChangeReport;
use crate::retry::Retrying;
use crate::snapshot::{SnapshotEntry, SnapshotStore};
use imagesync_client::ImageStore;
use std::io;
use tracing::info;

/// Replays `snapshot` onto `destination`.
///
/// Images absent from the destination are created (with their payload when
/// the snapshot has one); images whose metadata differs are updated. Returns
/// the ids created or updated.
pub fn load<D: ImageStore>(
    snapshot: &SnapshotStore,
    destination: &D,
    config: &ReplicationConfig,
) -> EngineResult<ChangeReport> {
    config.validate()?;
    let loader = Loader::new(snapshot, destination, config)?;

    let mut report = ChangeReport::default();
    for entry in snapshot.list()? {
        let entry = entry?;
        if let Err(e) = loader.load_entry(&entry, &mut report) {
            record_failure(&mut report.failed, &entry.record.id, e)?;
        }
    }

    info!(
        created = report.created(),
        updated = report.updated(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        bytes = report.bytes_transferred,
        dir = %snapshot.dir().display(),
        "load complete"
    );
    Ok(report)
}

struct Loader<'a, D: ImageStore> {
    snapshot: &'a SnapshotStore,
    destination: &'a D,
    reader: Retrying<&'a D>,
    index: DestinationIndex,
    config: &'a ReplicationConfig,
}

impl<'a, D: ImageStore> Loader<'a, D> {
    fn new(
        snapshot: &'a SnapshotStore,
        destination: &'a D,
        config: &'a ReplicationConfig,
    ) -> EngineResult<Self> {
        let reader = Retrying::new(destination, config.retry.clone());
        let index = DestinationIndex::build(&reader)?;
        Ok(Self {
            snapshot,
            destination,
            reader,
            index,
            config,
        })
    }

    fn load_entry(&self, entry: &SnapshotEntry, report: &mut ChangeReport) -> EngineResult<()> {
        let id = entry.record.id.as_str();
        let current = self.index.fetch(&self.reader, id)?;

        sync_image(
            self.destination,
            &entry.record,
            current.as_ref(),
            entry.has_payload(),
            self.config,
            report,
            || {
                self.snapshot.open_payload(id)?.ok_or_else(|| {
                    EngineError::from(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("payload for {id} disappeared from the snapshot"),
                    ))
                })
            },
        )
    }
}
