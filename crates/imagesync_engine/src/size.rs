//! Size survey.

use crate::config::ReplicationConfig;
use crate::error::EngineResult;
use crate::report::SizeReport;
use crate::retry::Retrying;
use imagesync_client::ImageStore;
use tracing::info;

/// Sums the sizes of the active images on `store`.
pub fn size<S: ImageStore>(store: &S, config: &ReplicationConfig) -> EngineResult<SizeReport> {
    config.validate()?;
    let store = Retrying::new(store, config.retry.clone());

    let mut report = SizeReport::default();
    for record in store.list_images(config.list_filter) {
        let record = record?;
        if record.is_active() {
            report.total_bytes += record.size;
            report.image_count += 1;
        }
    }

    info!(
        total_bytes = report.total_bytes,
        image_count = report.image_count,
        "size survey complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagesync_client::{ListFilter, MemoryImageStore};
    use imagesync_codec::ImageRecord;

    #[test]
    fn counts_active_images_only() {
        let store = MemoryImageStore::new().with_page_size(2);
        store.insert(ImageRecord::new("a", "active", 100), None::<Vec<u8>>);
        store.insert(ImageRecord::new("b", "deleted", 200), None::<Vec<u8>>);
        store.insert(ImageRecord::new("c", "active", 300), None::<Vec<u8>>);
        store.insert(ImageRecord::new("d", "queued", 0), None::<Vec<u8>>);

        let report = size(&store, &ReplicationConfig::default()).unwrap();
        assert_eq!(report.total_bytes, 400);
        assert_eq!(report.image_count, 2);
    }

    #[test]
    fn empty_store() {
        let report = size(&MemoryImageStore::new(), &ReplicationConfig::default()).unwrap();
        assert_eq!(report, SizeReport::default());
    }

    #[test]
    fn honours_list_filter() {
        let store = MemoryImageStore::new();
        store.insert(
            ImageRecord::new("a", "active", 100).with_attribute("is_public", true),
            None::<Vec<u8>>,
        );
        store.insert(
            ImageRecord::new("b", "active", 50).with_attribute("is_public", false),
            None::<Vec<u8>>,
        );

        let config = ReplicationConfig::default().with_list_filter(ListFilter::public(false));
        assert_eq!(size(&store, &config).unwrap().total_bytes, 50);
    }
}
