//! End-to-end replication runs against in-memory stores.

use imagesync_client::{ImageStore, ListFilter, MemoryImageStore, Operation};
use imagesync_codec::{ImageRecord, ImageStatus};
use imagesync_engine::{
    compare, decide, dump, live_copy, load, records_differ, size, Difference, EngineError,
    ExcludedAttributes, ReplicationConfig, RetryConfig, SnapshotStore, SyncAction,
};
use imagesync_testkit::prelude::*;
use proptest::prelude::*;
use std::fs;
use std::time::Duration;

fn config() -> ReplicationConfig {
    ReplicationConfig::default()
        .with_chunk_size(4096)
        .with_excluded(ExcludedAttributes::parse("dontrepl dontreplabsent"))
        .with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::ZERO)
                .with_jitter(false),
        )
}

#[test]
fn size_counts_active_images() {
    let report = size(&fake_store(), &config()).unwrap();
    assert_eq!(report.to_string(), "Total size is 400 bytes across 2 images");
}

#[test]
fn dump_writes_metadata_and_active_payloads() {
    let dir = tempfile::TempDir::new().unwrap();
    let snapshot = SnapshotStore::create(dir.path()).unwrap();

    let report = dump(&fake_store(), &snapshot, &config()).unwrap();
    assert_eq!(report.metadata_written, 3);
    assert!(report.failed.is_empty());

    for id in [IMAGE_A, IMAGE_C] {
        assert!(dir.path().join(id).is_file());
        assert!(dir.path().join(format!("{id}.img")).is_file());
    }
    assert!(dir.path().join(IMAGE_B).is_file());
    assert!(!dir.path().join(format!("{IMAGE_B}.img")).exists());

    for id in [IMAGE_A, IMAGE_B, IMAGE_C] {
        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(dir.path().join(id)).unwrap()).unwrap();
        for field in ["id", "status", "size"] {
            assert!(json.get(field).is_some(), "{id} lacks {field}");
        }
    }

    let record = fake_images().remove(0);
    assert_eq!(
        fs::read(dir.path().join(format!("{IMAGE_A}.img"))).unwrap(),
        payload_for(&record)
    );
}

#[test]
fn load_replays_snapshot_onto_destination() {
    let dir = SnapshotDir::new();
    let mut last = None;
    for image in fake_images() {
        let mut image = image;
        // Newer on disk than on the destination.
        if image.id == IMAGE_A {
            image = image.with_attribute("extra", "thisissomeextra");
        }
        // Differs only in an excluded attribute.
        if image.id == IMAGE_B {
            image = image.with_attribute("dontrepl", "thisisyetmoreextra");
        }
        dir.write_image(&image, Some(b"kjdhfkjshdfkjhsdkfd"));
        last = Some(image);
    }
    let template = last.unwrap();

    let mut absent = template.clone();
    absent.id = random_id();
    dir.write_image(&absent, Some(b"dskjfhskjhfkfdhksjdhf"));

    let mut absent_without_data = template;
    absent_without_data.id = random_id();
    dir.write_image(&absent_without_data, None);

    dir.write_raw("kjdfhf", b"[1, 2, 3, 4, 5]");

    let destination = fake_store();
    let snapshot = SnapshotStore::open(dir.path()).unwrap();
    let updated = load(&snapshot, &destination, &config()).unwrap();

    assert!(updated.contains(IMAGE_A));
    assert!(!updated.contains(IMAGE_B));
    assert!(updated.contains(&absent.id));
    assert!(!updated.contains(&absent_without_data.id));
    assert_eq!(updated.len(), 2);
    assert!(updated.failed.is_empty());

    let record = destination.record(IMAGE_A).unwrap();
    assert_eq!(
        record.attribute("extra"),
        Some(&serde_json::json!("thisissomeextra"))
    );
    assert_eq!(
        destination.payload(&absent.id).unwrap().as_ref(),
        b"dskjfhskjhfkfdhksjdhf"
    );
    assert!(destination.record(&absent_without_data.id).is_none());
}

#[test]
fn live_copy_applies_two_changes() {
    let source = live_master_store();
    let destination = fake_store();

    let updated = live_copy(&source, &destination, &config()).unwrap();
    assert_eq!(updated.len(), 2);
    assert!(updated.contains(IMAGE_C));
    assert!(updated.contains(IMAGE_D));

    assert_eq!(
        destination.record(IMAGE_C).unwrap().status,
        ImageStatus::Deleted
    );
    assert_eq!(
        destination.payload(IMAGE_D).unwrap(),
        source.payload(IMAGE_D).unwrap()
    );
    assert_eq!(updated.bytes_transferred, 100);
}

#[test]
fn compare_reports_missing_and_diff() {
    let differences = compare(&live_master_store(), &fake_store(), &config()).unwrap();

    assert_eq!(differences.get(IMAGE_D), Some(Difference::Missing));
    assert_eq!(differences.get(IMAGE_C), Some(Difference::Diff));
    assert_eq!(differences.get(IMAGE_A), None);
    assert_eq!(differences.get(IMAGE_B), None);
}

#[test]
fn compare_is_read_only_and_repeatable() {
    let source = live_master_store();
    let destination = fake_store();

    let first = compare(&source, &destination, &config()).unwrap();
    let second = compare(&source, &destination, &config()).unwrap();
    assert_eq!(first.differences, second.differences);
    assert_eq!(source.counts().writes, 0);
    assert_eq!(destination.counts().writes, 0);
}

#[test]
fn live_copy_then_compare_finds_nothing() {
    let source = live_master_store();
    let destination = fake_store();

    live_copy(&source, &destination, &config()).unwrap();
    assert!(compare(&source, &destination, &config()).unwrap().is_empty());

    let again = live_copy(&source, &destination, &config()).unwrap();
    assert!(again.is_empty());
}

#[test]
fn dump_then_load_reproduces_images() {
    let source = store_with(vec![
        ImageRecord::new("A", ImageStatus::Active, 100),
        ImageRecord::new("B", ImageStatus::Deleted, 200),
    ]);
    let dir = tempfile::TempDir::new().unwrap();
    let snapshot = SnapshotStore::create(dir.path()).unwrap();
    dump(&source, &snapshot, &config()).unwrap();

    let destination = MemoryImageStore::new();
    let loaded = load(&snapshot, &destination, &config()).unwrap();
    assert_eq!(loaded.created(), 2);

    assert_eq!(destination.payload("A").unwrap(), source.payload("A").unwrap());
    assert_eq!(destination.record("B").unwrap().size, 200);
    assert!(destination.payload("B").is_none());

    let differences = compare(&source, &destination, &config()).unwrap();
    assert_eq!(differences.get("A"), None);
    assert!(differences.is_empty());
}

#[test]
fn metadata_only_dump_cannot_recreate_active_images() {
    let dir = tempfile::TempDir::new().unwrap();
    let snapshot = SnapshotStore::create(dir.path()).unwrap();
    dump(&fake_store(), &snapshot, &config().with_metadata_only(true)).unwrap();

    let destination = MemoryImageStore::new();
    let loaded = load(&snapshot, &destination, &config()).unwrap();
    assert!(loaded.contains(IMAGE_B));
    assert_eq!(loaded.skipped.len(), 2);
    assert_eq!(destination.len(), 1);
}

#[test]
fn transient_failures_are_retried() {
    let source = live_master_store();
    source.fail(Operation::List, None, 503, 2);
    source.fail(Operation::GetImage, Some(IMAGE_D), 502, 1);
    let destination = fake_store();
    destination.fail(Operation::AddImage, Some(IMAGE_D), 503, 2);

    let updated = live_copy(&source, &destination, &config()).unwrap();
    assert_eq!(updated.len(), 2);
    assert!(updated.failed.is_empty());
    assert!(destination.payload(IMAGE_D).is_some());
}

#[test]
fn persistent_failures_are_recorded_per_image() {
    let source = live_master_store();
    let destination = fake_store();
    destination.fail(Operation::AddImage, Some(IMAGE_D), 500, 10);

    let updated = live_copy(&source, &destination, &config()).unwrap();
    assert!(updated.contains(IMAGE_C));
    assert!(!updated.contains(IMAGE_D));
    assert_eq!(updated.failed.len(), 1);
    assert_eq!(updated.failed[0].id, IMAGE_D);
}

#[test]
fn authentication_failure_aborts_the_run() {
    let source = live_master_store();
    let destination = fake_store();
    destination.fail(Operation::AddMeta, None, 401, 1);

    let err = live_copy(&source, &destination, &config()).unwrap_err();
    assert!(err.is_fatal());
    assert!(destination.payload(IMAGE_D).is_none());

    let source = fake_store();
    source.fail(Operation::List, None, 403, 1);
    assert!(matches!(
        size(&source, &config()),
        Err(EngineError::Client(_))
    ));
}

#[test]
fn existing_image_on_create_is_not_an_error() {
    let source = live_master_store();
    let destination = fake_store();
    destination.fail(Operation::AddImage, Some(IMAGE_D), 409, 1);

    let updated = live_copy(&source, &destination, &config()).unwrap();
    assert!(!updated.contains(IMAGE_D));
    assert!(updated.failed.is_empty());
}

#[test]
fn list_filter_limits_the_run() {
    let source = MemoryImageStore::new();
    source.insert(
        ImageRecord::new("pub", ImageStatus::Deleted, 1).with_attribute("is_public", true),
        None::<Vec<u8>>,
    );
    source.insert(
        ImageRecord::new("priv", ImageStatus::Deleted, 1).with_attribute("is_public", false),
        None::<Vec<u8>>,
    );
    let destination = MemoryImageStore::new();

    let config = config().with_list_filter(ListFilter::public(true));
    let updated = live_copy(&source, &destination, &config).unwrap();
    assert!(updated.contains("pub"));
    assert!(!updated.contains("priv"));
    assert_eq!(
        destination
            .list_images(ListFilter::all())
            .map(|r| r.unwrap().id)
            .collect::<Vec<_>>(),
        vec!["pub"]
    );
}

#[test]
fn zero_chunk_size_is_rejected_before_any_request() {
    let store = fake_store();
    let err = size(&store, &config().with_chunk_size(0)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidArgument(_)));
    assert_eq!(store.counts().reads, 0);
}

#[test]
fn fully_populated_image_copies_without_excluded_attributes() {
    let mut record = active_image_record();
    record.size = 64;
    let source = store_with(vec![record.clone()]);
    let destination = MemoryImageStore::new();
    let config = config().with_excluded(ExcludedAttributes::default());

    let copied = live_copy(&source, &destination, &config).unwrap();
    assert!(copied.contains(&record.id));

    let stored = destination.record(&record.id).unwrap();
    for excluded in ["created_at", "updated_at", "deleted_at"] {
        assert!(stored.attribute(excluded).is_none(), "{excluded} was replicated");
    }
    assert_eq!(stored.attribute("checksum"), record.attribute("checksum"));
    assert_eq!(
        destination.payload(&record.id).unwrap().as_ref(),
        payload_for(&record).as_slice()
    );

    assert!(compare(&source, &destination, &config).unwrap().is_empty());
}

proptest! {
    #[test]
    fn identical_records_need_no_action(record in record_strategy()) {
        let excluded = ExcludedAttributes::default();
        prop_assert!(!records_differ(&record, &record, &excluded));
        prop_assert_eq!(decide(&record, Some(&record), &excluded, true), SyncAction::NoOp);
    }

    #[test]
    fn absent_destination_always_needs_a_write_or_skip(record in record_strategy()) {
        let action = decide(&record, None, &ExcludedAttributes::none(), false);
        prop_assert!(!matches!(action, SyncAction::NoOp | SyncAction::Update { .. }), "unexpected action: {:?}", action);
    }
}
