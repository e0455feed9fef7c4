//! Change detection.
//!
//! Records are compared in their flat wire form (see
//! [`ImageRecord::fields`]), so a record parsed from listing JSON and one
//! decoded from HEAD headers compare equal when they describe the same image.

use crate::config::ExcludedAttributes;
use imagesync_client::{ClientError, ClientResult, ImageStore, ListFilter};
use imagesync_codec::ImageRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Returns true if some key of `a` is missing from `b` or maps to a
/// different value there.
///
/// Keys present only in `b` never count.
pub fn dict_diff<K: Ord, V: PartialEq>(a: &BTreeMap<K, V>, b: &BTreeMap<K, V>) -> bool {
    a.iter().any(|(key, value)| b.get(key) != Some(value))
}

/// Returns true if `id` shows up in a full listing of `store`.
///
/// Costs a complete enumeration; runs that check many ids should build a
/// [`DestinationIndex`] once instead.
pub fn is_image_present<S: ImageStore>(store: &S, id: &str) -> ClientResult<bool> {
    for record in store.list_images(ListFilter::all()) {
        if record?.id == id {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Returns true if the destination is behind the source.
pub fn records_differ(
    source: &ImageRecord,
    destination: &ImageRecord,
    excluded: &ExcludedAttributes,
) -> bool {
    dict_diff(
        &excluded.strip(source).fields(),
        &excluded.strip(destination).fields(),
    )
}

/// One field on which two records disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDifference {
    /// Flat field name (`property-<name>` for properties).
    pub field: String,
    /// Value on the source.
    pub source: String,
    /// Value on the destination, `None` if absent there.
    pub destination: Option<String>,
}

/// Lists the fields that make `records_differ` true.
pub fn field_differences(
    source: &ImageRecord,
    destination: &ImageRecord,
    excluded: &ExcludedAttributes,
) -> Vec<FieldDifference> {
    let source = excluded.strip(source).fields();
    let destination = excluded.strip(destination).fields();
    source
        .into_iter()
        .filter_map(|(field, value)| {
            let theirs = destination.get(&field);
            (theirs != Some(&value)).then(|| FieldDifference {
                source: value,
                destination: theirs.cloned(),
                field,
            })
        })
        .collect()
}

/// Why an image was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Active image absent from the destination, with no data to upload.
    MissingPayload,
}

impl SkipReason {
    /// Short description for logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingPayload => "active image has no payload to upload",
        }
    }
}

/// What to do with one source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Register the image on the destination.
    Create {
        /// Upload the payload along with the metadata.
        with_payload: bool,
    },
    /// Replace the destination's metadata.
    Update {
        /// Also upload the payload the destination lacks.
        with_payload: bool,
    },
    /// Leave the image alone.
    Skip(SkipReason),
    /// The destination is up to date.
    NoOp,
}

/// Decides how to bring the destination in line with `source`.
///
/// `payload_available` tells whether the source's data can be uploaded.
pub fn decide(
    source: &ImageRecord,
    destination: Option<&ImageRecord>,
    excluded: &ExcludedAttributes,
    payload_available: bool,
) -> SyncAction {
    let Some(destination) = destination else {
        if payload_available {
            return SyncAction::Create { with_payload: true };
        }
        if !source.is_active() {
            return SyncAction::Create {
                with_payload: false,
            };
        }
        return SyncAction::Skip(SkipReason::MissingPayload);
    };

    if !records_differ(source, destination, excluded) {
        return SyncAction::NoOp;
    }

    SyncAction::Update {
        with_payload: payload_available
            && source.is_active()
            && destination.status == imagesync_codec::ImageStatus::Queued,
    }
}

/// The ids present on a destination store, taken from one listing.
#[derive(Debug, Clone, Default)]
pub struct DestinationIndex {
    ids: HashSet<String>,
}

impl DestinationIndex {
    /// Lists `store` once and remembers every id.
    pub fn build<S: ImageStore>(store: &S) -> ClientResult<Self> {
        let mut ids = HashSet::new();
        for record in store.list_images(ListFilter::all()) {
            ids.insert(record?.id);
        }
        Ok(Self { ids })
    }

    /// Returns true if `id` was listed.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of listed images.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the destination listed nothing.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Fetches the destination's record for `id`, `None` if it has none.
    ///
    /// An image that disappeared since the listing (404) counts as absent.
    pub fn fetch<S: ImageStore>(&self, store: &S, id: &str) -> ClientResult<Option<ImageRecord>> {
        if !self.contains(id) {
            return Ok(None);
        }
        match store.get_image_meta(id) {
            Ok(record) => Ok(Some(record)),
            Err(ClientError::ServerError { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagesync_client::MemoryImageStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn map(pairs: &[(&str, i32)]) -> BTreeMap<String, i32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn dict_diff_only_looks_at_first_map() {
        let a = map(&[("a", 1), ("b", 2), ("c", 3)]);
        let b = map(&[("a", 1), ("b", 2)]);
        let c = map(&[("a", 1), ("b", 1), ("c", 3)]);
        let d = map(&[("a", 1), ("b", 2), ("c", 3), ("d", 4)]);

        assert!(!dict_diff(&a, &a));
        assert!(dict_diff(&a, &b));
        assert!(dict_diff(&a, &c));
        assert!(!dict_diff(&a, &d));
    }

    #[test]
    fn image_presence() {
        let store = MemoryImageStore::new().with_page_size(1);
        store.insert(ImageRecord::new("a", "active", 1), None::<Vec<u8>>);
        store.insert(ImageRecord::new("b", "queued", 0), None::<Vec<u8>>);

        assert!(is_image_present(&store, "b").unwrap());
        assert!(!is_image_present(&store, "zzz").unwrap());
    }

    #[test]
    fn listing_json_and_headers_compare_equal() {
        let from_listing = ImageRecord::from_value(json!({
            "id": "a", "status": "active", "size": 10,
            "is_public": false, "min_ram": 0, "checksum": null,
            "properties": {"kernel_id": null}
        }))
        .unwrap();
        let from_headers = imagesync_codec::decode(&imagesync_codec::encode(&from_listing)).unwrap();

        assert!(!records_differ(&from_listing, &from_headers, &ExcludedAttributes::none()));
    }

    #[test]
    fn excluded_attributes_do_not_count() {
        let source = ImageRecord::new("a", "active", 1).with_attribute("dontrepl", "new");
        let destination = ImageRecord::new("a", "active", 1).with_attribute("dontrepl", "old");

        assert!(records_differ(&source, &destination, &ExcludedAttributes::none()));
        assert!(!records_differ(
            &source,
            &destination,
            &ExcludedAttributes::parse("dontrepl")
        ));
    }

    #[test]
    fn field_differences_name_each_field() {
        let source = ImageRecord::new("a", "deleted", 1).with_attribute("extra", "x");
        let destination = ImageRecord::new("a", "active", 1);

        let differences = field_differences(&source, &destination, &ExcludedAttributes::none());
        assert_eq!(
            differences,
            vec![
                FieldDifference {
                    field: "extra".into(),
                    source: "x".into(),
                    destination: None,
                },
                FieldDifference {
                    field: "status".into(),
                    source: "deleted".into(),
                    destination: Some("active".into()),
                },
            ]
        );
    }

    #[test]
    fn decide_for_absent_destination() {
        let excluded = ExcludedAttributes::none();
        let active = ImageRecord::new("a", "active", 1);
        let deleted = ImageRecord::new("b", "deleted", 1);

        assert_eq!(
            decide(&active, None, &excluded, true),
            SyncAction::Create { with_payload: true }
        );
        assert_eq!(
            decide(&active, None, &excluded, false),
            SyncAction::Skip(SkipReason::MissingPayload)
        );
        assert_eq!(
            decide(&deleted, None, &excluded, false),
            SyncAction::Create {
                with_payload: false
            }
        );
    }

    #[test]
    fn decide_for_present_destination() {
        let excluded = ExcludedAttributes::parse("dontrepl");
        let source = ImageRecord::new("a", "active", 1).with_attribute("dontrepl", "x");

        let same = ImageRecord::new("a", "active", 1).with_attribute("dontrepl", "y");
        assert_eq!(decide(&source, Some(&same), &excluded, true), SyncAction::NoOp);

        let behind = ImageRecord::new("a", "active", 2);
        assert_eq!(
            decide(&source, Some(&behind), &excluded, true),
            SyncAction::Update {
                with_payload: false
            }
        );

        let queued = ImageRecord::new("a", "queued", 1);
        assert_eq!(
            decide(&source, Some(&queued), &excluded, true),
            SyncAction::Update { with_payload: true }
        );
        assert_eq!(
            decide(&source, Some(&queued), &excluded, false),
            SyncAction::Update {
                with_payload: false
            }
        );
    }

    #[test]
    fn destination_index_fetch() {
        let store = MemoryImageStore::new();
        store.insert(ImageRecord::new("a", "active", 1), None::<Vec<u8>>);

        let index = DestinationIndex::build(&store).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.fetch(&store, "a").unwrap().unwrap().id, "a");
        assert!(index.fetch(&store, "b").unwrap().is_none());
    }

    proptest! {
        #[test]
        fn dict_diff_is_false_on_self(a in prop::collection::btree_map("[a-z]{1,4}", any::<i32>(), 0..8)) {
            prop_assert!(!dict_diff(&a, &a));
        }

        #[test]
        fn extra_keys_in_second_map_never_count(
            a in prop::collection::btree_map("[a-z]{1,4}", any::<i32>(), 0..8),
            extra in prop::collection::btree_map("[A-Z]{1,4}", any::<i32>(), 0..8),
        ) {
            let mut b = a.clone();
            b.extend(extra);
            prop_assert!(!dict_diff(&a, &b));
        }
    }
}
