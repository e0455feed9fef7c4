//! Property-based test generators using proptest.

use imagesync_codec::{ImageRecord, ImageStatus, PROPERTY_PREFIX};
use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;

/// Strategy for generating UUID-shaped image ids.
pub fn image_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("Invalid regex")
}

/// Strategy for generating image statuses, unknown ones included.
pub fn image_status_strategy() -> impl Strategy<Value = ImageStatus> {
    prop_oneof![
        Just(ImageStatus::Queued),
        Just(ImageStatus::Saving),
        Just(ImageStatus::Active),
        Just(ImageStatus::Killed),
        Just(ImageStatus::Deleted),
        Just(ImageStatus::PendingDelete),
        "[a-z]{3,10}".prop_map(ImageStatus::from),
    ]
}

/// Strategy for generating attribute names that do not collide with the
/// typed fields.
pub fn attribute_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}")
        .expect("Invalid regex")
        .prop_filter("Attribute name must not be reserved", |name| {
            !matches!(name.as_str(), "id" | "status" | "size" | "properties")
                && !name.starts_with(PROPERTY_PREFIX)
        })
}

/// Strategy for generating JSON scalars as a listing would deliver them.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        "[ -~]{0,24}".prop_map(Value::String),
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

fn attributes(values: BoxedStrategy<Value>) -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(attribute_name_strategy(), values, 0..8)
}

/// Strategy for generating records whose attributes and properties are all
/// strings. These survive a header round trip unchanged.
pub fn string_record_strategy() -> impl Strategy<Value = ImageRecord> {
    let strings = "[ -~]{0,24}".prop_map(Value::String).boxed();
    (
        image_id_strategy(),
        image_status_strategy(),
        any::<u64>(),
        attributes(strings.clone()),
        attributes(strings),
    )
        .prop_map(|(id, status, size, attributes, properties)| ImageRecord {
            id,
            status,
            size,
            properties,
            attributes,
        })
}

/// Strategy for generating records with mixed scalar values.
pub fn record_strategy() -> impl Strategy<Value = ImageRecord> {
    (
        image_id_strategy(),
        image_status_strategy(),
        any::<u64>(),
        attributes(scalar_strategy().boxed()),
        attributes(scalar_strategy().boxed()),
    )
        .prop_map(|(id, status, size, attributes, properties)| ImageRecord {
            id,
            status,
            size,
            properties,
            attributes,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_ids_are_uuid_shaped(id in image_id_strategy()) {
            prop_assert_eq!(id.len(), 36);
            prop_assert_eq!(id.matches('-').count(), 4);
        }

        #[test]
        fn generated_records_parse_back(record in record_strategy()) {
            let json = record.to_json().unwrap();
            prop_assert_eq!(ImageRecord::from_json(&json).unwrap().id, record.id);
        }
    }
}
