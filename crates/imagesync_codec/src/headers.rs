//! `x-image-meta-*` header codec.
//!
//! The v1 image API carries image metadata in HTTP headers. A top-level
//! attribute `k` travels as `x-image-meta-k`; a nested property `k` travels
//! as `x-image-meta-property-k`.
//!
//! ## Null properties
//!
//! A null value is sent as an empty header and comes back as the empty
//! string, never as null. Stores in the wild depend on this, so decoding
//! does not try to reconstruct nulls.

use crate::error::{CodecError, CodecResult};
use crate::record::{ImageRecord, ImageStatus};
use serde_json::Value;
use std::collections::BTreeMap;

/// Prefix shared by all metadata headers.
pub const META_PREFIX: &str = "x-image-meta-";

/// Prefix (after [`META_PREFIX`]) marking a nested property.
pub const PROPERTY_PREFIX: &str = "property-";

/// Header name to value, names lower-case.
pub type WireHeaders = BTreeMap<String, String>;

/// Flattens a record into metadata headers.
pub fn encode(record: &ImageRecord) -> WireHeaders {
    record
        .fields()
        .into_iter()
        .map(|(key, value)| (meta_header(&key), value))
        .collect()
}

/// Rebuilds a record from metadata headers.
///
/// Headers without the metadata prefix are ignored. `id`, `status` and
/// `size` must be present, and `size` must be an unsigned integer.
pub fn decode(headers: &WireHeaders) -> CodecResult<ImageRecord> {
    let mut id = None;
    let mut status = None;
    let mut size = None;
    let mut attributes = BTreeMap::new();
    let mut properties = BTreeMap::new();

    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        let Some(key) = name.strip_prefix(META_PREFIX) else {
            continue;
        };

        if let Some(property) = key.strip_prefix(PROPERTY_PREFIX) {
            properties.insert(property.to_string(), Value::String(value.clone()));
            continue;
        }

        match key {
            "id" => id = Some(value.clone()),
            "status" => status = Some(ImageStatus::from(value.as_str())),
            "size" => {
                let parsed = value.trim().parse::<u64>().map_err(|_| {
                    CodecError::invalid_field("size", format!("not an unsigned integer: {value:?}"))
                })?;
                size = Some(parsed);
            }
            _ => {
                attributes.insert(key.to_string(), Value::String(value.clone()));
            }
        }
    }

    let id = id.ok_or_else(|| CodecError::missing_field("id"))?;
    if id.is_empty() {
        return Err(CodecError::invalid_field("id", "must not be empty"));
    }

    Ok(ImageRecord {
        id,
        status: status.ok_or_else(|| CodecError::missing_field("status"))?,
        size: size.ok_or_else(|| CodecError::missing_field("size"))?,
        properties,
        attributes,
    })
}

/// Returns the header name carrying attribute `key`.
pub fn meta_header(key: &str) -> String {
    format!("{META_PREFIX}{}", key.to_ascii_lowercase())
}

/// Renders a JSON scalar the way the v1 API spells it in a header.
///
/// Booleans use the API's `True`/`False` spelling so that listing entries
/// and HEAD responses agree.
pub fn wire_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
