//! Image metadata records.

use crate::error::{CodecError, CodecResult};
use crate::headers::{wire_value, PROPERTY_PREFIX};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Fields every record must carry.
const REQUIRED_FIELDS: [&str; 3] = ["id", "status", "size"];

/// Lifecycle status of an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageStatus {
    /// Registered, no data uploaded yet.
    Queued,
    /// Data upload in progress.
    Saving,
    /// Data available.
    Active,
    /// Upload failed.
    Killed,
    /// Removed from the store.
    Deleted,
    /// Scheduled for removal.
    PendingDelete,
    /// Any status this crate does not know about.
    Other(String),
}

impl ImageStatus {
    /// Returns the wire spelling of the status.
    pub fn as_str(&self) -> &str {
        match self {
            ImageStatus::Queued => "queued",
            ImageStatus::Saving => "saving",
            ImageStatus::Active => "active",
            ImageStatus::Killed => "killed",
            ImageStatus::Deleted => "deleted",
            ImageStatus::PendingDelete => "pending_delete",
            ImageStatus::Other(s) => s,
        }
    }

    /// Returns true if the image data can be downloaded.
    pub fn is_active(&self) -> bool {
        matches!(self, ImageStatus::Active)
    }
}

impl From<&str> for ImageStatus {
    fn from(s: &str) -> Self {
        match s {
            "queued" => ImageStatus::Queued,
            "saving" => ImageStatus::Saving,
            "active" => ImageStatus::Active,
            "killed" => ImageStatus::Killed,
            "deleted" => ImageStatus::Deleted,
            "pending_delete" => ImageStatus::PendingDelete,
            other => ImageStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for ImageStatus {
    fn from(s: String) -> Self {
        ImageStatus::from(s.as_str())
    }
}

impl From<ImageStatus> for String {
    fn from(status: ImageStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for a single image.
///
/// `id`, `status` and `size` are typed; every other attribute is kept as the
/// JSON scalar the store delivered. Nested `properties` are kept apart so the
/// header codec can give them their own prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Unique image identifier.
    pub id: String,
    /// Lifecycle status.
    pub status: ImageStatus,
    /// Payload size in bytes.
    #[serde(deserialize_with = "deserialize_size")]
    pub size: u64,
    /// Free-form image properties.
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub properties: BTreeMap<String, Value>,
    /// All remaining top-level attributes.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl ImageRecord {
    /// Creates a record with no extra attributes.
    pub fn new(id: impl Into<String>, status: impl Into<ImageStatus>, size: u64) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
            size,
            properties: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    /// Sets a top-level attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets a nested property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns true if the image data can be downloaded.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Looks up a top-level attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Returns the record as flat string fields, the form used on the wire
    /// and for comparisons.
    ///
    /// Properties appear as `property-<name>`. Null values become `""`.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        for (key, value) in &self.attributes {
            fields.insert(key.clone(), wire_value(value));
        }
        for (key, value) in &self.properties {
            fields.insert(format!("{PROPERTY_PREFIX}{key}"), wire_value(value));
        }
        fields.insert("id".to_string(), self.id.clone());
        fields.insert("status".to_string(), self.status.to_string());
        fields.insert("size".to_string(), self.size.to_string());
        fields
    }

    /// Returns a copy with the named attributes removed.
    ///
    /// `property-<name>` removes a nested property. The required fields
    /// cannot be removed and are ignored if named.
    pub fn without_attributes<'a, I>(&self, names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut record = self.clone();
        for name in names {
            if let Some(property) = name.strip_prefix(PROPERTY_PREFIX) {
                record.properties.remove(property);
            } else {
                record.attributes.remove(name);
            }
        }
        record
    }

    /// Parses a record from a JSON document.
    pub fn from_json(bytes: &[u8]) -> CodecResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Builds a record from an already-parsed JSON value.
    ///
    /// The value must be an object carrying `id`, `status` and `size`.
    pub fn from_value(value: Value) -> CodecResult<Self> {
        let object = value.as_object().ok_or(CodecError::NotAnObject)?;
        for field in REQUIRED_FIELDS {
            if object.get(field).map_or(true, Value::is_null) {
                return Err(CodecError::missing_field(field));
            }
        }

        let record: ImageRecord = serde_json::from_value(value)
            .map_err(|e| CodecError::decoding_failed(e.to_string()))?;
        if record.id.is_empty() {
            return Err(CodecError::invalid_field("id", "must not be empty"));
        }
        Ok(record)
    }

    /// Serializes the record as pretty-printed JSON.
    pub fn to_json(&self) -> CodecResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| CodecError::encoding_failed(e.to_string()))
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("size must be a non-negative integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("size must be numeric, got {s:?}"))),
        other => Err(D::Error::custom(format!("size must be numeric, got {other}"))),
    }
}

fn deserialize_properties<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(BTreeMap::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(D::Error::custom(format!(
            "properties must be an object, got {other}"
        ))),
    }
}
