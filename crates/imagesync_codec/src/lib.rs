//! # imagesync codec
//!
//! Image metadata model and header codec.
//!
//! This crate provides:
//! - [`ImageRecord`] and [`ImageStatus`], the canonical metadata of one image
//! - [`encode`] / [`decode`], the mapping between a record and the
//!   `x-image-meta-*` headers of the v1 image API
//!
//! Everything here is pure: no I/O, no shared state.
//!
//! ## Usage
//!
//! ```
//! use imagesync_codec::{decode, encode, ImageRecord, ImageStatus};
//!
//! let record = ImageRecord::new("6d55dd55", ImageStatus::Active, 4660272)
//!     .with_attribute("owner", "8aef75b5")
//!     .with_property("architecture", "x86_64");
//!
//! let headers = encode(&record);
//! assert_eq!(headers["x-image-meta-property-architecture"], "x86_64");
//! assert_eq!(decode(&headers).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod headers;
mod record;

pub use error::{CodecError, CodecResult};
pub use headers::{decode, encode, meta_header, wire_value, WireHeaders, META_PREFIX, PROPERTY_PREFIX};
pub use record::{ImageRecord, ImageStatus};
