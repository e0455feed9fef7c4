//! # imagesync testkit
//!
//! Test utilities for imagesync.
//!
//! This crate provides:
//! - Fixture image sets and populated in-memory stores
//! - Hand-written snapshot directories, junk files included
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use imagesync_testkit::prelude::*;
//!
//! #[test]
//! fn survey() {
//!     let store = fake_store();
//!     // ... run a replication mode against it
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
