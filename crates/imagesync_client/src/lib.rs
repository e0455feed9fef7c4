//! # imagesync client
//!
//! Image-store clients for imagesync.
//!
//! This crate provides:
//! - The [`ImageStore`] trait: list / get-meta / get / add-meta / add / update
//! - Marker-based pagination as an explicit iterator ([`ImageListing`])
//! - [`HttpImageStore`], speaking the v1 image API over an [`HttpClient`]
//! - [`ReqwestClient`], a blocking `reqwest` implementation of [`HttpClient`]
//! - [`MemoryImageStore`], an in-memory store for tests
//!
//! ## Error Taxonomy
//!
//! | HTTP status | error |
//! |---|---|
//! | 401, 403 | [`ClientError::Authentication`] |
//! | 409 | [`ClientError::ImageAlreadyPresent`] |
//! | 400, 5xx, anything else | [`ClientError::ServerError`] |
//!
//! Uploads that succeed at the HTTP level but describe no image fail with
//! [`ClientError::Upload`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod http;
mod memory;
mod reqwest_client;
mod store;

pub use error::{ClientError, ClientResult};
pub use http::{
    HttpClient, HttpImageStore, HttpRequest, HttpResponse, Method, RequestBody, AUTH_TOKEN_HEADER,
};
pub use memory::{MemoryImageStore, Operation, RequestCounts};
pub use reqwest_client::ReqwestClient;
pub use store::{
    ImageDownload, ImageListing, ImagePage, ImagePayload, ImageStore, ImageStream, ListFilter,
    UploadResponse,
};
