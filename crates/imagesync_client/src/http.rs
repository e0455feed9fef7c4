//! HTTP image store.
//!
//! This module speaks the v1 image API. The actual HTTP client is
//! abstracted via a trait so tests can script responses and production
//! code can use [`ReqwestClient`](crate::ReqwestClient).

use crate::error::{ClientError, ClientResult};
use crate::store::{
    ImageDownload, ImagePage, ImagePayload, ImageStore, ImageStream, ListFilter, UploadResponse,
};
use imagesync_codec::{decode, encode, ImageRecord, WireHeaders};
use parking_lot::RwLock;
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::io::Read;
use tracing::{debug, warn};

/// Header carrying the auth token on every request.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Upper bound on how much of an error or upload body is read.
const MAX_SMALL_BODY: u64 = 1024 * 1024;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// HEAD
    Head,
    /// POST
    Post,
    /// PUT
    Put,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an outgoing request.
#[derive(Debug)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// A streamed body of known length.
    Stream(ImagePayload),
}

/// An outgoing request.
#[derive(Debug)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: RequestBody,
}

/// A response whose body has not been read yet.
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, names lower-case.
    pub headers: WireHeaders,
    /// Unread response body.
    pub body: ImageStream,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport. Only
/// connection-level failures are errors; every received response,
/// whatever its status, is returned as `Ok`.
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response with an unread body.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

#[derive(Deserialize)]
struct ImageListBody {
    images: Vec<serde_json::Value>,
}

/// Image store reached over HTTP.
pub struct HttpImageStore<C: HttpClient> {
    /// Base URL of the store (e.g., "http://glance.example.com:9292").
    base_url: String,
    /// Token sent as `x-auth-token`.
    auth_token: String,
    /// HTTP client implementation.
    client: C,
    /// Last error message.
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpImageStore<C> {
    /// Creates a store client.
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    /// Builds `<base>/<segments...>?<query>`, percent-encoding every part.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> ClientResult<Url> {
        let invalid = || ClientError::Protocol(format!("invalid store URL {}", self.base_url));
        let mut url = Url::parse(&self.base_url).map_err(|_| invalid())?;
        url.path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Sends a request and fails on any non-2xx status.
    fn request(
        &self,
        method: Method,
        url: Url,
        mut headers: Vec<(String, String)>,
        body: RequestBody,
    ) -> ClientResult<HttpResponse> {
        headers.push((AUTH_TOKEN_HEADER.to_string(), self.auth_token.clone()));
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };
        let request = HttpRequest {
            method,
            url: url.into(),
            headers,
            body,
        };

        debug!(%method, target = %target, "image store request");
        let response = self.client.send(request).map_err(|e| {
            self.set_error(&e);
            ClientError::transport_retryable(e)
        })?;

        if !(200..300).contains(&response.status) {
            let status = response.status;
            let detail = read_small_body(response.body).unwrap_or_default();
            let message = if detail.is_empty() {
                format!("{method} {target}")
            } else {
                format!("{method} {target}: {}", String::from_utf8_lossy(&detail).trim())
            };
            self.set_error(&message);
            return Err(ClientError::from_status(status, message));
        }

        self.clear_error();
        Ok(response)
    }

    fn upload(
        &self,
        method: Method,
        url: Url,
        record: &ImageRecord,
        payload: Option<ImagePayload>,
    ) -> ClientResult<UploadResponse> {
        let mut headers: Vec<(String, String)> = encode(record).into_iter().collect();
        headers.push((
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        ));
        let body = match payload {
            Some(payload) => {
                headers.push(("content-length".to_string(), payload.length().to_string()));
                RequestBody::Stream(payload)
            }
            None => RequestBody::Empty,
        };

        let response = self.request(method, url, headers, body)?;
        let upload = UploadResponse {
            headers: response.headers,
            body: read_small_body(response.body)?,
        };
        upload.check()?;
        Ok(upload)
    }
}

impl<C: HttpClient> ImageStore for HttpImageStore<C> {
    fn list_page(&self, filter: &ListFilter, marker: Option<&str>) -> ClientResult<ImagePage> {
        let mut query = Vec::with_capacity(2);
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }
        query.push(("is_public", filter.query_value()));
        let url = self.url(&["v1", "images", "detail"], &query)?;

        let mut response = self.request(Method::Get, url, Vec::new(), RequestBody::Empty)?;
        let mut body = Vec::new();
        response.body.read_to_end(&mut body)?;
        let listing: ImageListBody = serde_json::from_slice(&body)
            .map_err(|e| ClientError::Protocol(format!("invalid image listing: {e}")))?;

        let last_id = listing
            .images
            .iter()
            .rev()
            .find_map(|image| image.get("id")?.as_str().map(str::to_string));
        if last_id.is_none() && !listing.images.is_empty() {
            return Err(ClientError::Protocol(
                "image listing page has no entry with an id".into(),
            ));
        }

        let mut images = Vec::with_capacity(listing.images.len());
        for entry in listing.images {
            match ImageRecord::from_value(entry) {
                Ok(record) => images.push(record),
                Err(e) => warn!(error = %e, "skipping malformed listing entry"),
            }
        }
        Ok(ImagePage { images, last_id })
    }

    fn get_image_meta(&self, id: &str) -> ClientResult<ImageRecord> {
        let url = self.url(&["v1", "images", id], &[])?;
        let response = self.request(Method::Head, url, Vec::new(), RequestBody::Empty)?;
        Ok(decode(&response.headers)?)
    }

    fn get_image(&self, id: &str) -> ClientResult<ImageDownload> {
        let url = self.url(&["v1", "images", id], &[])?;
        let response = self.request(Method::Get, url, Vec::new(), RequestBody::Empty)?;
        let content_length = response
            .headers
            .get("content-length")
            .and_then(|v| v.trim().parse().ok());
        Ok(ImageDownload::new(response.body, content_length))
    }

    fn add_image_meta(&self, record: &ImageRecord) -> ClientResult<UploadResponse> {
        let url = self.url(&["v1", "images", record.id.as_str()], &[])?;
        self.upload(Method::Put, url, record, None)
    }

    fn add_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse> {
        let url = self.url(&["v1", "images"], &[])?;
        self.upload(Method::Post, url, record, Some(payload))
    }

    fn update_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse> {
        let url = self.url(&["v1", "images", record.id.as_str()], &[])?;
        self.upload(Method::Put, url, record, Some(payload))
    }
}

fn read_small_body(body: ImageStream) -> ClientResult<Vec<u8>> {
    let mut buf = Vec::new();
    body.take(MAX_SMALL_BODY).read_to_end(&mut buf)?;
    Ok(buf)
}
