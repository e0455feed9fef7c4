//! Image-store abstraction.

use crate::error::{ClientError, ClientResult};
use imagesync_codec::{decode, ImageRecord, WireHeaders, META_PREFIX};
use serde::Deserialize;
use std::fmt;
use std::io::{Cursor, Read};

/// An unread byte stream, such as a response body.
///
/// Dropping the stream closes the underlying response.
pub type ImageStream = Box<dyn Read + Send>;

/// An image payload being downloaded by [`ImageStore::get_image`].
pub struct ImageDownload {
    reader: ImageStream,
    content_length: Option<u64>,
}

impl ImageDownload {
    /// Wraps a payload reader and the length the store announced for it.
    pub fn new(reader: impl Read + Send + 'static, content_length: Option<u64>) -> Self {
        Self {
            reader: Box::new(reader),
            content_length,
        }
    }

    /// Length announced by the store, if any.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Turns the download into an upload payload.
    ///
    /// The announced length wins; `fallback` is used when there is none.
    pub fn into_payload(self, fallback: u64) -> ImagePayload {
        ImagePayload {
            length: self.content_length.unwrap_or(fallback),
            reader: self.reader,
        }
    }
}

impl Read for ImageDownload {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for ImageDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageDownload")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// An image store reachable through the v1 image API.
///
/// Implementations perform one request/response exchange per call and
/// map failures onto [`ClientError`]. Deciding whether a failure aborts a
/// run is left to the caller.
pub trait ImageStore: Send + Sync {
    /// Fetches one page of image details, starting after `marker`.
    fn list_page(&self, filter: &ListFilter, marker: Option<&str>) -> ClientResult<ImagePage>;

    /// Fetches the metadata of one image without its data.
    fn get_image_meta(&self, id: &str) -> ClientResult<ImageRecord>;

    /// Opens the payload of one image.
    fn get_image(&self, id: &str) -> ClientResult<ImageDownload>;

    /// Registers or replaces metadata only.
    fn add_image_meta(&self, record: &ImageRecord) -> ClientResult<UploadResponse>;

    /// Creates an image with its data in one request.
    fn add_image(&self, record: &ImageRecord, payload: ImagePayload)
        -> ClientResult<UploadResponse>;

    /// Replaces the metadata of an existing image and uploads its data.
    fn update_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse>;

    /// Lazily enumerates every image, one page at a time.
    fn list_images(&self, filter: ListFilter) -> ImageListing<'_, Self>
    where
        Self: Sized,
    {
        ImageListing::new(self, filter)
    }
}

impl<S: ImageStore + ?Sized> ImageStore for &S {
    fn list_page(&self, filter: &ListFilter, marker: Option<&str>) -> ClientResult<ImagePage> {
        (**self).list_page(filter, marker)
    }

    fn get_image_meta(&self, id: &str) -> ClientResult<ImageRecord> {
        (**self).get_image_meta(id)
    }

    fn get_image(&self, id: &str) -> ClientResult<ImageDownload> {
        (**self).get_image(id)
    }

    fn add_image_meta(&self, record: &ImageRecord) -> ClientResult<UploadResponse> {
        (**self).add_image_meta(record)
    }

    fn add_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse> {
        (**self).add_image(record, payload)
    }

    fn update_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse> {
        (**self).update_image(record, payload)
    }
}

/// Visibility filter for listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// `None` lists public and private images alike.
    pub is_public: Option<bool>,
}

impl ListFilter {
    /// Lists public and private images.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts the listing to public (`true`) or private (`false`) images.
    pub fn public(is_public: bool) -> Self {
        Self {
            is_public: Some(is_public),
        }
    }

    /// Value of the `is_public` query parameter.
    pub fn query_value(&self) -> &'static str {
        match self.is_public {
            None => "None",
            Some(true) => "True",
            Some(false) => "False",
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ImagePage {
    /// Well-formed records on the page.
    pub images: Vec<ImageRecord>,
    /// Id of the last entry on the page, well-formed or not.
    ///
    /// `None` means the page was empty and the listing is finished.
    pub last_id: Option<String>,
}

impl ImagePage {
    /// Builds a page whose cursor is the last record.
    pub fn from_records(images: Vec<ImageRecord>) -> Self {
        let last_id = images.last().map(|r| r.id.clone());
        Self { images, last_id }
    }
}

/// Iterator over every image of a store.
///
/// Owns its pagination cursor, so listings of different stores never
/// interfere. Not restartable: call [`ImageStore::list_images`] again for a
/// fresh pass. A failed page fetch is yielded once and ends the iteration.
pub struct ImageListing<'a, S: ImageStore + ?Sized> {
    store: &'a S,
    filter: ListFilter,
    marker: Option<String>,
    page: std::vec::IntoIter<ImageRecord>,
    pages_fetched: usize,
    done: bool,
}

impl<'a, S: ImageStore + ?Sized> ImageListing<'a, S> {
    /// Starts a listing of `store`.
    pub fn new(store: &'a S, filter: ListFilter) -> Self {
        Self {
            store,
            filter,
            marker: None,
            page: Vec::new().into_iter(),
            pages_fetched: 0,
            done: false,
        }
    }

    /// Number of page requests issued so far.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    fn fetch_page(&mut self) -> ClientResult<bool> {
        let page = self.store.list_page(&self.filter, self.marker.as_deref())?;
        self.pages_fetched += 1;

        let Some(last_id) = page.last_id else {
            return Ok(false);
        };
        if self.marker.as_deref() == Some(last_id.as_str()) {
            return Err(ClientError::Protocol(format!(
                "listing did not advance past marker {last_id}"
            )));
        }

        self.marker = Some(last_id);
        self.page = page.images.into_iter();
        Ok(true)
    }
}

impl<S: ImageStore + ?Sized> Iterator for ImageListing<'_, S> {
    type Item = ClientResult<ImageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.page.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.fetch_page() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Image data to upload, with its exact length.
pub struct ImagePayload {
    reader: Box<dyn Read + Send>,
    length: u64,
}

impl ImagePayload {
    /// Wraps a reader that will yield exactly `length` bytes.
    pub fn new(reader: impl Read + Send + 'static, length: u64) -> Self {
        Self {
            reader: Box::new(reader),
            length,
        }
    }

    /// Wraps an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let length = bytes.len() as u64;
        Self::new(Cursor::new(bytes), length)
    }

    /// Number of bytes the payload will yield.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Consumes the payload, returning its reader.
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        self.reader
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// Headers and body of an upload response.
#[derive(Debug, Clone, Default)]
pub struct UploadResponse {
    /// Response headers, names lower-case.
    pub headers: WireHeaders,
    /// Response body.
    pub body: Vec<u8>,
}

#[derive(Deserialize)]
struct UploadBody {
    image: serde_json::Map<String, serde_json::Value>,
}

impl UploadResponse {
    /// Builds a response that describes `record` in its headers.
    pub fn from_record(record: &ImageRecord) -> Self {
        Self {
            headers: imagesync_codec::encode(record),
            body: Vec::new(),
        }
    }

    /// Verifies that the response describes the uploaded image.
    ///
    /// Accepts either a metadata `status` header or a JSON body of the form
    /// `{"image": {...}}`.
    pub fn check(&self) -> ClientResult<()> {
        let status_header = format!("{META_PREFIX}status");
        if self.headers.contains_key(&status_header) {
            return Ok(());
        }
        if serde_json::from_slice::<UploadBody>(&self.body).is_ok() {
            return Ok(());
        }

        let body = String::from_utf8_lossy(&self.body);
        Err(ClientError::Upload(format!(
            "response has no image status header and no image body (body: {:?})",
            body.chars().take(200).collect::<String>()
        )))
    }

    /// Returns the image the store reported back, if it decodes.
    pub fn record(&self) -> Option<ImageRecord> {
        if let Ok(record) = decode(&self.headers) {
            return Some(record);
        }
        let body: UploadBody = serde_json::from_slice(&self.body).ok()?;
        ImageRecord::from_value(serde_json::Value::Object(body.image)).ok()
    }
}
