//! In-memory image store.
//!
//! Behaves like a v1 image API endpoint without a network: listings are
//! paginated by marker, metadata goes through the header codec, and
//! conflicting creates fail with [`ClientError::ImageAlreadyPresent`].
//! Failures can be injected per operation to exercise retry and skip paths.

use crate::error::{ClientError, ClientResult};
use crate::store::{
    ImageDownload, ImagePage, ImagePayload, ImageStore, ListFilter, UploadResponse,
};
use bytes::Bytes;
use imagesync_codec::{decode, encode, wire_value, ImageRecord};
use parking_lot::{Mutex, RwLock};
use std::io::{Cursor, Read};

/// Default number of images per listing page.
const DEFAULT_PAGE_SIZE: usize = 25;

/// Store operations, for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `list_page`
    List,
    /// `get_image_meta`
    GetMeta,
    /// `get_image`
    GetImage,
    /// `add_image_meta`
    AddMeta,
    /// `add_image`
    AddImage,
    /// `update_image`
    UpdateImage,
}

impl Operation {
    fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::AddMeta | Operation::AddImage | Operation::UpdateImage
        )
    }
}

/// Requests served so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    /// Listing pages, HEADs and GETs.
    pub reads: usize,
    /// Creates and updates.
    pub writes: usize,
}

#[derive(Debug, Clone)]
struct StoredImage {
    record: ImageRecord,
    payload: Option<Bytes>,
}

#[derive(Debug)]
struct InjectedFailure {
    operation: Operation,
    id: Option<String>,
    status: u16,
    remaining: usize,
}

/// An image store held in memory.
#[derive(Debug)]
pub struct MemoryImageStore {
    images: RwLock<Vec<StoredImage>>,
    page_size: usize,
    failures: Mutex<Vec<InjectedFailure>>,
    counts: Mutex<RequestCounts>,
}

impl MemoryImageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            images: RwLock::new(Vec::new()),
            page_size: DEFAULT_PAGE_SIZE,
            failures: Mutex::new(Vec::new()),
            counts: Mutex::new(RequestCounts::default()),
        }
    }

    /// Sets the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Adds or replaces an image directly, bypassing request accounting.
    pub fn insert(&self, record: ImageRecord, payload: Option<impl Into<Bytes>>) {
        let payload = payload.map(Into::into);
        let mut images = self.images.write();
        match images.iter_mut().find(|s| s.record.id == record.id) {
            Some(stored) => {
                stored.record = record;
                stored.payload = payload;
            }
            None => images.push(StoredImage { record, payload }),
        }
    }

    /// Returns the stored record for `id`.
    pub fn record(&self, id: &str) -> Option<ImageRecord> {
        self.find(id).map(|s| s.record)
    }

    /// Returns the stored payload for `id`.
    pub fn payload(&self, id: &str) -> Option<Bytes> {
        self.find(id).and_then(|s| s.payload)
    }

    /// Returns every stored record in listing order.
    pub fn records(&self) -> Vec<ImageRecord> {
        self.images.read().iter().map(|s| s.record.clone()).collect()
    }

    /// Number of stored images.
    pub fn len(&self) -> usize {
        self.images.read().len()
    }

    /// Returns true if the store holds no images.
    pub fn is_empty(&self) -> bool {
        self.images.read().is_empty()
    }

    /// Returns the requests served so far.
    pub fn counts(&self) -> RequestCounts {
        *self.counts.lock()
    }

    /// Makes the next `times` calls of `operation` fail with `status`.
    ///
    /// With `id` set, only calls concerning that image fail.
    pub fn fail(&self, operation: Operation, id: Option<&str>, status: u16, times: usize) {
        self.failures.lock().push(InjectedFailure {
            operation,
            id: id.map(str::to_string),
            status,
            remaining: times,
        });
    }

    fn find(&self, id: &str) -> Option<StoredImage> {
        self.images.read().iter().find(|s| s.record.id == id).cloned()
    }

    fn begin(&self, operation: Operation, id: Option<&str>) -> ClientResult<()> {
        {
            let mut counts = self.counts.lock();
            if operation.is_write() {
                counts.writes += 1;
            } else {
                counts.reads += 1;
            }
        }

        let mut failures = self.failures.lock();
        let hit = failures.iter_mut().find(|f| {
            f.remaining > 0
                && f.operation == operation
                && (f.id.is_none() || f.id.as_deref() == id)
        });
        match hit {
            Some(failure) => {
                failure.remaining -= 1;
                Err(ClientError::from_status(
                    failure.status,
                    format!("injected failure for {operation:?} {}", id.unwrap_or("*")),
                ))
            }
            None => Ok(()),
        }
    }

    fn not_found(id: &str) -> ClientError {
        ClientError::from_status(404, format!("image {id} not found"))
    }
}

impl Default for MemoryImageStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_filter(record: &ImageRecord, filter: &ListFilter) -> bool {
    match filter.is_public {
        None => true,
        Some(wanted) => record
            .attribute("is_public")
            .map(wire_value)
            .is_some_and(|v| v.eq_ignore_ascii_case(if wanted { "true" } else { "false" })),
    }
}

fn read_payload(payload: ImagePayload) -> ClientResult<Bytes> {
    let mut data = Vec::with_capacity(payload.length() as usize);
    payload.into_reader().read_to_end(&mut data)?;
    Ok(Bytes::from(data))
}

impl ImageStore for MemoryImageStore {
    fn list_page(&self, filter: &ListFilter, marker: Option<&str>) -> ClientResult<ImagePage> {
        self.begin(Operation::List, None)?;

        let images = self.images.read();
        let start = match marker {
            Some(marker) => match images.iter().position(|s| s.record.id == marker) {
                Some(index) => index + 1,
                None => {
                    return Err(ClientError::from_status(
                        400,
                        format!("marker {marker} not found"),
                    ))
                }
            },
            None => 0,
        };

        let page = images[start..]
            .iter()
            .filter(|s| matches_filter(&s.record, filter))
            .take(self.page_size)
            .map(|s| s.record.clone())
            .collect();
        Ok(ImagePage::from_records(page))
    }

    fn get_image_meta(&self, id: &str) -> ClientResult<ImageRecord> {
        self.begin(Operation::GetMeta, Some(id))?;
        let stored = self.find(id).ok_or_else(|| Self::not_found(id))?;
        // Metadata travels as headers, exactly like a HEAD response.
        Ok(decode(&encode(&stored.record))?)
    }

    fn get_image(&self, id: &str) -> ClientResult<ImageDownload> {
        self.begin(Operation::GetImage, Some(id))?;
        let stored = self.find(id).ok_or_else(|| Self::not_found(id))?;
        match stored.payload {
            Some(payload) => {
                let length = payload.len() as u64;
                Ok(ImageDownload::new(Cursor::new(payload), Some(length)))
            }
            None => Err(ClientError::from_status(
                404,
                format!("image {id} has no data"),
            )),
        }
    }

    fn add_image_meta(&self, record: &ImageRecord) -> ClientResult<UploadResponse> {
        self.begin(Operation::AddMeta, Some(&record.id))?;
        let mut images = self.images.write();
        match images.iter_mut().find(|s| s.record.id == record.id) {
            Some(stored) => stored.record = record.clone(),
            None => images.push(StoredImage {
                record: record.clone(),
                payload: None,
            }),
        }
        Ok(UploadResponse::from_record(record))
    }

    fn add_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse> {
        // The body is on the wire before any status comes back.
        let data = read_payload(payload)?;
        self.begin(Operation::AddImage, Some(&record.id))?;
        if self.find(&record.id).is_some() {
            return Err(ClientError::from_status(
                409,
                format!("image {} already exists", record.id),
            ));
        }
        self.images.write().push(StoredImage {
            record: record.clone(),
            payload: Some(data),
        });
        Ok(UploadResponse::from_record(record))
    }

    fn update_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse> {
        let data = read_payload(payload)?;
        self.begin(Operation::UpdateImage, Some(&record.id))?;
        if self.find(&record.id).is_none() {
            return Err(Self::not_found(&record.id));
        }
        let mut images = self.images.write();
        if let Some(stored) = images.iter_mut().find(|s| s.record.id == record.id) {
            stored.record = record.clone();
            stored.payload = Some(data);
        }
        Ok(UploadResponse::from_record(record))
    }
}
