//! Retry with exponential backoff.

use crate::config::RetryConfig;
use crate::error::EngineError;
use imagesync_client::{
    ClientError, ClientResult, ImageDownload, ImagePage, ImagePayload, ImageStore, ListFilter,
    UploadResponse,
};
use imagesync_codec::ImageRecord;
use tracing::warn;

/// Errors that know whether repeating the call may help.
pub trait Retryable {
    /// Returns true if the failed call may succeed when repeated.
    fn is_retryable(&self) -> bool;
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        ClientError::is_retryable(self)
    }
}

impl Retryable for EngineError {
    fn is_retryable(&self) -> bool {
        EngineError::is_retryable(self)
    }
}

/// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// `op` is called afresh for every attempt, so anything it consumes (such as
/// an upload payload) must be recreated inside it.
pub fn with_backoff<T, E, F>(retry: &RetryConfig, what: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            std::thread::sleep(retry.delay_for_attempt(attempt));
        }

        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                warn!(
                    what,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    "retrying after transient failure"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// An [`ImageStore`] that retries idempotent requests.
///
/// Listing pages, metadata fetches, payload opens and metadata-only updates
/// are retried with backoff. Streamed uploads consume their payload, so
/// `add_image` and `update_image` are passed through once; callers retry
/// them with [`with_backoff`] and a fresh payload per attempt.
#[derive(Debug, Clone)]
pub struct Retrying<S> {
    inner: S,
    retry: RetryConfig,
}

impl<S: ImageStore> Retrying<S> {
    /// Wraps `inner`.
    pub fn new(inner: S, retry: RetryConfig) -> Self {
        Self { inner, retry }
    }
}

impl<S: ImageStore> ImageStore for Retrying<S> {
    fn list_page(&self, filter: &ListFilter, marker: Option<&str>) -> ClientResult<ImagePage> {
        with_backoff(&self.retry, "list images", || {
            self.inner.list_page(filter, marker)
        })
    }

    fn get_image_meta(&self, id: &str) -> ClientResult<ImageRecord> {
        with_backoff(&self.retry, "get image metadata", || {
            self.inner.get_image_meta(id)
        })
    }

    fn get_image(&self, id: &str) -> ClientResult<ImageDownload> {
        with_backoff(&self.retry, "get image", || self.inner.get_image(id))
    }

    fn add_image_meta(&self, record: &ImageRecord) -> ClientResult<UploadResponse> {
        with_backoff(&self.retry, "add image metadata", || {
            self.inner.add_image_meta(record)
        })
    }

    fn add_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse> {
        self.inner.add_image(record, payload)
    }

    fn update_image(
        &self,
        record: &ImageRecord,
        payload: ImagePayload,
    ) -> ClientResult<UploadResponse> {
        self.inner.update_image(record, payload)
    }
}
