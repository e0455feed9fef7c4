//! Chunked payload transfer.

use imagesync_client::ImagePayload;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Copies `reader` into `writer` in blocks of at most `chunk_size` bytes.
///
/// Returns the number of bytes copied.
pub fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, chunk_size: usize) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

/// Shared count of bytes moved by one or more [`ChunkedReader`]s.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    /// Creates a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes counted so far.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }
}

/// Reader that hands out at most `chunk_size` bytes per read and counts them.
///
/// Used to stream a payload from one store into an upload to another
/// without holding more than one block in memory.
pub struct ChunkedReader<R> {
    inner: R,
    chunk_size: usize,
    counter: ByteCounter,
}

impl<R: Read> ChunkedReader<R> {
    /// Wraps `inner`.
    pub fn new(inner: R, chunk_size: usize, counter: ByteCounter) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
            counter,
        }
    }
}

impl<R: Read> Read for ChunkedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let limit = buf.len().min(self.chunk_size);
        let n = self.inner.read(&mut buf[..limit])?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

/// Wraps `payload` so it is read in `chunk_size` blocks counted by `counter`.
pub fn metered(payload: ImagePayload, chunk_size: usize, counter: &ByteCounter) -> ImagePayload {
    let length = payload.length();
    ImagePayload::new(
        ChunkedReader::new(payload.into_reader(), chunk_size, counter.clone()),
        length,
    )
}
