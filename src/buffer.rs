//! In-memory response recording and the pool that recycles it.
//!
//! Every request renders into a [`ResponseBuffer`] checked out of a
//! [`BufferPool`]. Nothing reaches the real [`ResponseSink`] until
//! [`ResponseBuffer::flush`], so a renderer can change its mind about status
//! and headers right up to the end.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

use bytes::BytesMut;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::StatusCode;

use crate::response::ResponseSink;

const DEFAULT_POOL_CAPACITY: usize = 64;

// ── ResponseBuffer ────────────────────────────────────────────────────────────

/// Records status, headers and body until flushed.
///
/// Unlike a [`ResponseSink`], the status here is last-write-wins.
#[derive(Debug)]
pub struct ResponseBuffer {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: BytesMut::new() }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Sets `Content-Type`; empty or invalid values are ignored.
    pub fn set_content_type(&mut self, content_type: &str) {
        if content_type.is_empty() {
            return;
        }
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Copies headers, commits the status, writes the body, then resets.
    ///
    /// Headers are appended, so values already present on the sink survive.
    pub fn flush(&mut self, sink: &mut impl ResponseSink) {
        let headers = sink.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name, value.clone());
        }
        sink.write_status(self.status);
        sink.write(&self.body);
        self.reset();
    }

    /// Back to `200 OK`, no headers, no body. Allocations are kept.
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self { Self::new() }
}

// ── BufferPool ────────────────────────────────────────────────────────────────

/// A bounded stash of idle [`ResponseBuffer`]s.
///
/// `acquire` hands out a buffer exclusively; dropping the guard resets it and
/// puts it back, on success and failure paths alike. Buffers beyond
/// `capacity` are simply dropped.
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<ResponseBuffer>>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        Self { idle: Mutex::new(Vec::with_capacity(capacity)), capacity }
    }

    pub fn capacity(&self) -> usize { self.capacity }

    /// Number of buffers currently waiting to be reused.
    pub fn idle(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn acquire(&self) -> PooledBuffer<'_> {
        let buffer = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        PooledBuffer { pool: self, buffer }
    }

    fn release(&self, mut buffer: ResponseBuffer) {
        buffer.reset();
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.capacity {
            idle.push(buffer);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self { Self::new(DEFAULT_POOL_CAPACITY) }
}

/// A buffer checked out of a [`BufferPool`]; returned on drop.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buffer: ResponseBuffer,
}

impl Deref for PooledBuffer<'_> {
    type Target = ResponseBuffer;

    fn deref(&self) -> &ResponseBuffer { &self.buffer }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut ResponseBuffer { &mut self.buffer }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}
