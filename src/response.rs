//! The real output sink and the content types renderers default to.
//!
//! Renderers never touch a [`Response`] directly. They write into a
//! [`ResponseBuffer`](crate::ResponseBuffer), which is flushed here in one go
//! once rendering has finished.

use bytes::{Bytes, BytesMut};
use http::header::{HeaderMap, HeaderValue};
use http::StatusCode;
use http_body_util::Full;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content-type values the built-in results fall back to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml; charset=utf-8
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml; charset=utf-8",
        }
    }

    pub(crate) fn header_value(&self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── ResponseSink ──────────────────────────────────────────────────────────────

/// Where a flushed buffer ends up.
///
/// The status code is write-once: the first call to
/// [`write_status`](ResponseSink::write_status) wins and later calls are
/// ignored.
pub trait ResponseSink {
    fn headers_mut(&mut self) -> &mut HeaderMap;
    fn write_status(&mut self, status: StatusCode);
    fn write(&mut self, bytes: &[u8]);
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response, as produced by [`Action::serve`](crate::Action::serve).
#[derive(Debug, Default)]
pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed status, or `200 OK` when nothing was committed.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Converts into the type hyper sends on the wire.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseSink for Response {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }
}
