//! Built-in results a handler can return.
//!
//! Every result is a plain struct with public fields and a `Default`, so the
//! common case reads as a struct literal:
//!
//! ```rust
//! use bindery::results::ContentResult;
//! use http::StatusCode;
//!
//! let result = ContentResult {
//!     status: StatusCode::ACCEPTED,
//!     content: "Hello, Mike!".into(),
//!     ..Default::default()
//! };
//! ```
//!
//! `status` defaults to `200 OK` and an empty `content_type` falls back to the
//! type's natural default.

use std::fmt;
use std::io::Read;
use std::sync::{Mutex, PoisonError};

use cookie::Cookie;
use http::header::{HeaderMap, HeaderValue, LOCATION, SET_COOKIE};
use http::{Method, StatusCode};
use serde::Serialize;
use tracing::{error, warn};

use crate::buffer::ResponseBuffer;
use crate::errors::{Errors, FieldError};
use crate::render::{
    Render, content_type_or, serialize_json, write_content, write_json, write_marshal_failure,
};
use crate::request::Request;
use crate::response::ContentType;

/// Appends `source` onto the buffer's headers.
fn copy_headers(source: &HeaderMap, response: &mut ResponseBuffer) {
    let headers = response.headers_mut();
    for (name, value) in source {
        headers.append(name, value.clone());
    }
}

// ── StatusCodeResult ──────────────────────────────────────────────────────────

/// A status with an optional plain-text message.
#[derive(Clone, Debug, Default)]
pub struct StatusCodeResult {
    pub status: StatusCode,
    pub message: String,
}

impl StatusCodeResult {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl Render for StatusCodeResult {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        write_content(response, self.status, ContentType::Text.as_str(), self.message.as_bytes());
    }
}

// ── ContentResult ─────────────────────────────────────────────────────────────

/// A string body; `text/plain` unless told otherwise.
#[derive(Clone, Debug, Default)]
pub struct ContentResult {
    pub status: StatusCode,
    pub content_type: String,
    pub content: String,
    pub headers: HeaderMap,
}

impl Render for ContentResult {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        copy_headers(&self.headers, response);
        let content_type = content_type_or(&self.content_type, ContentType::Text);
        write_content(response, self.status, content_type, self.content.as_bytes());
    }
}

// ── BinaryResult ──────────────────────────────────────────────────────────────

/// Raw bytes; `application/octet-stream` unless told otherwise.
#[derive(Clone, Debug, Default)]
pub struct BinaryResult {
    pub status: StatusCode,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Render for BinaryResult {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        let content_type = content_type_or(&self.content_type, ContentType::OctetStream);
        write_content(response, self.status, content_type, &self.content);
    }
}

// ── JsonResult ────────────────────────────────────────────────────────────────

/// Serializes `content` as JSON.
///
/// If serialization fails the response becomes a 500 with the fixed
/// `Marshal failure` error list, whatever `status` was requested.
#[derive(Clone, Debug, Default)]
pub struct JsonResult<T> {
    pub status: StatusCode,
    pub content_type: String,
    pub content: T,
    pub indent: String,
    pub headers: HeaderMap,
}

impl<T: Serialize> JsonResult<T> {
    pub fn new(content: T) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: String::new(),
            content,
            indent: String::new(),
            headers: HeaderMap::new(),
        }
    }
}

impl<T: Serialize> Render for JsonResult<T> {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        copy_headers(&self.headers, response);
        let content_type = content_type_or(&self.content_type, ContentType::Json);
        write_json(response, self.status, &self.content, content_type, &self.indent);
    }
}

// ── JsonpResult ───────────────────────────────────────────────────────────────

/// JSON wrapped as `callback(...)` when the request carries a non-empty
/// `callback` query parameter; plain JSON otherwise.
#[derive(Clone, Debug, Default)]
pub struct JsonpResult<T> {
    pub status: StatusCode,
    pub content_type: String,
    pub content: T,
    pub indent: String,
    pub headers: HeaderMap,
}

impl<T: Serialize> JsonpResult<T> {
    pub fn new(content: T) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: String::new(),
            content,
            indent: String::new(),
            headers: HeaderMap::new(),
        }
    }
}

impl<T: Serialize> Render for JsonpResult<T> {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        copy_headers(&self.headers, response);
        let content_type = content_type_or(&self.content_type, ContentType::Json);

        let json = match serialize_json(&self.content, &self.indent) {
            Ok(json) => json,
            Err(e) => return write_marshal_failure(response, &e),
        };
        let body = match request.query("callback").filter(|cb| !cb.is_empty()) {
            Some(callback) => wrap_jsonp(&callback, json.trim_ascii()),
            None => json.trim_ascii().to_vec(),
        };
        write_content(response, self.status, content_type, &body);
    }
}

fn wrap_jsonp(callback: &str, json: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(callback.len() + json.len() + 2);
    body.extend_from_slice(callback.as_bytes());
    body.push(b'(');
    body.extend_from_slice(json);
    body.push(b')');
    body
}

// ── XmlResult ─────────────────────────────────────────────────────────────────

/// Serializes `content` as XML; the root element is named after the type.
///
/// A value without a root element name (a bare number or a map) is answered
/// with a logged 500 instead.
#[derive(Clone, Debug, Default)]
pub struct XmlResult<T> {
    pub status: StatusCode,
    pub content_type: String,
    pub content: T,
    pub headers: HeaderMap,
}

impl<T: Serialize> XmlResult<T> {
    pub fn new(content: T) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: String::new(),
            content,
            headers: HeaderMap::new(),
        }
    }
}

impl<T: Serialize> Render for XmlResult<T> {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        match quick_xml::se::to_string(&self.content) {
            Ok(xml) => {
                copy_headers(&self.headers, response);
                let content_type = content_type_or(&self.content_type, ContentType::Xml);
                write_content(response, self.status, content_type, xml.as_bytes());
            }
            Err(e) => {
                error!("xml serialization failed: {e}");
                response.reset();
                StatusCodeResult::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .render(request, response);
            }
        }
    }
}

// ── ReaderResult ──────────────────────────────────────────────────────────────

/// Streams a reader into the body; `application/octet-stream` unless told
/// otherwise.
///
/// The reader is drained by the first render. Rendering the same result
/// again writes only the status and content type. A read error keeps the
/// bytes read before it.
pub struct ReaderResult {
    pub status: StatusCode,
    pub content_type: String,
    reader: Mutex<Option<Box<dyn Read + Send>>>,
}

impl ReaderResult {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: String::new(),
            reader: Mutex::new(Some(Box::new(reader))),
        }
    }
}

impl Render for ReaderResult {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        let mut body = Vec::new();
        let reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut reader) = reader {
            if let Err(e) = reader.read_to_end(&mut body) {
                warn!(read = body.len(), "reader body ended early: {e}");
            }
        }
        let content_type = content_type_or(&self.content_type, ContentType::OctetStream);
        write_content(response, self.status, content_type, &body);
    }
}

impl fmt::Debug for ReaderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderResult")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

// ── ErrorResult / ValidationResult ────────────────────────────────────────────

/// An error list rendered as JSON with the given status.
#[derive(Clone, Debug)]
pub struct ErrorResult {
    pub status: StatusCode,
    pub errors: Errors,
}

impl ErrorResult {
    pub fn new(status: StatusCode, errors: Errors) -> Self {
        Self { status, errors }
    }
}

impl Default for ErrorResult {
    fn default() -> Self {
        Self { status: StatusCode::UNPROCESSABLE_ENTITY, errors: Errors::new() }
    }
}

impl Render for ErrorResult {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        write_json(response, self.status, &self.errors, ContentType::Json.as_str(), "");
    }
}

/// Up to four failures rendered as a 422 JSON error list; `None` slots are
/// skipped.
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub failure1: Option<FieldError>,
    pub failure2: Option<FieldError>,
    pub failure3: Option<FieldError>,
    pub failure4: Option<FieldError>,
}

impl Render for ValidationResult {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        let failures = Errors::new()
            .append(self.failure1.clone())
            .append(self.failure2.clone())
            .append(self.failure3.clone())
            .append(self.failure4.clone());
        write_json(
            response,
            StatusCode::UNPROCESSABLE_ENTITY,
            &failures,
            ContentType::Json.as_str(),
            "",
        );
    }
}

// ── RedirectResult ────────────────────────────────────────────────────────────

/// Sets `Location` and a redirect status (`302 Found` when `status` is not a
/// redirect).
///
/// A location without scheme or host is resolved against the request path,
/// so `"next"` from `/a/b` becomes `/a/next`. `GET` requests also get a short
/// HTML body linking the target; `HEAD` gets only its content type. A
/// location that cannot be a header value is answered with a 500.
#[derive(Clone, Debug)]
pub struct RedirectResult {
    pub location: String,
    pub status: StatusCode,
}

impl RedirectResult {
    pub fn new(location: impl Into<String>, status: StatusCode) -> Self {
        Self { location: location.into(), status }
    }
}

impl Render for RedirectResult {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        let status = if self.status.is_redirection() { self.status } else { StatusCode::FOUND };
        let target = resolve_location(request.path(), &self.location);
        let location = match HeaderValue::from_str(&target) {
            Ok(location) => location,
            Err(e) => {
                error!(location = %self.location, "invalid redirect location: {e}");
                response.reset();
                StatusCodeResult::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .render(request, response);
                return;
            }
        };
        response.headers_mut().insert(LOCATION, location);
        response.set_status(status);

        let method = request.method();
        if *method == Method::GET || *method == Method::HEAD {
            response.set_content_type(ContentType::Html.as_str());
        }
        if *method == Method::GET {
            let reason = status.canonical_reason().unwrap_or("Redirect");
            let body = format!("<a href=\"{}\">{reason}</a>.\n\n", html_escape(&target));
            response.write(body.as_bytes());
        }
    }
}

/// Resolves a scheme-less, host-less `location` against `request_path`.
fn resolve_location(request_path: &str, location: &str) -> String {
    if has_scheme(location) || location.starts_with("//") {
        return location.to_owned();
    }

    let (path, query) = match location.find(|c| c == '?' || c == '#') {
        Some(i) => location.split_at(i),
        None => (location, ""),
    };
    let joined = if path.starts_with('/') {
        path.to_owned()
    } else {
        let base = if request_path.is_empty() { "/" } else { request_path };
        let dir = &base[..base.rfind('/').map_or(0, |i| i + 1)];
        format!("{dir}{path}")
    };

    let mut cleaned = clean_path(&joined);
    if joined.ends_with('/') && !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned + query
}

/// `scheme:` per RFC 3986, before any `/`, `?` or `#`.
fn has_scheme(location: &str) -> bool {
    let Some(colon) = location.find(':') else {
        return false;
    };
    let scheme = &location[..colon];
    scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Lexical cleanup of an absolute path: drops empty and `.` segments and
/// resolves `..`.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

fn html_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ── CookieResult ──────────────────────────────────────────────────────────────

/// Sets up to four cookies; `None` slots are skipped.
#[derive(Clone, Debug, Default)]
pub struct CookieResult {
    pub cookie1: Option<Cookie<'static>>,
    pub cookie2: Option<Cookie<'static>>,
    pub cookie3: Option<Cookie<'static>>,
    pub cookie4: Option<Cookie<'static>>,
}

impl Render for CookieResult {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        let cookies = [&self.cookie1, &self.cookie2, &self.cookie3, &self.cookie4];
        for cookie in cookies.into_iter().flatten() {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    response.headers_mut().append(SET_COOKIE, value);
                }
                Err(e) => warn!(cookie = cookie.name(), "invalid cookie: {e}"),
            }
        }
    }
}

// ── HeadersResult ─────────────────────────────────────────────────────────────

/// Header pairs to set (replacing) or add (appending).
#[derive(Clone, Debug, Default)]
pub struct HeadersResult {
    pub set: HeaderMap,
    pub add: HeaderMap,
}

impl Render for HeadersResult {
    fn render(&self, _: &Request, response: &mut ResponseBuffer) {
        let headers = response.headers_mut();
        for name in self.set.keys() {
            headers.remove(name);
        }
        for (name, value) in &self.set {
            headers.append(name, value.clone());
        }
        for (name, value) in &self.add {
            headers.append(name, value.clone());
        }
    }
}
