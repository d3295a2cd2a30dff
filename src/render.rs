//! The [`Render`] trait and the pieces every renderer shares.
//!
//! A renderer writes itself into a [`ResponseBuffer`], never into the real
//! response. Status and headers stay in memory until the buffer is flushed,
//! which is what lets a JSON renderer replace a half-built success response
//! with the marshal-failure fallback.

use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde::Serialize;
use tracing::error;

use crate::buffer::ResponseBuffer;
use crate::errors::{Errors, FieldError};
use crate::request::Request;
use crate::response::ContentType;

/// Body written when JSON serialization fails.
pub(crate) const MARSHAL_FAILURE: &str = r#"[{"fields":["HTTP Response"],"message":"Marshal failure"}]"#;

/// A value that knows how to write itself as an HTTP response.
///
/// Handlers return a `Render`; the built-in results live in
/// [`results`](crate::results) and [`DiagnosticResult`](crate::DiagnosticResult).
#[diagnostic::on_unimplemented(
    message = "The return type must implement the Render trait.",
    label = "`{Self}` is not a renderer"
)]
pub trait Render {
    fn render(&self, request: &Request, response: &mut ResponseBuffer);
}

impl<R: Render + ?Sized> Render for Box<R> {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        (**self).render(request, response)
    }
}

impl<R: Render + ?Sized> Render for Arc<R> {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        (**self).render(request, response)
    }
}

impl<R: Render + ?Sized> Render for &R {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        (**self).render(request, response)
    }
}

/// `None` writes nothing.
impl<R: Render> Render for Option<R> {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        if let Some(renderer) = self {
            renderer.render(request, response)
        }
    }
}

// ── Composition ───────────────────────────────────────────────────────────────

/// Writes nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Nop;

impl Render for Nop {
    fn render(&self, _: &Request, _: &mut ResponseBuffer) {}
}

/// Renders each member in order.
#[derive(Default)]
pub struct Compound(Vec<Box<dyn Render + Send + Sync>>);

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, renderer: impl Render + Send + Sync + 'static) -> Self {
        self.0.push(Box::new(renderer));
        self
    }
}

impl Render for Compound {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        for renderer in &self.0 {
            renderer.render(request, response);
        }
    }
}

/// `renderer` when `condition` holds; the `None` case renders nothing.
pub fn when<R: Render>(condition: bool, renderer: R) -> Option<R> {
    condition.then_some(renderer)
}

/// Picks one of two renderers of possibly different types.
pub fn if_else<A, B>(condition: bool, yes: A, no: B) -> Box<dyn Render + Send + Sync>
where
    A: Render + Send + Sync + 'static,
    B: Render + Send + Sync + 'static,
{
    if condition { Box::new(yes) } else { Box::new(no) }
}

// ── Shared writers ────────────────────────────────────────────────────────────

/// Sets content type and status, then writes the body.
pub(crate) fn write_content(
    response: &mut ResponseBuffer,
    status: StatusCode,
    content_type: &str,
    body: &[u8],
) {
    response.set_content_type(content_type);
    response.set_status(status);
    response.write(body);
}

/// Serializes `content`, indenting with `indent` when it is non-empty.
pub(crate) fn serialize_json<T: Serialize + ?Sized>(
    content: &T,
    indent: &str,
) -> serde_json::Result<Vec<u8>> {
    if indent.is_empty() {
        return serde_json::to_vec(content);
    }
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    content.serialize(&mut serializer)?;
    Ok(out)
}

/// Writes `content` as JSON, or the marshal-failure fallback if it cannot be
/// serialized.
pub(crate) fn write_json<T: Serialize + ?Sized>(
    response: &mut ResponseBuffer,
    status: StatusCode,
    content: &T,
    content_type: &str,
    indent: &str,
) {
    match serialize_json(content, indent) {
        Ok(body) => write_content(response, status, content_type, &body),
        Err(e) => write_marshal_failure(response, &e),
    }
}

/// Discards everything rendered so far and writes a 500 with a JSON error
/// list. The encoder's message is only logged.
pub(crate) fn write_marshal_failure(response: &mut ResponseBuffer, err: &serde_json::Error) {
    error!("response serialization failed: {err}");
    response.reset();
    let failure = Errors::new().append(FieldError::simple("Marshal failure", "HTTP Response"));
    let body = serde_json::to_vec(&failure).unwrap_or_else(|_| MARSHAL_FAILURE.as_bytes().to_vec());
    response.headers_mut().insert(CONTENT_TYPE, ContentType::Json.header_value());
    response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
    response.write(&body);
}

/// First non-empty value, or `fallback`.
pub(crate) fn content_type_or<'a>(content_type: &'a str, fallback: ContentType) -> &'a str {
    if content_type.is_empty() { fallback.as_str() } else { content_type }
}
