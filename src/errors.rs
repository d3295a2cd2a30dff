//! Input errors, error collections and the error type capabilities return.
//!
//! Two collection flavors share one element type, [`FieldError`]:
//!
//! - [`Errors`] serializes as a JSON array of `{"fields": [..], "message": ..}`
//!   objects and is rendered as `application/json`.
//! - [`DiagnosticErrors`] displays as a human-readable list and is rendered as
//!   a plain-text diagnostic page.
//!
//! Both drop `None` on append, keep insertion order, and are treated as *no
//! error* when empty.

use std::fmt;

use http::StatusCode;
use serde::Serialize;

use crate::render::Render;
use crate::request::FormError;

/// A boxed, thread-safe error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ── FieldError ───────────────────────────────────────────────────────────────

/// A problem with one or more input fields.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldError {
    pub fields: Vec<String>,
    pub message: String,
    #[serde(skip)]
    pub status: Option<StatusCode>,
}

impl FieldError {
    /// An error about a single field.
    pub fn simple(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self { fields: vec![field.into()], message: message.into(), status: None }
    }

    /// An error that spans several fields.
    pub fn compound<I, S>(message: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            message: message.into(),
            status: None,
        }
    }

    /// An error not tied to any field.
    pub fn message(message: impl Into<String>) -> Self {
        Self { fields: Vec::new(), message: message.into(), status: None }
    }

    /// Overrides the status the failing pipeline stage would otherwise use.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for FieldError {}

impl From<StatusError> for FieldError {
    fn from(err: StatusError) -> Self {
        Self::message(err.to_string()).with_status(err.0)
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// An ordered collection of [`FieldError`]s, serialized as a JSON array.
///
/// ```rust
/// use bindery::{Errors, FieldError};
///
/// let errors = Errors::new()
///     .append(FieldError::simple("Hello", "World"))
///     .append(None::<FieldError>);
///
/// assert_eq!(errors.to_string(), r#"[{"fields":["World"],"message":"Hello"}]"#);
/// ```
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Errors(Vec<FieldError>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `err`; `None` is ignored.
    pub fn append(mut self, err: impl Into<Option<FieldError>>) -> Self {
        if let Some(err) = err.into() {
            self.0.push(err);
        }
        self
    }

    /// Appends `err` only when `condition` holds.
    pub fn append_if(self, err: impl Into<Option<FieldError>>, condition: bool) -> Self {
        if condition { self.append(err) } else { self }
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> { self.0.iter() }

    /// The first status carried by an entry, in insertion order.
    pub fn status_code(&self) -> Option<StatusCode> {
        first_status(&self.0)
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&raw)
    }
}

impl std::error::Error for Errors {}

impl FromIterator<FieldError> for Errors {
    fn from_iter<I: IntoIterator<Item = FieldError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ── DiagnosticErrors ──────────────────────────────────────────────────────────

/// An ordered collection of [`FieldError`]s displayed as a readable list.
///
/// A single entry displays as `- message`; several are numbered.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DiagnosticErrors(Vec<FieldError>);

impl DiagnosticErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `err`; `None` is ignored.
    pub fn append(mut self, err: impl Into<Option<FieldError>>) -> Self {
        if let Some(err) = err.into() {
            self.0.push(err);
        }
        self
    }

    /// Appends `err` only when `condition` holds.
    pub fn append_if(self, err: impl Into<Option<FieldError>>, condition: bool) -> Self {
        if condition { self.append(err) } else { self }
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> { self.0.iter() }

    pub fn status_code(&self) -> Option<StatusCode> {
        first_status(&self.0)
    }
}

impl fmt::Display for DiagnosticErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Errors:\n\n")?;
        if let [only] = self.0.as_slice() {
            return write!(f, "- {}", only.message);
        }
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}. {}", i + 1, err.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for DiagnosticErrors {}

fn first_status(errors: &[FieldError]) -> Option<StatusCode> {
    errors.iter().find_map(FieldError::status_code)
}

// ── StatusError ──────────────────────────────────────────────────────────────

/// An error that is nothing but an HTTP status; displays as its reason phrase.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{}", .0.canonical_reason().unwrap_or("Unknown Status"))]
pub struct StatusError(pub StatusCode);

impl StatusError {
    pub fn status_code(&self) -> StatusCode {
        self.0
    }
}

/// Any error paired with the status it should be answered with; displays as
/// the wrapped error. Built by [`ModelError::with_status`].
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct CodedError {
    status: StatusCode,
    source: BoxError,
}

impl CodedError {
    pub fn status_code(&self) -> StatusCode {
        self.status
    }
}

// ── ModelError ───────────────────────────────────────────────────────────────

/// What a `Bind` or `Validate` capability returns on failure.
///
/// The variant decides how the failure is rendered: collections get their
/// JSON or diagnostic rendering, a renderer renders itself, and anything else
/// becomes a plain-text status response carrying the error's message.
pub enum ModelError {
    Errors(Errors),
    Diagnostic(DiagnosticErrors),
    Renderer(Box<dyn Render + Send + Sync>),
    Other(BoxError),
}

impl ModelError {
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// An `Other` error answered with `status` instead of the stage default.
    ///
    /// ```rust
    /// use bindery::ModelError;
    /// use http::StatusCode;
    ///
    /// let err = ModelError::with_status(StatusCode::CONFLICT, "already registered");
    /// assert_eq!(err.status_code(), Some(StatusCode::CONFLICT));
    /// assert_eq!(err.to_string(), "already registered");
    /// ```
    pub fn with_status(status: StatusCode, err: impl Into<BoxError>) -> Self {
        Self::Other(Box::new(CodedError { status, source: err.into() }))
    }

    pub fn renderer(renderer: impl Render + Send + Sync + 'static) -> Self {
        Self::Renderer(Box::new(renderer))
    }

    /// The status carried by the error, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Errors(errors) => errors.status_code(),
            Self::Diagnostic(errors) => errors.status_code(),
            Self::Renderer(_) => None,
            Self::Other(err) => {
                if let Some(status) = err.downcast_ref::<StatusError>() {
                    Some(status.0)
                } else if let Some(coded) = err.downcast_ref::<CodedError>() {
                    Some(coded.status)
                } else {
                    err.downcast_ref::<FieldError>().and_then(FieldError::status_code)
                }
            }
        }
    }

    /// True for a collection with no entries, which counts as success.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Errors(errors) => errors.is_empty(),
            Self::Diagnostic(errors) => errors.is_empty(),
            Self::Renderer(_) | Self::Other(_) => false,
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Errors(errors) => fmt::Display::fmt(errors, f),
            Self::Diagnostic(errors) => fmt::Display::fmt(errors, f),
            Self::Renderer(_) => f.write_str("custom renderer"),
            Self::Other(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl fmt::Debug for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Errors(errors) => f.debug_tuple("Errors").field(errors).finish(),
            Self::Diagnostic(errors) => f.debug_tuple("Diagnostic").field(errors).finish(),
            Self::Renderer(_) => f.write_str("Renderer(..)"),
            Self::Other(err) => f.debug_tuple("Other").field(err).finish(),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<Errors> for ModelError {
    fn from(errors: Errors) -> Self { Self::Errors(errors) }
}

impl From<DiagnosticErrors> for ModelError {
    fn from(errors: DiagnosticErrors) -> Self { Self::Diagnostic(errors) }
}

impl From<FieldError> for ModelError {
    fn from(err: FieldError) -> Self { Self::Errors(Errors::new().append(err)) }
}

impl From<StatusError> for ModelError {
    fn from(err: StatusError) -> Self { Self::Other(Box::new(err)) }
}

impl From<FormError> for ModelError {
    fn from(err: FormError) -> Self { Self::Other(Box::new(err)) }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self { Self::Other(Box::new(err)) }
}
