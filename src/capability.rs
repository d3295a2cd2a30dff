//! Optional capabilities an input model can opt into.
//!
//! A model opts in twice: once by implementing the capability trait, and once
//! by listing it in [`InputModel::capabilities`]. The second step is what lets
//! the pipeline skip missing steps without looking at the model's type at
//! request time: the table is read once, when the [`Action`](crate::Action)
//! is built.
//!
//! ```rust
//! use bindery::{Bind, Capabilities, FieldError, InputModel, ModelError, Request, Validate};
//!
//! #[derive(Default)]
//! struct Greeting {
//!     name: String,
//! }
//!
//! impl Bind for Greeting {
//!     fn bind(&mut self, request: &Request) -> Result<(), ModelError> {
//!         self.name = request.form_value("name").unwrap_or_default().to_owned();
//!         Ok(())
//!     }
//! }
//!
//! impl Validate for Greeting {
//!     fn validate(&self) -> Result<(), ModelError> {
//!         if self.name.is_empty() {
//!             return Err(FieldError::simple("The field is required", "name").into());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! impl InputModel for Greeting {
//!     fn capabilities() -> Capabilities<Self> {
//!         Capabilities::none().bind().validate()
//!     }
//! }
//! ```

use std::fmt;

use http::Extensions;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ModelError;
use crate::request::Request;

/// Receives the request's extensions before any other binding runs.
///
/// Values a server or middleware attached to the request (the peer address,
/// an authenticated principal, a tracing id) reach the model this way.
pub trait BindContext {
    fn bind_context(&mut self, extensions: &Extensions);
}

/// Keeps a copy of the request's extensions. Embed it in a model and forward
/// [`BindContext::bind_context`] to it.
#[derive(Clone, Debug, Default)]
pub struct ContextBinder {
    pub context: Extensions,
}

impl BindContext for ContextBinder {
    fn bind_context(&mut self, extensions: &Extensions) {
        self.context = extensions.clone();
    }
}

/// Fills the model from request data. Runs after the form has been parsed.
pub trait Bind {
    fn bind(&mut self, request: &Request) -> Result<(), ModelError>;
}

/// Normalizes bound values. Cannot fail.
pub trait Sanitize {
    fn sanitize(&mut self);
}

/// Checks the model for semantic problems.
pub trait Validate {
    fn validate(&self) -> Result<(), ModelError>;
}

/// Reports a condition found while binding or validating that warrants a 500.
pub trait CheckServerError {
    fn server_error(&self) -> bool;
}

pub(crate) type ContextFn<M> = fn(&mut M, &Extensions);
pub(crate) type BindFn<M> = fn(&mut M, &Request) -> Result<(), ModelError>;
pub(crate) type DecodeFn<M> = fn(&mut M, &[u8]) -> serde_json::Result<()>;
pub(crate) type SanitizeFn<M> = fn(&mut M);
pub(crate) type ValidateFn<M> = fn(&M) -> Result<(), ModelError>;
pub(crate) type ServerErrorFn<M> = fn(&M) -> bool;

/// The steps a model type takes part in, as function pointers.
pub struct Capabilities<M> {
    pub(crate) context: Option<ContextFn<M>>,
    pub(crate) json_body: Option<DecodeFn<M>>,
    pub(crate) bind: Option<BindFn<M>>,
    pub(crate) sanitize: Option<SanitizeFn<M>>,
    pub(crate) validate: Option<ValidateFn<M>>,
    pub(crate) server_error: Option<ServerErrorFn<M>>,
}

impl<M> Capabilities<M> {
    /// No optional steps: the handler gets the model as constructed.
    pub const fn none() -> Self {
        Self {
            context: None,
            json_body: None,
            bind: None,
            sanitize: None,
            validate: None,
            server_error: None,
        }
    }

    pub fn context(mut self) -> Self
    where
        M: BindContext,
    {
        self.context = Some(<M as BindContext>::bind_context);
        self
    }

    pub fn bind(mut self) -> Self
    where
        M: Bind,
    {
        self.bind = Some(<M as Bind>::bind);
        self
    }

    pub fn sanitize(mut self) -> Self
    where
        M: Sanitize,
    {
        self.sanitize = Some(<M as Sanitize>::sanitize);
        self
    }

    pub fn validate(mut self) -> Self
    where
        M: Validate,
    {
        self.validate = Some(<M as Validate>::validate);
        self
    }

    pub fn server_error(mut self) -> Self
    where
        M: CheckServerError,
    {
        self.server_error = Some(<M as CheckServerError>::server_error);
        self
    }

    /// Decode a JSON request body into the model before [`Bind`] runs.
    ///
    /// Only `POST` and `PUT` requests whose `Content-Type` contains `/json`
    /// are accepted; other methods get `405`, other content types `415`.
    ///
    /// The body is merged into the model the factory built: members present
    /// in the body overwrite fields, everything else keeps its value.
    /// Fields marked `#[serde(skip)]` are left alone as well.
    pub fn json_body(mut self) -> Self
    where
        M: Serialize + DeserializeOwned,
    {
        self.json_body = Some(decode_json_into::<M>);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_none()
            && self.json_body.is_none()
            && self.bind.is_none()
            && self.sanitize.is_none()
            && self.validate.is_none()
            && self.server_error.is_none()
    }
}

fn decode_json_into<M>(model: &mut M, body: &[u8]) -> serde_json::Result<()>
where
    M: Serialize + DeserializeOwned,
{
    let patch: Value = serde_json::from_slice(body)?;
    let mut merged = serde_json::to_value(&*model)?;
    merge(&mut merged, patch);
    // In place, so fields the serializer never saw are not reset.
    Deserialize::deserialize_in_place(merged, model)
}

/// Objects merge member by member; any other value replaces the target.
fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

impl<M> Clone for Capabilities<M> {
    fn clone(&self) -> Self { *self }
}

impl<M> Copy for Capabilities<M> {}

impl<M> Default for Capabilities<M> {
    fn default() -> Self { Self::none() }
}

impl<M> fmt::Debug for Capabilities<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("context", &self.context.is_some())
            .field("json_body", &self.json_body.is_some())
            .field("bind", &self.bind.is_some())
            .field("sanitize", &self.sanitize.is_some())
            .field("validate", &self.validate.is_some())
            .field("server_error", &self.server_error.is_some())
            .finish()
    }
}

/// A request-scoped data type a handler can accept.
///
/// The default [`capabilities`](InputModel::capabilities) is empty, so
/// `impl InputModel for MyModel {}` is enough for a model with no optional
/// steps.
#[diagnostic::on_unimplemented(
    message = "The first argument to the controller callback must be an input model type.",
    note = "implement `bindery::InputModel` for `{Self}`"
)]
pub trait InputModel: Sized + 'static {
    fn capabilities() -> Capabilities<Self> {
        Capabilities::none()
    }
}
