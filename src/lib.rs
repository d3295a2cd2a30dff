//! # bindery
//!
//! Input models for hyper services. A handler declares the type it wants;
//! bindery builds a fresh one per request, binds it, cleans it, checks it,
//! and only then calls the handler. Whatever goes wrong along the way is
//! rendered for the client without the handler ever running.
//!
//! ## The contract
//!
//! A model opts into the steps it needs by implementing the capability
//! traits and listing them in [`InputModel::capabilities`]:
//!
//! - [`BindContext`]: copy values out of the request's extensions
//! - `json_body`: decode a JSON body into the model, keeping what it omits
//! - [`Bind`]: fill the model from the request (form, query, headers)
//! - [`Sanitize`]: normalize bound values
//! - [`Validate`]: report semantic problems, `422` by default
//! - [`CheckServerError`]: abort with `500`
//!
//! Steps a model does not list are skipped. A failing step stops the run and
//! its error is rendered by status: plain [`Errors`] as JSON, [`DiagnosticErrors`]
//! as a text page, anything else as its message.
//!
//! Handlers return a [`Render`] value. The renderers in [`results`] cover
//! status codes, text, bytes, readers, JSON, JSONP, XML, redirects, cookies
//! and headers.
//!
//! Command-style endpoints implement [`Detour`] instead and hand their
//! messages to a [`MessageHandler`]; [`testing`] has a fixture for them.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bindery::results::ContentResult;
//! use bindery::{Action, Bind, Capabilities, InputModel, ModelError, Request, Server};
//!
//! #[derive(Default)]
//! struct SayHello {
//!     name: String,
//! }
//!
//! impl Bind for SayHello {
//!     fn bind(&mut self, request: &Request) -> Result<(), ModelError> {
//!         self.name = request.form_value("name").unwrap_or("World").to_owned();
//!         Ok(())
//!     }
//! }
//!
//! impl InputModel for SayHello {
//!     fn capabilities() -> Capabilities<Self> {
//!         Capabilities::none().bind()
//!     }
//! }
//!
//! fn say_hello(model: SayHello) -> ContentResult {
//!     ContentResult { content: format!("Hello, {}!", model.name), ..Default::default() }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::bind("0.0.0.0:3000").serve(Action::new(say_hello)).await.unwrap();
//! }
//! ```

mod buffer;
mod capability;
mod detour;
mod diagnostic;
mod error;
mod errors;
mod handler;
mod pipeline;
mod render;
mod request;
mod response;
mod server;

pub mod results;
pub mod testing;

pub use buffer::{BufferPool, PooledBuffer, ResponseBuffer};
pub use capability::{
    Bind, BindContext, Capabilities, CheckServerError, ContextBinder, InputModel, Sanitize, Validate,
};
pub use detour::{Detour, MessageHandler};
pub use diagnostic::DiagnosticResult;
pub use error::Error;
pub use errors::{BoxError, CodedError, DiagnosticErrors, Errors, FieldError, ModelError, StatusError};
pub use handler::{Action, Handler};
pub use pipeline::{Rejection, Stage, prepare};
pub use render::{Compound, Nop, Render, if_else, when};
pub use request::{FormError, PeerAddr, Request};
pub use response::{ContentType, Response, ResponseSink};
pub use server::Server;
