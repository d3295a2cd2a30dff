//! Command-style endpoints.
//!
//! A [`Detour`] is built fresh per request, binds itself from the request,
//! and hands its messages to an application-wide [`MessageHandler`] instead
//! of calling a handler function. What it returns afterwards is rendered.
//!
//! ```rust
//! use std::any::Any;
//!
//! use bindery::results::StatusCodeResult;
//! use bindery::{Action, Detour, MessageHandler, Request};
//! use http::{Extensions, StatusCode};
//!
//! #[derive(Default)]
//! struct CloseAccount {
//!     account: String,
//!     closed: bool,
//! }
//!
//! impl Detour for CloseAccount {
//!     type Rejected = StatusCodeResult;
//!     type Output = StatusCodeResult;
//!
//!     fn bind(&mut self, request: &Request) -> Result<(), StatusCodeResult> {
//!         self.account = request.query("account").ok_or_else(|| {
//!             StatusCodeResult::new(StatusCode::BAD_REQUEST, "account is required")
//!         })?;
//!         Ok(())
//!     }
//!
//!     fn handle(mut self, context: &Extensions, handler: &dyn MessageHandler) -> StatusCodeResult {
//!         let message: &mut (dyn Any + Send + 'static) = &mut self;
//!         handler.handle(context, &mut [message]);
//!         if self.closed {
//!             StatusCodeResult::new(StatusCode::OK, "closed")
//!         } else {
//!             StatusCodeResult::new(StatusCode::CONFLICT, "still open")
//!         }
//!     }
//! }
//!
//! struct Accounts;
//!
//! impl MessageHandler for Accounts {
//!     fn handle(&self, _: &Extensions, messages: &mut [&mut (dyn Any + Send + 'static)]) {
//!         for message in messages.iter_mut() {
//!             if let Some(close) = message.downcast_mut::<CloseAccount>() {
//!                 close.closed = true;
//!             }
//!         }
//!     }
//! }
//!
//! let action = Action::detour(CloseAccount::default, Accounts);
//! let request: Request = http::Request::builder()
//!     .uri("/?account=42")
//!     .body(bytes::Bytes::new())
//!     .unwrap()
//!     .into();
//! assert_eq!(action.serve(&request).body(), b"closed");
//! ```
//!
//! A detour that also implements [`InputModel`](crate::InputModel) can run the
//! whole bind/sanitize/validate pipeline from its `bind` by calling
//! [`prepare`](crate::prepare) with `Rejected = Rejection`.

use std::any::{Any, type_name};
use std::sync::Arc;

use http::Extensions;
use tracing::debug;

use crate::buffer::ResponseBuffer;
use crate::handler::{Action, ErasedAction};
use crate::render::Render;
use crate::request::Request;

/// Receives the messages a detour produced, with the request's extensions as
/// context.
///
/// Messages are handed over by mutable reference so the handler can write
/// results back into them.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, context: &Extensions, messages: &mut [&mut (dyn Any + Send + 'static)]);
}

impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    fn handle(&self, context: &Extensions, messages: &mut [&mut (dyn Any + Send + 'static)]) {
        (**self).handle(context, messages)
    }
}

impl<H: MessageHandler + ?Sized> MessageHandler for Box<H> {
    fn handle(&self, context: &Extensions, messages: &mut [&mut (dyn Any + Send + 'static)]) {
        (**self).handle(context, messages)
    }
}

/// A per-request command object.
///
/// `bind` either accepts the request or returns what to render instead;
/// only an accepted detour is handled.
pub trait Detour: 'static {
    type Rejected: Render;
    type Output: Render;

    fn bind(&mut self, request: &Request) -> Result<(), Self::Rejected>;

    fn handle(self, context: &Extensions, handler: &dyn MessageHandler) -> Self::Output;
}

struct DetourAction<D, H> {
    factory: Box<dyn Fn() -> D + Send + Sync>,
    handler: H,
}

impl<D: Detour, H: MessageHandler> ErasedAction for DetourAction<D, H> {
    fn call(&self, request: &Request, response: &mut ResponseBuffer) {
        let mut detour = (self.factory)();
        match detour.bind(request) {
            Ok(()) => detour.handle(request.extensions(), &self.handler).render(request, response),
            Err(rejected) => {
                debug!(detour = type_name::<D>(), "bind rejected the request");
                rejected.render(request, response)
            }
        }
    }
}

impl Action {
    /// Serves each request with a fresh detour from `factory`, handing its
    /// messages to `handler`.
    ///
    /// `handler` is shared by every request and every clone of the action.
    pub fn detour<D, F, H>(factory: F, handler: H) -> Self
    where
        D: Detour,
        F: Fn() -> D + Send + Sync + 'static,
        H: MessageHandler,
    {
        Self::erased(Arc::new(DetourAction { factory: Box::new(factory), handler }))
    }
}
