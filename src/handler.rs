//! Handler trait, type erasure and the [`Action`] that serves requests.
//!
//! # How handlers are stored
//!
//! An [`Action`] holds a handler of any shape behind one trait object, so a
//! server can share it across connections without knowing the model type.
//!
//! ```text
//! fn say_hello(model: SayHello) -> impl Render { … }   ← user writes this
//!        ↓ Action::new(say_hello)
//! say_hello.into_erased(factory)                        ← Handler blanket impl
//!        ↓
//! Arc::new(ModelAction { handler, factory, capabilities })
//!        ↓  stored as BoxedAction = Arc<dyn ErasedAction>
//! action.call(request, buffer)  at request time         ← one vtable dispatch
//!        ↓
//! factory() → prepare(..) → say_hello(model).render(..)
//! ```
//!
//! The capability table is read from [`InputModel::capabilities`] once, in
//! `into_erased`. Request time only follows function pointers.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use tracing::{error, trace};

use crate::buffer::{BufferPool, ResponseBuffer};
use crate::capability::{Capabilities, InputModel};
use crate::pipeline::prepare;
use crate::render::Render;
use crate::request::Request;
use crate::response::Response;
use crate::results::StatusCodeResult;

// ── Internal types ────────────────────────────────────────────────────────────

/// Builds a fresh model per request. `None` means the factory's product could
/// not be turned into the handler's model type.
#[doc(hidden)]
pub type Factory<M> = Box<dyn Fn() -> Option<M> + Send + Sync + 'static>;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the public `Handler` trait.
#[doc(hidden)]
pub trait ErasedAction {
    fn call(&self, request: &Request, response: &mut ResponseBuffer);
}

#[doc(hidden)]
pub type BoxedAction = Arc<dyn ErasedAction + Send + Sync + 'static>;

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with one of these shapes:
///
/// ```text
/// fn name() -> impl Render
/// fn name(model: M) -> impl Render        where M: InputModel
/// ```
///
/// `Args` is `()` or `(M,)` and is inferred.
///
/// Any other shape is rejected when the [`Action`] is built. A second
/// argument:
///
/// ```compile_fail,E0277
/// # use bindery::results::StatusCodeResult;
/// # use bindery::{Action, InputModel};
/// #[derive(Default)]
/// struct Ping;
/// impl InputModel for Ping {}
///
/// let _ = Action::new(|_: Ping, _: Ping| StatusCodeResult::default());
/// ```
///
/// A return value that is not a [`Render`]:
///
/// ```compile_fail,E0277
/// # use bindery::Action;
/// let _ = Action::new(|| 42);
/// ```
///
/// An argument that is not an [`InputModel`]:
///
/// ```compile_fail,E0277
/// # use bindery::results::StatusCodeResult;
/// # use bindery::Action;
/// #[derive(Default)]
/// struct Loose;
///
/// let _ = Action::new(|_: Loose| StatusCodeResult::default());
/// ```
#[diagnostic::on_unimplemented(
    message = "The callback provided must have no more than one argument.",
    label = "not a valid handler",
    note = "handlers look like `fn() -> impl Render` or `fn(M) -> impl Render` where `M: InputModel`"
)]
pub trait Handler<Args>: private::Sealed<Args> + Send + Sync + 'static {
    /// The input model the handler takes; `()` for zero-argument handlers.
    #[doc(hidden)]
    type Model: 'static;

    #[doc(hidden)]
    fn into_erased(self, factory: Factory<Self::Model>) -> BoxedAction;
}

mod private {
    pub trait Sealed<Args> {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, R> private::Sealed<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Render,
{
}

impl<F, R> Handler<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Render,
{
    type Model = ();

    fn into_erased(self, _: Factory<()>) -> BoxedAction {
        Arc::new(FnAction(self))
    }
}

impl<F, M, R> private::Sealed<(M,)> for F
where
    F: Fn(M) -> R + Send + Sync + 'static,
    M: InputModel,
    R: Render,
{
}

impl<F, M, R> Handler<(M,)> for F
where
    F: Fn(M) -> R + Send + Sync + 'static,
    M: InputModel,
    R: Render,
{
    type Model = M;

    fn into_erased(self, factory: Factory<M>) -> BoxedAction {
        Arc::new(ModelAction { handler: self, factory, capabilities: M::capabilities() })
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

/// A zero-argument handler. No model, no pipeline.
struct FnAction<F>(F);

impl<F, R> ErasedAction for FnAction<F>
where
    F: Fn() -> R,
    R: Render,
{
    fn call(&self, request: &Request, response: &mut ResponseBuffer) {
        (self.0)().render(request, response);
    }
}

struct ModelAction<F, M> {
    handler: F,
    factory: Factory<M>,
    capabilities: Capabilities<M>,
}

impl<F, M, R> ErasedAction for ModelAction<F, M>
where
    F: Fn(M) -> R,
    R: Render,
{
    fn call(&self, request: &Request, response: &mut ResponseBuffer) {
        let Some(mut model) = (self.factory)() else {
            error!(model = type_name::<M>(), "model factory produced the wrong type");
            StatusCodeResult::new(http::StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                .render(request, response);
            return;
        };

        match prepare(&mut model, &self.capabilities, request) {
            Ok(()) => (self.handler)(model).render(request, response),
            Err(rejection) => rejection.render(request, response),
        }
    }
}

// ── Action ────────────────────────────────────────────────────────────────────

/// A handler bound to its input-model pipeline, ready to serve requests.
///
/// Built once at startup and cloned cheaply: clones share the handler and
/// the [`BufferPool`].
///
/// ```rust
/// use bindery::results::StatusCodeResult;
/// use bindery::{Action, InputModel, Request, Response};
/// use http::StatusCode;
///
/// #[derive(Default)]
/// struct Ping;
/// impl InputModel for Ping {}
///
/// let action = Action::new(|_: Ping| StatusCodeResult::new(StatusCode::OK, "pong"));
/// let request: Request = http::Request::new(bytes::Bytes::new()).into();
/// let response: Response = action.serve(&request);
/// assert_eq!(response.body(), b"pong");
/// ```
#[derive(Clone)]
pub struct Action {
    inner: BoxedAction,
    pool: Arc<BufferPool>,
}

impl Action {
    /// Wraps `handler`, building each request's model with `Default`.
    pub fn new<H, Args>(handler: H) -> Self
    where
        H: Handler<Args>,
        H::Model: Default,
    {
        Self::erased(handler.into_erased(Box::new(|| Some(H::Model::default()))))
    }

    /// Wraps `handler`, building each request's model with `factory`.
    ///
    /// # Panics
    ///
    /// Panics if `factory` does not produce the handler's model type.
    pub fn from_factory<H, Args, Fac, N>(factory: Fac, handler: H) -> Self
    where
        H: Handler<Args>,
        Fac: Fn() -> N + Send + Sync + 'static,
        N: 'static,
    {
        if TypeId::of::<N>() != TypeId::of::<H::Model>() {
            panic!(
                "Controller requires input model of type: [{}] Factory function provided input model of type: [{}]",
                type_name::<H::Model>(),
                type_name::<N>(),
            );
        }

        let factory: Factory<H::Model> = Box::new(move || {
            let mut product = Some(factory());
            (&mut product as &mut dyn Any)
                .downcast_mut::<Option<H::Model>>()
                .and_then(Option::take)
        });
        Self::erased(handler.into_erased(factory))
    }

    pub(crate) fn erased(inner: BoxedAction) -> Self {
        Self { inner, pool: Arc::new(BufferPool::default()) }
    }

    /// Renders into buffers from `pool` instead of a private one.
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Runs the pipeline and handler for one request.
    ///
    /// Whatever was rendered is flushed into a fresh [`Response`]; if nothing
    /// was, the result is `200 OK` with an empty body. The buffer goes back to
    /// the pool on every path.
    pub fn serve(&self, request: &Request) -> Response {
        let mut buffer = self.pool.acquire();
        self.inner.call(request, &mut buffer);

        let mut response = Response::new();
        buffer.flush(&mut response);
        trace!(
            method = %request.method(),
            path = request.path(),
            status = response.status().as_u16(),
            "served"
        );
        response
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("pool", &self.pool).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::capability::{Bind, CheckServerError};
    use crate::errors::ModelError;
    use crate::render::Nop;
    use crate::results::ContentResult;

    fn get(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Bytes::new()).unwrap().into()
    }

    #[derive(Default)]
    struct Echo {
        text: String,
        fail: bool,
    }

    impl Bind for Echo {
        fn bind(&mut self, request: &Request) -> Result<(), ModelError> {
            self.text = request.form_value("text").unwrap_or_default().to_owned();
            Ok(())
        }
    }

    impl CheckServerError for Echo {
        fn server_error(&self) -> bool {
            self.fail
        }
    }

    impl InputModel for Echo {
        fn capabilities() -> Capabilities<Self> {
            Capabilities::none().bind().server_error()
        }
    }

    fn echo(model: Echo) -> ContentResult {
        ContentResult { content: model.text, ..Default::default() }
    }

    #[test]
    fn zero_argument_handler_is_called_directly() {
        let action = Action::new(|| StatusCodeResult::new(StatusCode::ACCEPTED, "accepted"));
        let response = action.serve(&get("/"));
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.body(), b"accepted");
    }

    #[test]
    fn model_handler_receives_bound_model() {
        let response = Action::new(echo).serve(&get("/?text=hi"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"hi");
    }

    #[test]
    fn factory_builds_each_model() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let action = Action::from_factory(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Echo { fail: true, ..Default::default() }
            },
            echo,
        );

        let response = action.serve(&get("/"));
        action.serve(&get("/"));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), b"Internal Server Error");
    }

    #[test]
    #[should_panic(expected = "Factory function provided input model of type: [alloc::string::String]")]
    fn mismatched_factory_panics_at_construction() {
        let _ = Action::from_factory(String::new, echo);
    }

    #[test]
    fn nothing_rendered_is_empty_ok() {
        let action = Action::new(|| None::<Nop>);
        let response = action.serve(&get("/"));
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().is_empty());
    }

    #[test]
    fn buffers_return_to_shared_pool() {
        let pool = Arc::new(BufferPool::new(4));
        let action = Action::new(echo).with_pool(Arc::clone(&pool));
        let clone = action.clone();

        action.serve(&get("/?text=one"));
        let response = clone.serve(&get("/?text=two"));
        assert_eq!(response.body(), b"two");
        assert_eq!(pool.idle(), 1);
        assert!(Arc::ptr_eq(action.pool(), &pool));
    }
}
