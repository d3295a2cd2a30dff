//! Test doubles for detours.
//!
//! [`Fixture`] builds a request from plain fields, serves it through
//! [`Action::detour`] with a [`FakeHandler`], and keeps the response and a
//! readable dump of both sides for assertions.
//!
//! ```rust
//! use bindery::testing::Fixture;
//! # use std::any::Any;
//! # use bindery::results::StatusCodeResult;
//! # use bindery::{Detour, MessageHandler, Request};
//! # use http::{Extensions, StatusCode};
//! # #[derive(Default)]
//! # struct Refund { order: String, approved: bool }
//! # impl Detour for Refund {
//! #     type Rejected = StatusCodeResult;
//! #     type Output = StatusCodeResult;
//! #     fn bind(&mut self, request: &Request) -> Result<(), StatusCodeResult> {
//! #         self.order = request.query("order").unwrap_or_default();
//! #         Ok(())
//! #     }
//! #     fn handle(mut self, context: &Extensions, handler: &dyn MessageHandler) -> StatusCodeResult {
//! #         let message: &mut (dyn Any + Send + 'static) = &mut self;
//! #         handler.handle(context, &mut [message]);
//! #         let status = if self.approved { StatusCode::OK } else { StatusCode::FORBIDDEN };
//! #         StatusCodeResult::new(status, self.order)
//! #     }
//! # }
//!
//! let mut fixture = Fixture::new();
//! fixture.set_query("order", "A-1");
//! fixture.handler.prepare(|refund: &mut Refund| refund.approved = true);
//!
//! fixture.run(Refund::default).unwrap();
//!
//! assert_eq!(fixture.response_status, 200);
//! assert_eq!(fixture.response_body, "A-1");
//! assert_eq!(fixture.handler.handle_count(), 1);
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, StatusCode};
use serde_json::{Map, Value};

use crate::detour::{Detour, MessageHandler};
use crate::handler::Action;
use crate::request::Request;
use crate::response::Response;

type Callback = Box<dyn Fn(&mut (dyn Any + Send + 'static)) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── FakeHandler ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Handled {
    count: usize,
    context: Option<Extensions>,
    message_types: Vec<TypeId>,
}

/// A [`MessageHandler`] that records every call and runs prepared callbacks
/// on messages of matching type.
#[derive(Default)]
pub struct FakeHandler {
    handled: Mutex<Handled>,
    callbacks: Mutex<HashMap<TypeId, Callback>>,
}

impl FakeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `callback` on every later message of type `T`, replacing any
    /// callback prepared for `T` before.
    pub fn prepare<T, F>(&self, callback: F)
    where
        T: Any + Send,
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        let callback: Callback = Box::new(move |message: &mut (dyn Any + Send + 'static)| {
            if let Some(message) = message.downcast_mut::<T>() {
                callback(message);
            }
        });
        lock(&self.callbacks).insert(TypeId::of::<T>(), callback);
    }

    pub fn handle_count(&self) -> usize {
        lock(&self.handled).count
    }

    /// The extensions of the most recent call.
    pub fn context(&self) -> Option<Extensions> {
        lock(&self.handled).context.clone()
    }

    /// Types of the messages in the most recent call, in order.
    pub fn message_types(&self) -> Vec<TypeId> {
        lock(&self.handled).message_types.clone()
    }
}

impl MessageHandler for FakeHandler {
    fn handle(&self, context: &Extensions, messages: &mut [&mut (dyn Any + Send + 'static)]) {
        {
            let mut handled = lock(&self.handled);
            handled.count += 1;
            handled.context = Some(context.clone());
            handled.message_types = messages.iter().map(|message| Any::type_id(&**message)).collect();
        }

        let callbacks = lock(&self.callbacks);
        for message in messages.iter_mut() {
            if let Some(callback) = callbacks.get(&Any::type_id(&**message)) {
                callback(&mut **message);
            }
        }
    }
}

// ── Fixture ───────────────────────────────────────────────────────────────────

/// One request in, one response out.
///
/// The request fields are read by [`run`](Fixture::run); the response fields
/// and `dump` are written by it. `request_body` is sent as a JSON object.
pub struct Fixture {
    pub handler: Arc<FakeHandler>,

    pub request_method: Method,
    pub request_path: String,
    pub request_query: Vec<(String, String)>,
    pub request_body: Map<String, Value>,
    pub request_headers: HeaderMap,
    pub request_context: Extensions,

    pub response_status: StatusCode,
    pub response_headers: HeaderMap,
    pub response_body: String,

    pub dump: String,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            handler: Arc::new(FakeHandler::new()),
            request_method: Method::GET,
            request_path: "/".to_owned(),
            request_query: Vec::new(),
            request_body: Map::new(),
            request_headers: HeaderMap::new(),
            request_context: Extensions::new(),
            response_status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: String::new(),
            dump: String::new(),
        }
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` in the query string, replacing earlier values for it.
    pub fn set_query(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.request_query.retain(|(k, _)| *k != key);
        self.request_query.push((key, value.into()));
    }

    /// Serves the request fields through a detour from `factory` and the
    /// fixture's handler, then records the response.
    ///
    /// Fails only when the request fields do not form a valid request.
    pub fn run<D, F>(&mut self, factory: F) -> Result<(), http::Error>
    where
        D: Detour,
        F: Fn() -> D + Send + Sync + 'static,
    {
        let request = self.build_request()?;
        let action = Action::detour(factory, Arc::clone(&self.handler));
        let response = action.serve(&request);
        self.collect_response(response);
        Ok(())
    }

    /// The response body parsed as JSON.
    pub fn response_body_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.response_body)
    }

    fn build_request(&mut self) -> Result<Request, http::Error> {
        let mut uri = self.request_path.clone();
        if !self.request_query.is_empty() {
            uri.push('?');
            uri.push_str(&serde_urlencoded::to_string(&self.request_query).unwrap_or_default());
        }
        let body = serde_json::to_vec(&self.request_body).unwrap_or_default();

        let mut request = http::Request::builder()
            .method(self.request_method.clone())
            .uri(uri)
            .body(Bytes::from(body))?;
        *request.headers_mut() = self.request_headers.clone();
        *request.extensions_mut() = self.request_context.clone();

        let mut dump = format!("{} {} {:?}\n", request.method(), request.uri(), request.version());
        for (name, value) in request.headers() {
            let _ = writeln!(dump, "{name}: {}", value.to_str().unwrap_or("<binary>"));
        }
        dump.push('\n');
        dump.push_str(&String::from_utf8_lossy(request.body()));
        let _ = write!(self.dump, "REQUEST DUMP:\n{}\n\n", prefix_lines(">", &dump));

        Ok(request.into())
    }

    fn collect_response(&mut self, response: Response) {
        self.response_status = response.status();
        self.response_headers = response.headers().clone();
        self.response_body = String::from_utf8_lossy(response.body()).into_owned();

        let mut dump = format!("{}\n", self.response_status);
        for (name, value) in &self.response_headers {
            let _ = writeln!(dump, "{name}: {}", value.to_str().unwrap_or("<binary>"));
        }
        dump.push('\n');
        dump.push_str(&self.response_body);
        let _ = write!(self.dump, "RESPONSE DUMP:\n{}\n\n", prefix_lines("<", &dump));
    }
}

fn prefix_lines(prefix: &str, text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| format!("\n{prefix} {line}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::StatusCodeResult;

    #[derive(Debug, Default, PartialEq)]
    struct Ping(u32);

    #[derive(Default)]
    struct Pong;

    #[test]
    fn fake_handler_records_calls_and_runs_matching_callbacks() {
        let handler = FakeHandler::new();
        handler.prepare(|ping: &mut Ping| ping.0 += 1);

        let mut context = Extensions::new();
        context.insert(7_u8);
        let mut ping = Ping(1);
        let mut pong = Pong;
        let mut messages: [&mut (dyn Any + Send + 'static); 2] = [&mut ping, &mut pong];
        handler.handle(&context, &mut messages);

        assert_eq!(ping, Ping(2));
        assert_eq!(handler.handle_count(), 1);
        assert_eq!(handler.message_types(), [TypeId::of::<Ping>(), TypeId::of::<Pong>()]);
        assert_eq!(handler.context().and_then(|c| c.get::<u8>().copied()), Some(7));
    }

    struct Echo {
        body: String,
    }

    impl Detour for Echo {
        type Rejected = StatusCodeResult;
        type Output = StatusCodeResult;

        fn bind(&mut self, request: &Request) -> Result<(), StatusCodeResult> {
            self.body = String::from_utf8_lossy(request.body()).into_owned();
            match request.query("fail") {
                Some(_) => Err(StatusCodeResult::new(StatusCode::BAD_REQUEST, "failed")),
                None => Ok(()),
            }
        }

        fn handle(self, context: &Extensions, handler: &dyn MessageHandler) -> StatusCodeResult {
            handler.handle(context, &mut []);
            StatusCodeResult::new(StatusCode::ACCEPTED, self.body)
        }
    }

    #[test]
    fn fixture_sends_the_body_as_json_and_collects_the_response() {
        let mut fixture = Fixture::new();
        fixture.request_body.insert("amount".into(), Value::from(12));
        fixture.request_headers.insert("x-trace", "t-1".parse().unwrap());

        fixture.run(|| Echo { body: String::new() }).unwrap();

        assert_eq!(fixture.response_status, StatusCode::ACCEPTED);
        assert_eq!(fixture.response_body_json().unwrap(), serde_json::json!({ "amount": 12 }));
        assert_eq!(fixture.handler.handle_count(), 1);
        assert!(fixture.dump.starts_with("REQUEST DUMP:\n\n> GET / HTTP/1.1\n> x-trace: t-1"));
        assert!(fixture.dump.contains("RESPONSE DUMP:\n\n< 202 Accepted\n"));
    }

    #[test]
    fn set_query_replaces_earlier_values() {
        let mut fixture = Fixture::new();
        fixture.set_query("fail", "no");
        fixture.set_query("fail", "yes");
        assert_eq!(fixture.request_query, [("fail".to_owned(), "yes".to_owned())]);

        fixture.run(|| Echo { body: String::new() }).unwrap();
        assert_eq!(fixture.response_status, StatusCode::BAD_REQUEST);
        assert_eq!(fixture.handler.handle_count(), 0);
    }
}
