//! Incoming HTTP request view.
//!
//! The pipeline only ever reads a request: method, headers, query string,
//! form values and the raw body. [`Request`] owns the already-collected body,
//! so nothing here blocks.

use std::net::SocketAddr;
use std::sync::OnceLock;

use bytes::Bytes;
use http::header::{self, HeaderMap};
use http::request::Parts;
use http::{Extensions, Method, Uri, Version};

/// Failure to parse query-string or urlencoded body values.
#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("malformed query string: {0}")]
    Query(#[source] serde_urlencoded::de::Error),
    #[error("malformed form body: {0}")]
    Body(#[source] serde_urlencoded::de::Error),
}

/// The address of the connected peer, as seen by the server.
///
/// [`Server`](crate::Server) inserts it into every request's extensions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PeerAddr(pub SocketAddr);

/// An incoming HTTP request with its body fully read.
pub struct Request {
    parts: Parts,
    body: Bytes,
    form: OnceLock<Vec<(String, String)>>,
}

impl Request {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self { parts, body, form: OnceLock::new() }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn version(&self) -> Version { self.parts.version }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn extensions(&self) -> &Extensions { &self.parts.extensions }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.parts.extensions.get::<PeerAddr>().map(|peer| peer.0)
    }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// First value of a query-string parameter. Malformed query strings
    /// yield `None`.
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.parts.uri.query()?;
        serde_urlencoded::from_str::<Vec<(String, String)>>(query)
            .ok()?
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Parses query-string and urlencoded body values, once.
    ///
    /// Body values come first, so `form_value` prefers them over query
    /// parameters of the same name. Only `POST`, `PUT` and `PATCH` requests
    /// with an `application/x-www-form-urlencoded` content type contribute
    /// body values.
    pub fn parse_form(&self) -> Result<&[(String, String)], FormError> {
        if let Some(form) = self.form.get() {
            return Ok(form);
        }

        let mut values = Vec::new();
        if self.has_form_body() {
            let body: Vec<(String, String)> =
                serde_urlencoded::from_bytes(&self.body).map_err(FormError::Body)?;
            values.extend(body);
        }
        if let Some(query) = self.parts.uri.query() {
            let query: Vec<(String, String)> =
                serde_urlencoded::from_str(query).map_err(FormError::Query)?;
            values.extend(query);
        }

        Ok(self.form.get_or_init(|| values))
    }

    /// First parsed form value for `name`; `None` when absent or when the
    /// form cannot be parsed.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.parse_form()
            .ok()?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn has_form_body(&self) -> bool {
        let method = &self.parts.method;
        let writes = *method == Method::POST || *method == Method::PUT || *method == Method::PATCH;
        writes
            && self
                .header(header::CONTENT_TYPE.as_str())
                .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, uri: &str, content_type: Option<&str>, body: &'static [u8]) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        builder.body(Bytes::from_static(body)).unwrap().into()
    }

    #[test]
    fn query_lookup_decodes_values() {
        let req = request("GET", "/?name=Hello%20World&x=1", None, b"");
        assert_eq!(req.query("name").as_deref(), Some("Hello World"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = request("GET", "/", Some("application/json"), b"");
        assert_eq!(req.header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn form_prefers_body_values_over_query() {
        let req = request(
            "POST",
            "/?name=query&only=q",
            Some("application/x-www-form-urlencoded"),
            b"name=body",
        );
        assert_eq!(req.form_value("name"), Some("body"));
        assert_eq!(req.form_value("only"), Some("q"));
    }

    #[test]
    fn form_body_ignored_for_get() {
        let req = request("GET", "/", Some("application/x-www-form-urlencoded"), b"name=body");
        assert_eq!(req.form_value("name"), None);
    }

    #[test]
    fn peer_address_comes_from_extensions() {
        let mut req = http::Request::new(Bytes::new());
        let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        req.extensions_mut().insert(PeerAddr(addr));
        let req: Request = req.into();
        assert_eq!(req.peer_addr(), Some(addr));
        assert_eq!(request("GET", "/", None, b"").peer_addr(), None);
    }

    #[test]
    fn parsed_form_is_cached() {
        let req = request("GET", "/?a=1&b=2", None, b"");
        let first = req.parse_form().unwrap().as_ptr();
        let second = req.parse_form().unwrap().as_ptr();
        assert_eq!(first, second);
        assert_eq!(req.parse_form().unwrap().len(), 2);
    }
}
