//! Human-readable diagnostic pages.
//!
//! A diagnostic response is plain text meant for the developer at the other
//! end of a `curl`: a status line, the message, a dump of the request as the
//! server saw it, and a disclaimer. The request body is never echoed, and
//! headers outside a short list of well-known names are left out unless
//! [`DiagnosticResult::dump_non_canonical_headers`] is set.

use std::fmt::Write as _;

use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;

use crate::buffer::ResponseBuffer;
use crate::render::{Render, write_content};
use crate::request::Request;
use crate::response::ContentType;

/// Headers always included in the request dump.
const CANONICAL_HEADERS: [HeaderName; 10] = [
    header::ACCEPT,
    header::ACCEPT_ENCODING,
    header::ACCEPT_LANGUAGE,
    header::CACHE_CONTROL,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
    header::ORIGIN,
    header::REFERER,
    header::USER_AGENT,
];

const DISCLAIMER: &str = "\
This is a diagnostic response. It describes the request exactly as the server
received it so that problems can be reproduced. It is not part of any API
contract and may change without notice.";

/// A plain-text diagnostic page.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticResult {
    pub status: StatusCode,
    pub message: String,
    pub headers: HeaderMap,
    pub dump_non_canonical_headers: bool,
}

impl DiagnosticResult {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), ..Default::default() }
    }
}

impl Render for DiagnosticResult {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            headers.append(name, value.clone());
        }
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

        let mut body = format!("{} {}", self.status.as_u16(), self.message);
        body.push_str("\n\n");
        body.push_str(&dump_request(request, self.dump_non_canonical_headers));
        body.push_str("\n\n");
        body.push_str(DISCLAIMER);
        body.push('\n');

        write_content(response, self.status, ContentType::Text.as_str(), body.as_bytes());
    }
}

/// Request line and headers, each prefixed with `"> "`, closed by a lone `">"`.
pub(crate) fn dump_request(request: &Request, include_non_canonical: bool) -> String {
    let uri = request.uri();
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());

    let mut dump = String::new();
    let _ = writeln!(dump, "> {} {} {:?}", request.method(), target, request.version());

    let host = request
        .header(header::HOST.as_str())
        .map(str::to_owned)
        .or_else(|| uri.authority().map(|a| a.to_string()));
    if let Some(host) = host {
        let _ = writeln!(dump, "> Host: {host}");
    }

    for (name, value) in request.headers() {
        if *name == header::HOST {
            continue;
        }
        if !include_non_canonical && !CANONICAL_HEADERS.contains(name) {
            continue;
        }
        let value = value.to_str().unwrap_or("<binary>");
        let _ = writeln!(dump, "> {}: {value}", title_case(name.as_str()));
    }
    dump.push('>');
    dump
}

/// `content-type` → `Content-Type`.
fn title_case(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
