//! The input-model pipeline.
//!
//! ```text
//! constructed ─► bind ─► sanitize ─► validate ─► server-error check ─► handler
//!                  │                    │                 │
//!                  └────────────────────┴─────────────────┴──► Rejection ─► render
//! ```
//!
//! Each step runs only if the model's [`Capabilities`] list it. The first
//! failing step ends the run with a [`Rejection`]; nothing is revisited.

use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use tracing::debug;

use crate::buffer::ResponseBuffer;
use crate::capability::Capabilities;
use crate::diagnostic::DiagnosticResult;
use crate::errors::{ModelError, StatusError};
use crate::render::Render;
use crate::request::Request;
use crate::results::{ErrorResult, StatusCodeResult};

/// The stage a rejection came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Bind,
    Validate,
    ServerError,
}

impl Stage {
    fn default_status(self) -> StatusCode {
        match self {
            Self::Bind => StatusCode::BAD_REQUEST,
            Self::Validate => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A pipeline run that ended before the handler.
#[derive(Debug)]
pub struct Rejection {
    pub stage: Stage,
    pub status: StatusCode,
    pub error: ModelError,
}

impl Rejection {
    /// Uses the status the error carries, else the stage default.
    fn at(stage: Stage, error: ModelError) -> Self {
        let status = error.status_code().unwrap_or_else(|| stage.default_status());
        Self { stage, status, error }
    }

    fn server_error() -> Self {
        Self {
            stage: Stage::ServerError,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: StatusError(StatusCode::INTERNAL_SERVER_ERROR).into(),
        }
    }
}

impl Render for Rejection {
    fn render(&self, request: &Request, response: &mut ResponseBuffer) {
        match &self.error {
            ModelError::Errors(errors) => {
                ErrorResult::new(self.status, errors.clone()).render(request, response)
            }
            ModelError::Diagnostic(errors) => {
                let reason = self.status.canonical_reason().unwrap_or("Error");
                DiagnosticResult::new(self.status, format!("{reason}\n\n{errors}"))
                    .render(request, response)
            }
            ModelError::Renderer(renderer) => renderer.render(request, response),
            ModelError::Other(err) => {
                StatusCodeResult::new(self.status, err.to_string()).render(request, response)
            }
        }
    }
}

/// Runs every step `capabilities` lists against `model`, in order.
pub fn prepare<M>(
    model: &mut M,
    capabilities: &Capabilities<M>,
    request: &Request,
) -> Result<(), Rejection> {
    bind(model, capabilities, request).map_err(|e| reject(Stage::Bind, e))?;

    if let Some(sanitize) = capabilities.sanitize {
        sanitize(model);
    }

    if let Some(validate) = capabilities.validate {
        excuse_empty(validate(model)).map_err(|e| reject(Stage::Validate, e))?;
    }

    if let Some(server_error) = capabilities.server_error {
        if server_error(model) {
            debug!(stage = ?Stage::ServerError, status = 500, "input model reported a server error");
            return Err(Rejection::server_error());
        }
    }

    Ok(())
}

fn reject(stage: Stage, error: ModelError) -> Rejection {
    let rejection = Rejection::at(stage, error);
    debug!(stage = ?stage, status = rejection.status.as_u16(), "input model rejected: {}", rejection.error);
    rejection
}

fn bind<M>(model: &mut M, capabilities: &Capabilities<M>, request: &Request) -> Result<(), ModelError> {
    if let Some(bind_context) = capabilities.context {
        bind_context(model, request.extensions());
    }

    if let Some(decode) = capabilities.json_body {
        if !writes_body(request.method()) {
            return Err(StatusError(StatusCode::METHOD_NOT_ALLOWED).into());
        }
        if !has_json_content(request) {
            return Err(StatusError(StatusCode::UNSUPPORTED_MEDIA_TYPE).into());
        }
        decode(model, request.body())?;
    }

    let Some(bind) = capabilities.bind else {
        return Ok(());
    };
    request.parse_form()?;
    excuse_empty(bind(model, request))
}

/// An empty error collection is not an error.
fn excuse_empty(result: Result<(), ModelError>) -> Result<(), ModelError> {
    match result {
        Err(err) if err.is_empty() => Ok(()),
        other => other,
    }
}

fn writes_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT
}

fn has_json_content(request: &Request) -> bool {
    request
        .header(CONTENT_TYPE.as_str())
        .is_some_and(|ct| ct.contains("/json"))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::capability::{Bind, CheckServerError, Sanitize, Validate};
    use crate::errors::{DiagnosticErrors, Errors, FieldError};
    use crate::response::Response;

    fn get(uri: &str) -> Request {
        http::Request::builder().uri(uri).body(Bytes::new()).unwrap().into()
    }

    fn with_body(method: &str, content_type: &str, body: &'static str) -> Request {
        http::Request::builder()
            .method(method)
            .uri("/")
            .header("content-type", content_type)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
            .into()
    }

    fn render(rejection: &Rejection, request: &Request) -> Response {
        let mut buffer = ResponseBuffer::new();
        rejection.render(request, &mut buffer);
        let mut response = Response::new();
        buffer.flush(&mut response);
        response
    }

    #[derive(Debug, Default, Deserialize, Serialize)]
    struct Model {
        #[serde(default)]
        content: String,
        #[serde(skip)]
        trace: Vec<&'static str>,
        #[serde(skip)]
        bind_error: Option<FieldError>,
        #[serde(skip)]
        empty_bind_errors: bool,
        #[serde(skip)]
        validate_error: Option<FieldError>,
        #[serde(skip)]
        diagnostic: bool,
        #[serde(skip)]
        empty_validate_errors: bool,
        #[serde(skip)]
        fail_server: bool,
    }

    impl Bind for Model {
        fn bind(&mut self, request: &Request) -> Result<(), ModelError> {
            self.trace.push("bind");
            if let Some(value) = request.form_value("binding") {
                self.content = value.to_owned();
            }
            if self.empty_bind_errors {
                return Err(Errors::new().append(None::<FieldError>).into());
            }
            match self.bind_error.clone() {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        }
    }

    impl Sanitize for Model {
        fn sanitize(&mut self) {
            self.trace.push("sanitize");
            self.content = self.content.trim().to_owned();
        }
    }

    impl Validate for Model {
        fn validate(&self) -> Result<(), ModelError> {
            if self.empty_validate_errors {
                return if self.diagnostic {
                    Err(DiagnosticErrors::new().into())
                } else {
                    Err(Errors::new().into())
                };
            }
            match (&self.validate_error, self.diagnostic) {
                (Some(err), true) => Err(DiagnosticErrors::new().append(err.clone()).into()),
                (Some(err), false) => Err(err.clone().into()),
                (None, _) => Ok(()),
            }
        }
    }

    impl CheckServerError for Model {
        fn server_error(&self) -> bool {
            self.fail_server
        }
    }

    fn all() -> Capabilities<Model> {
        Capabilities::none().bind().sanitize().validate().server_error()
    }

    #[test]
    fn no_capabilities_leaves_model_untouched() {
        let mut model = Model::default();
        prepare(&mut model, &Capabilities::none(), &get("/?binding=Hello")).unwrap();
        assert!(model.trace.is_empty());
        assert_eq!(model.content, "");
    }

    #[test]
    fn steps_run_in_order() {
        let mut model = Model::default();
        prepare(&mut model, &all(), &get("/?binding=%20Hello%20")).unwrap();
        assert_eq!(model.trace, ["bind", "sanitize"]);
        assert_eq!(model.content, "Hello");
    }

    #[test]
    fn bind_failure_is_bad_request_and_skips_the_rest() {
        let mut model = Model { bind_error: Some(FieldError::simple("bad", "x")), ..Default::default() };
        let rejection = prepare(&mut model, &all(), &get("/")).unwrap_err();
        assert_eq!(rejection.stage, Stage::Bind);
        assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
        assert_eq!(model.trace, ["bind"]);
    }

    #[test]
    fn bind_failure_carrying_status_overrides_default() {
        let err = FieldError::simple("teapot", "x").with_status(StatusCode::IM_A_TEAPOT);
        let mut model = Model { bind_error: Some(err), ..Default::default() };
        let rejection = prepare(&mut model, &all(), &get("/")).unwrap_err();
        assert_eq!(rejection.status, StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn empty_bind_errors_are_success() {
        let mut model = Model { empty_bind_errors: true, ..Default::default() };
        prepare(&mut model, &all(), &get("/")).unwrap();
        assert_eq!(model.trace, ["bind", "sanitize"]);
    }

    #[test]
    fn validation_failure_is_unprocessable_with_json_body() {
        let err = FieldError::simple("X is required", "x");
        let mut model = Model { validate_error: Some(err), ..Default::default() };
        let request = get("/");
        let rejection = prepare(&mut model, &all(), &request).unwrap_err();
        assert_eq!(rejection.stage, Stage::Validate);

        let response = render(&rejection, &request);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.body(), br#"[{"fields":["x"],"message":"X is required"}]"#);
    }

    #[test]
    fn empty_validation_collections_of_either_flavor_are_success() {
        for diagnostic in [false, true] {
            let mut model = Model { empty_validate_errors: true, diagnostic, ..Default::default() };
            assert!(prepare(&mut model, &all(), &get("/")).is_ok());
        }
    }

    #[test]
    fn diagnostic_validation_failure_renders_text() {
        let err = FieldError::message("name is required");
        let mut model = Model { validate_error: Some(err), diagnostic: true, ..Default::default() };
        let request = get("/");
        let rejection = prepare(&mut model, &all(), &request).unwrap_err();

        let response = render(&rejection, &request);
        let body = std::str::from_utf8(response.body()).unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.starts_with("422 Unprocessable Entity\n\nErrors:\n\n- name is required"));
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[test]
    fn server_error_is_500_plain_text() {
        let mut model = Model { fail_server: true, ..Default::default() };
        let request = get("/");
        let rejection = prepare(&mut model, &all(), &request).unwrap_err();
        assert_eq!(rejection.stage, Stage::ServerError);

        let response = render(&rejection, &request);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), b"Internal Server Error");
    }

    #[test]
    fn renderer_errors_render_themselves() {
        struct Teapot;
        impl Render for Teapot {
            fn render(&self, _: &Request, response: &mut ResponseBuffer) {
                response.set_status(StatusCode::IM_A_TEAPOT);
                response.write(b"custom");
            }
        }

        let request = get("/");
        let rejection = Rejection::at(Stage::Bind, ModelError::renderer(Teapot));
        assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
        let response = render(&rejection, &request);
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.body(), b"custom");
    }

    #[test]
    fn user_error_with_status_overrides_stage_default() {
        let request = get("/");
        let err = ModelError::with_status(StatusCode::CONFLICT, "name already taken");
        let rejection = Rejection::at(Stage::Validate, err);
        assert_eq!(rejection.status, StatusCode::CONFLICT);

        let response = render(&rejection, &request);
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(response.body(), b"name already taken");
    }

    #[test]
    fn json_body_decodes_for_post() {
        let caps = Capabilities::<Model>::none().json_body().bind();
        let mut model = Model::default();
        let request = with_body("POST", "application/json; charset=utf-8", r#"{"content":"from body"}"#);
        prepare(&mut model, &caps, &request).unwrap();
        assert_eq!(model.content, "from body");
        assert_eq!(model.trace, ["bind"]);
    }

    #[test]
    fn json_body_keeps_what_the_body_does_not_mention() {
        let caps = Capabilities::<Model>::none().json_body();
        let mut model = Model { content: "preset".into(), fail_server: true, ..Default::default() };
        prepare(&mut model, &caps, &with_body("PUT", "application/json", "{}")).unwrap();
        assert_eq!(model.content, "preset");
        assert!(model.fail_server);
    }

    #[test]
    fn json_body_rejects_read_methods() {
        let caps = Capabilities::<Model>::none().json_body();
        let request = with_body("GET", "application/json", "{}");
        let rejection = prepare(&mut Model::default(), &caps, &request).unwrap_err();
        assert_eq!(rejection.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(render(&rejection, &request).body(), b"Method Not Allowed");
    }

    #[test]
    fn json_body_rejects_other_content_types() {
        let caps = Capabilities::<Model>::none().json_body();
        let request = with_body("PUT", "text/plain", "{}");
        let rejection = prepare(&mut Model::default(), &caps, &request).unwrap_err();
        assert_eq!(rejection.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn malformed_json_skips_bind() {
        let caps = Capabilities::<Model>::none().json_body().bind();
        let mut model = Model::default();
        let request = with_body("POST", "application/json", "{not json");
        let rejection = prepare(&mut model, &caps, &request).unwrap_err();
        assert_eq!(rejection.status, StatusCode::BAD_REQUEST);
        assert!(model.trace.is_empty());
    }
}
