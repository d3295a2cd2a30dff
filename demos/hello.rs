//! The say-hello app: bind, sanitize, validate, then greet.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example hello
//!
//! Try:
//!   curl 'http://localhost:8080/?name=Ann'
//!   curl 'http://localhost:8080/?name=%20%20'            # 422, JSON errors
//!   curl -X POST http://localhost:8080/ -d 'name=Bob'
//!   curl 'http://localhost:8080/?name=Ann&debug=1'       # diagnostic page

use bindery::results::ContentResult;
use bindery::{
    Action, Bind, Capabilities, DiagnosticErrors, Errors, FieldError, InputModel, ModelError,
    Request, Sanitize, Server, Validate,
};
use tracing_subscriber::EnvFilter;

#[derive(Default)]
struct SayHello {
    name: String,
    diagnostic: bool,
}

impl Bind for SayHello {
    fn bind(&mut self, request: &Request) -> Result<(), ModelError> {
        self.name = request.form_value("name").unwrap_or_default().to_owned();
        self.diagnostic = request.form_value("debug").is_some();
        Ok(())
    }
}

impl Sanitize for SayHello {
    fn sanitize(&mut self) {
        self.name = self.name.trim().to_owned();
    }
}

impl Validate for SayHello {
    fn validate(&self) -> Result<(), ModelError> {
        let missing = FieldError::simple("The name is required", "name");
        let too_long = FieldError::simple("The name must be at most 32 characters", "name");

        if self.diagnostic {
            let errors = DiagnosticErrors::new()
                .append_if(missing, self.name.is_empty())
                .append_if(too_long, self.name.len() > 32)
                .append(FieldError::message("diagnostics were requested"));
            return Err(errors.into());
        }

        let errors = Errors::new()
            .append_if(missing, self.name.is_empty())
            .append_if(too_long, self.name.len() > 32);
        if errors.is_empty() { Ok(()) } else { Err(errors.into()) }
    }
}

impl InputModel for SayHello {
    fn capabilities() -> Capabilities<Self> {
        Capabilities::none().bind().sanitize().validate()
    }
}

fn say_hello(model: SayHello) -> ContentResult {
    ContentResult { content: format!("Hello, {}!", model.name), ..Default::default() }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bindery=debug")),
        )
        .init();

    let addr = std::env::var("BINDERY_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_owned());

    Server::bind(&addr)
        .serve(Action::new(say_hello))
        .await
        .expect("server error");
}
