//! Integration tests for common Conduit workflows.
//!
//! These tests go through the facade crate the way an application would.

use conduit::prelude::*;
use conduit::{RouteNotFoundError, Severity};
use http::{Method, StatusCode, Uri};
use serde_json::json;
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

struct GreetingController;

#[async_trait]
impl Controller for GreetingController {
    fn reflect(&self, method: &str) -> Option<MethodInfo> {
        match method {
            "greet" => {
                let signature = ActionSignature::builder()
                    .param(FormalParameter::string("name"))
                    .param(FormalParameter::string("punctuation").with_default("!"))
                    .build()
                    .ok()?;
                Some(MethodInfo::public(signature))
            }
            "teapot" => Some(MethodInfo::public(ActionSignature::empty())),
            _ => None,
        }
    }

    async fn call(&self, method: &str, args: Arguments) -> anyhow::Result<ActionResult> {
        match method {
            "greet" => {
                let greeting = format!("Hello, {}{}", args.string("name")?, args.string("punctuation")?);
                Ok(ActionResult::value(&greeting)?)
            }
            "teapot" => Err(HttpException::new(StatusCode::IM_A_TEAPOT, "short and stout").into()),
            other => anyhow::bail!("unexpected method {other}"),
        }
    }
}

fn router(request: &Request) -> Option<MatchedRoute> {
    let path = request.path();
    if let Some(name) = path.strip_prefix("/greet/") {
        let action = RouteAction::method::<GreetingController>("greet");
        return Some(MatchedRoute::new(action).with_var("name", name));
    }
    if path == "/teapot" {
        return Some(MatchedRoute::new(RouteAction::method::<GreetingController>("teapot")));
    }
    if path == "/ping" {
        let action = RouteAction::function(ActionSignature::empty(), |_args: Arguments| async {
            Ok::<_, anyhow::Error>(ActionResult::from(Response::ok().with_body("pong")))
        });
        return Some(MatchedRoute::new(action));
    }
    None
}

fn kernel() -> Kernel {
    let container = Container::new();
    container.register(GreetingController);
    Kernel::with_resolver(Arc::new(router), Arc::new(container))
}

fn get(uri: &'static str) -> Request {
    Request::new(Method::GET, Uri::from_static(uri))
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_controller_action_with_default_parameter() {
    let response = kernel().handle(get("/greet/ada")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body_text(), Some(r#""Hello, ada!""#));
}

#[tokio::test]
async fn test_query_overrides_default() {
    let response = kernel()
        .handle(get("/greet/ada?punctuation=.").with_header("Accept", "text/plain"))
        .await;

    assert_eq!(response.body_text(), Some("Hello, ada."));
}

#[tokio::test]
async fn test_closure_returning_response() {
    let response = kernel().handle(get("/ping")).await;
    assert_eq!(response, Response::ok().with_body("pong"));
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_http_exception_from_action() {
    let response = kernel().handle(get("/teapot")).await;
    assert_eq!(response.status, StatusCode::IM_A_TEAPOT);
}

#[tokio::test]
async fn test_not_found_with_custom_body() {
    let mut registry = ExceptionResponseFactoryRegistry::with_defaults();
    registry.register::<RouteNotFoundError, _>(|err, ctx| {
        conduit::NotFoundResponseFactory::with_body(json!({ "missing": err.path }))
            .build(ctx.response_negotiation)
    });
    let kernel = kernel().with_exception_handler(ExceptionHandler::new(registry));

    let response = kernel
        .handle(get("/nowhere").with_header("Accept", "application/json"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body_text(), Some(r#"{"missing":"/nowhere"}"#));
}

#[test]
fn test_diagnostics_follow_default_policy() {
    let handler = ExceptionHandler::default();
    assert!(handler.handle_diagnostic(Severity::Deprecation, "old").is_ok());
    assert!(handler.handle_diagnostic(Severity::Error, "bad").is_err());
}

#[test]
fn test_blocking_dispatch() {
    let response = tokio_test::block_on(kernel().handle(get("/greet/bob")));
    assert_eq!(response.status, StatusCode::OK);
}

#[cfg(feature = "config")]
#[test]
fn test_kernel_from_settings() {
    let settings = SettingsLoader::new()
        .vars([("CONDUIT_NEGOTIATION__FORMATTERS", "text")])
        .build()
        .unwrap();
    let kernel = settings.configure(kernel()).unwrap();

    let response = tokio_test::block_on(kernel.handle(get("/greet/eve")));
    assert_eq!(response.body_text(), Some("Hello, eve!"));
}
