//! Tests for route action invocation.

use conduit_core::*;
use ::http::{Method, StatusCode, Uri};
use serde::Deserialize;
use serde_json::json;
use std::error::Error as StdError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("user {0} is banned")]
struct Banned(String);

#[derive(Default)]
struct UserController {
    calls: Arc<AtomicUsize>,
}

impl UserController {
    fn show_signature() -> ActionSignature {
        ActionSignature::builder()
            .param(FormalParameter::string("name"))
            .build()
            .unwrap()
    }

    fn create_signature() -> ActionSignature {
        ActionSignature::builder()
            .param(FormalParameter::body::<NewUser>("user"))
            .build()
            .unwrap()
    }
}

#[async_trait]
impl Controller for UserController {
    fn reflect(&self, method: &str) -> Option<MethodInfo> {
        match method {
            "index" | "noop" | "fail" => Some(MethodInfo::public(ActionSignature::empty())),
            "show" => Some(MethodInfo::public(Self::show_signature())),
            "create" => Some(MethodInfo::public(Self::create_signature())),
            "helper" => Some(MethodInfo::private(ActionSignature::empty())),
            "internal" => Some(MethodInfo::protected(ActionSignature::empty())),
            _ => None,
        }
    }

    async fn call(&self, method: &str, mut args: Arguments) -> anyhow::Result<ActionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match method {
            "index" => Ok(ActionResult::value(&["alice", "bob"])?),
            "noop" => Ok(ActionResult::NoContent),
            "fail" => Err(Banned("mallory".into()).into()),
            "show" => Ok(ActionResult::value(&args.string("name")?)?),
            "create" => {
                let user: NewUser = args.take_body("user")?;
                Ok(ActionResult::factory(
                    CreatedResponseFactory::at(format!("/users/{}", user.name)).body(json!({"name": user.name})),
                ))
            }
            other => anyhow::bail!("unexpected method {other}"),
        }
    }
}

struct Fixture {
    invoker: RouteActionInvoker,
    calls: Arc<AtomicUsize>,
}

fn fixture() -> Fixture {
    let controller = UserController::default();
    let calls = controller.calls.clone();
    let container = Container::new();
    container.register(controller);
    Fixture {
        invoker: RouteActionInvoker::new(Arc::new(container)),
        calls,
    }
}

fn plain_text() -> ContentNegotiationResult {
    ContentNegotiationResult::new(
        Arc::new(PlainTextMediaTypeFormatter::new()),
        Some(MediaType::plain_text()),
        None,
    )
}

fn json_result() -> ContentNegotiationResult {
    ContentNegotiationResult::new(Arc::new(JsonMediaTypeFormatter::new()), Some(MediaType::json()), None)
}

fn context_for(action: RouteAction, request: Request) -> RequestContext {
    RequestContext::new(request, None, Some(json_result()), MatchedRoute::new(action))
}

fn get(uri: &'static str) -> Request {
    Request::new(Method::GET, Uri::from_static(uri))
}

async fn invoke(fixture: &Fixture, ctx: &RequestContext) -> Result<Response, Error> {
    fixture.invoker.invoke_route_action(ctx.route_action(), ctx).await
}

fn http_exception(err: &Error) -> &HttpException {
    match err {
        Error::Http(ex) => ex,
        other => panic!("expected an HTTP exception, got {other:?}"),
    }
}

// =============================================================================
// Controller Methods
// =============================================================================

#[tokio::test]
async fn test_method_without_parameters_returns_ok() {
    let fixture = fixture();
    let ctx = context_for(RouteAction::method::<UserController>("index"), get("/users"));

    let response = invoke(&fixture, &ctx).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body_text(), Some(r#"["alice","bob"]"#));
    assert_eq!(response.content_type(), Some("application/json"));
}

#[tokio::test]
async fn test_method_returning_nothing_is_no_content() {
    let fixture = fixture();
    let ctx = context_for(RouteAction::method::<UserController>("noop"), get("/"));

    let response = invoke(&fixture, &ctx).await.unwrap();
    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.body.is_none());
}

#[tokio::test]
async fn test_action_error_propagates_unchanged() {
    let fixture = fixture();
    let ctx = context_for(RouteAction::method::<UserController>("fail"), get("/"));

    let err = invoke(&fixture, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Action);
    let banned = err.inner().downcast_ref::<Banned>().expect("action error kept");
    assert_eq!(banned.0, "mallory");
}

#[tokio::test]
async fn test_unknown_method_is_server_error() {
    let fixture = fixture();
    let ctx = context_for(RouteAction::method::<UserController>("missing"), get("/"));

    let err = invoke(&fixture, &ctx).await.unwrap_err();
    assert_eq!(http_exception(&err).status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(http_exception(&err).message().starts_with("Reflection failed"));
}

#[tokio::test]
async fn test_private_and_protected_methods_are_never_called() {
    for method in ["helper", "internal"] {
        let fixture = fixture();
        let ctx = context_for(RouteAction::method::<UserController>(method), get("/"));

        let err = invoke(&fixture, &ctx).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(http_exception(&err).message().ends_with("must be public"));
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_unregistered_controller_fails_resolution() {
    let invoker = RouteActionInvoker::new(Arc::new(Container::new()));
    let ctx = context_for(RouteAction::method::<UserController>("index"), get("/"));

    let err = invoker.invoke_route_action(ctx.route_action(), &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyResolution);
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

// =============================================================================
// Parameter Failures
// =============================================================================

#[tokio::test]
async fn test_missing_parameter_is_bad_request() {
    let fixture = fixture();
    let ctx = context_for(RouteAction::method::<UserController>("show"), get("/users"));

    let err = invoke(&fixture, &ctx).await.unwrap_err();
    let ex = http_exception(&err);
    assert_eq!(ex.status(), StatusCode::BAD_REQUEST);
    assert!(ex.message().ends_with("UserController::show"));
    let source = ex.source().expect("cause kept");
    assert!(matches!(
        source.downcast_ref::<ParameterError>(),
        Some(ParameterError::MissingValue { .. })
    ));
    assert_eq!(fixture.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_body_without_negotiation_is_unsupported_media_type() {
    let fixture = fixture();
    let request = Request::new(Method::POST, Uri::from_static("/users"))
        .with_header("Content-Type", "application/x-unknown")
        .with_body(r#"{"name": "dave"}"#);
    let ctx = context_for(RouteAction::method::<UserController>("create"), request);

    let err = invoke(&fixture, &ctx).await.unwrap_err();
    assert_eq!(http_exception(&err).status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_undecodable_body_is_unprocessable() {
    let fixture = fixture();
    let request = Request::new(Method::POST, Uri::from_static("/users"))
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"nom": "dave"}"#);
    let ctx = RequestContext::new(
        request,
        Some(json_result()),
        None,
        MatchedRoute::new(RouteAction::method::<UserController>("create")),
    );

    let err = invoke(&fixture, &ctx).await.unwrap_err();
    let ex = http_exception(&err);
    assert_eq!(ex.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(ex.source().is_some_and(|s| s.is::<ParameterError>()));
}

#[tokio::test]
async fn test_response_factory_result() {
    let fixture = fixture();
    let request = Request::new(Method::POST, Uri::from_static("/users"))
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"name": "dave"}"#);
    let ctx = RequestContext::new(
        request,
        Some(json_result()),
        Some(json_result()),
        MatchedRoute::new(RouteAction::method::<UserController>("create")),
    );

    let response = invoke(&fixture, &ctx).await.unwrap();
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.headers.get("Location"), Some("/users/dave"));
    assert_eq!(response.body_text(), Some(r#"{"name":"dave"}"#));
}

// =============================================================================
// Closures
// =============================================================================

#[tokio::test]
async fn test_closure_with_route_variable_under_plain_text() {
    let fixture = fixture();
    let signature = ActionSignature::builder()
        .param(FormalParameter::string("name"))
        .build()
        .unwrap();
    let action = RouteAction::function(signature, |args: Arguments| async move {
        Ok::<_, anyhow::Error>(ActionResult::Value(json!(args.string("name")?)))
    });
    let route = MatchedRoute::new(action).with_var("name", "foo");
    let ctx = RequestContext::new(get("/hello/foo"), None, Some(plain_text()), route);

    let response = invoke(&fixture, &ctx).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body_text(), Some("foo"));
}

#[tokio::test]
async fn test_closure_display_name_in_failures() {
    let fixture = fixture();
    let signature = ActionSignature::builder()
        .param(FormalParameter::scalar::<u32>("id"))
        .build()
        .unwrap();
    let action = RouteAction::function(signature, |_| async { Ok(ActionResult::NoContent) });
    let ctx = context_for(action, get("/"));

    let err = invoke(&fixture, &ctx).await.unwrap_err();
    assert_eq!(http_exception(&err).message(), "Failed to invoke Closure");
}

#[tokio::test]
async fn test_closure_returning_null_is_no_content() {
    let fixture = fixture();
    let action = RouteAction::function(ActionSignature::empty(), |_| async {
        Ok::<_, anyhow::Error>(ActionResult::value(&None::<String>)?)
    });

    for negotiation in [Some(json_result()), Some(plain_text()), None] {
        let ctx = RequestContext::new(get("/"), None, negotiation, MatchedRoute::new(action.clone()));
        let response = invoke(&fixture, &ctx).await.unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_none());
        assert!(response.content_type().is_none());
    }
}

#[tokio::test]
async fn test_closure_returning_response_is_unchanged() {
    let fixture = fixture();
    let action = RouteAction::function(ActionSignature::empty(), |_| async {
        Ok(ActionResult::Response(
            Response::new(StatusCode::ACCEPTED).with_header("X-Job", "42"),
        ))
    });
    let ctx = context_for(action, get("/jobs"));

    let response = invoke(&fixture, &ctx).await.unwrap();
    assert_eq!(response, Response::new(StatusCode::ACCEPTED).with_header("X-Job", "42"));
}

#[tokio::test]
async fn test_arguments_arrive_in_declaration_order() {
    let fixture = fixture();
    let signature = ActionSignature::builder()
        .param(FormalParameter::string("b"))
        .param(FormalParameter::scalar::<u32>("a").with_default(5))
        .param(FormalParameter::string("c").nullable())
        .build()
        .unwrap();
    let action = RouteAction::function(signature, |args: Arguments| async move {
        let names: Vec<String> = args.iter().map(|(name, _)| name.to_string()).collect();
        let a: u32 = args.parse("a")?;
        Ok::<_, anyhow::Error>(ActionResult::value(&json!({
            "names": names,
            "a": a,
            "c": args.optional_string("c")?,
        }))?)
    });
    let route = MatchedRoute::new(action).with_var("b", "x");
    let ctx = RequestContext::new(get("/"), None, Some(json_result()), route);

    let response = invoke(&fixture, &ctx).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(response.body.as_deref().unwrap()).unwrap();
    assert_eq!(body, json!({"names": ["b", "a", "c"], "a": 5, "c": null}));
}

#[test]
fn test_invocation_without_async_runtime_macro() {
    let fixture = fixture();
    let ctx = context_for(RouteAction::method::<UserController>("noop"), get("/"));
    let response = tokio_test::block_on(invoke(&fixture, &ctx)).unwrap();
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}
