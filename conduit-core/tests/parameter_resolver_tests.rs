//! Tests for binding formal parameters to request data.

use conduit_core::*;
use ::http::{Method, Uri};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u32,
    email: String,
}

fn context(request: Request, route_vars: &[(&str, &str)], negotiate: bool) -> RequestContext {
    let request_negotiation = negotiate.then(|| {
        ContentNegotiationResult::new(
            Arc::new(JsonMediaTypeFormatter::new()),
            Some(MediaType::json()),
            None,
        )
    });
    let route = MatchedRoute::new(RouteAction::bound("UserController", "show"))
        .with_vars(route_vars.iter().copied());
    RequestContext::new(request, request_negotiation, None, route)
}

fn get(uri: &'static str) -> Request {
    Request::new(Method::GET, Uri::from_static(uri))
}

fn resolve(parameter: &FormalParameter, ctx: &RequestContext) -> Result<ArgumentValue, ParameterError> {
    ControllerParameterResolver::new().resolve_parameter(parameter, ctx)
}

// =============================================================================
// Scalar Parameters
// =============================================================================

#[test]
fn test_route_variable_is_returned_verbatim() {
    let ctx = context(get("/users/0042"), &[("id", "0042")], false);
    let value = resolve(&FormalParameter::scalar::<u32>("id"), &ctx).unwrap();
    assert_eq!(value.as_str(), Some("0042"));
}

#[test]
fn test_route_variable_wins_over_query() {
    let ctx = context(get("/users/1?id=2"), &[("id", "1")], false);
    let value = resolve(&FormalParameter::string("id"), &ctx).unwrap();
    assert_eq!(value.as_str(), Some("1"));
}

#[test]
fn test_query_variable_is_used() {
    let ctx = context(get("/users?page=3"), &[], false);
    let value = resolve(&FormalParameter::scalar::<u32>("page").with_default(1), &ctx).unwrap();
    assert!(matches!(value, ArgumentValue::Raw(ref v) if v == "3"));
}

#[test]
fn test_default_value_is_used() {
    let ctx = context(get("/users"), &[], false);
    let value = resolve(&FormalParameter::scalar::<u32>("page").with_default(1), &ctx).unwrap();
    assert!(matches!(value, ArgumentValue::Default(ref v) if v == "1"));
}

#[test]
fn test_nullable_scalar_without_value_is_null() {
    let ctx = context(get("/users"), &[], false);
    let value = resolve(&FormalParameter::string("filter").nullable(), &ctx).unwrap();
    assert!(value.is_null());
}

#[test]
fn test_missing_scalar_fails() {
    let ctx = context(get("/users"), &[], false);
    let err = resolve(&FormalParameter::string("filter"), &ctx).unwrap_err();
    assert!(matches!(err, ParameterError::MissingValue { .. }));
    assert_eq!(err.parameter(), "filter");
}

// =============================================================================
// Body Parameters
// =============================================================================

fn post(body: &'static str) -> Request {
    Request::new(Method::POST, Uri::from_static("/users"))
        .with_header("Content-Type", "application/json")
        .with_body(body)
}

#[test]
fn test_body_is_deserialized() {
    let ctx = context(post(r#"{"id": 7, "email": "dave@example.com"}"#), &[], true);
    let value = resolve(&FormalParameter::body::<User>("user"), &ctx).unwrap();

    let mut args = Arguments::new().with("user", value);
    let user: User = args.take_body("user").unwrap();
    assert_eq!(
        user,
        User {
            id: 7,
            email: "dave@example.com".into()
        }
    );
}

#[test]
fn test_object_parameter_ignores_route_variable_of_same_name() {
    let ctx = context(post(r#"{"id": 1, "email": "a@b.c"}"#), &[("user", "123")], true);
    let value = resolve(&FormalParameter::body::<User>("user"), &ctx).unwrap();
    assert!(matches!(value, ArgumentValue::Body(_)));
}

#[test]
fn test_missing_body() {
    let request = Request::new(Method::POST, Uri::from_static("/users"));

    let ctx = context(request.clone(), &[], true);
    let err = resolve(&FormalParameter::body::<User>("user"), &ctx).unwrap_err();
    assert!(matches!(err, ParameterError::MissingValue { .. }));

    let value = resolve(&FormalParameter::body::<User>("user").nullable(), &ctx).unwrap();
    assert!(value.is_null());
}

#[test]
fn test_missing_request_negotiation() {
    let ctx = context(post(r#"{"id": 1, "email": "a@b.c"}"#), &[], false);

    let err = resolve(&FormalParameter::body::<User>("user"), &ctx).unwrap_err();
    assert!(matches!(err, ParameterError::FailedContentNegotiation { ref name } if name == "user"));

    let value = resolve(&FormalParameter::body::<User>("user").nullable(), &ctx).unwrap();
    assert!(value.is_null());
}

#[test]
fn test_deserialization_failure() {
    let ctx = context(post(r#"{"id": "seven"}"#), &[], true);

    let err = resolve(&FormalParameter::body::<User>("user"), &ctx).unwrap_err();
    match err {
        ParameterError::RequestBodyDeserialization { name, source } => {
            assert_eq!(name, "user");
            assert!(matches!(source, SerializationError::Type { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    let value = resolve(&FormalParameter::body::<User>("user").nullable(), &ctx).unwrap();
    assert!(value.is_null());
}

#[test]
fn test_malformed_body() {
    let ctx = context(post("{not json"), &[], true);
    let err = resolve(&FormalParameter::body::<User>("user"), &ctx).unwrap_err();
    assert!(matches!(
        err,
        ParameterError::RequestBodyDeserialization {
            source: SerializationError::Malformed { .. },
            ..
        }
    ));
}

#[test]
fn test_body_can_be_read_for_each_resolution() {
    let ctx = context(post(r#"{"id": 1, "email": "a@b.c"}"#), &[], true);
    let parameter = FormalParameter::body::<User>("user");
    assert!(resolve(&parameter, &ctx).is_ok());
    assert!(resolve(&parameter, &ctx).is_ok());
}
