// Route action invocation
//
// Identify the callable, resolve its parameters in declaration order, call it,
// and convert what it returns into a response. Parameter failures become HTTP
// exceptions here; errors raised by the action itself pass through untouched.

use crate::action::{ActionResult, ActionSignature, RouteAction, Visibility};
use crate::arguments::Arguments;
use crate::container::DependencyResolver;
use crate::context::RequestContext;
use crate::error::{Error, HttpException, ParameterError};
use crate::http::Response;
use crate::resolver::{ControllerParameterResolver, ParameterResolver};
use crate::response_factory::{OkResponseFactory, ResponseFactory};
use async_trait::async_trait;
use http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Runs the route action a request was matched to.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// Invoke `action` and convert its result into a response.
    ///
    /// An error returned by the action itself comes back as
    /// [`Error::Action`], unchanged.
    async fn invoke_route_action(&self, action: &RouteAction, ctx: &RequestContext) -> Result<Response, Error>;
}

/// The standard invoker.
#[derive(Clone)]
pub struct RouteActionInvoker {
    parameter_resolver: Arc<dyn ParameterResolver>,
    dependency_resolver: Arc<dyn DependencyResolver>,
}

impl RouteActionInvoker {
    /// An invoker obtaining controllers from `dependency_resolver` and
    /// resolving parameters with [`ControllerParameterResolver`].
    pub fn new(dependency_resolver: Arc<dyn DependencyResolver>) -> Self {
        Self {
            parameter_resolver: Arc::new(ControllerParameterResolver::new()),
            dependency_resolver,
        }
    }

    pub fn with_parameter_resolver(mut self, parameter_resolver: Arc<dyn ParameterResolver>) -> Self {
        self.parameter_resolver = parameter_resolver;
        self
    }

    /// Resolve every parameter of `signature`, stopping at the first failure.
    pub fn resolve_arguments(
        &self,
        signature: &ActionSignature,
        ctx: &RequestContext,
        display_name: &str,
    ) -> Result<Arguments, Error> {
        let mut arguments = Arguments::new();

        for parameter in signature.parameters() {
            let value = self
                .parameter_resolver
                .resolve_parameter(parameter, ctx)
                .map_err(|e| parameter_failure(e, display_name))?;
            debug!(action = display_name, parameter = parameter.name(), value = ?value, "Parameter resolved");
            arguments.push(parameter.name(), value);
        }

        Ok(arguments)
    }

    /// Turn an action's return value into a response.
    ///
    /// A null value counts as no value at all.
    pub fn convert_result(result: ActionResult, ctx: &RequestContext) -> Result<Response, Error> {
        match result {
            ActionResult::Response(response) => Ok(response),
            ActionResult::NoContent | ActionResult::Value(Value::Null) => Ok(Response::no_content()),
            ActionResult::Factory(factory) => factory.create_response(ctx),
            ActionResult::Value(value) => OkResponseFactory::with_body(value).create_response(ctx),
        }
    }
}

#[async_trait]
impl ActionInvoker for RouteActionInvoker {
    async fn invoke_route_action(&self, action: &RouteAction, ctx: &RequestContext) -> Result<Response, Error> {
        let display_name = action.display_name();

        let result = match action {
            RouteAction::Method { owner, method } => {
                let controller = self.dependency_resolver.resolve(owner)?;

                let info = controller.reflect(method).ok_or_else(|| {
                    HttpException::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Reflection failed for {}", display_name),
                    )
                })?;

                if info.visibility != Visibility::Public {
                    return Err(HttpException::new(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Controller method {} must be public", display_name),
                    )
                    .into());
                }

                let arguments = self.resolve_arguments(&info.signature, ctx, &display_name)?;
                debug!(action = %display_name, "Invoking controller method");
                controller.call(method, arguments).await.map_err(Error::Action)?
            }
            RouteAction::Function(function) => {
                let arguments = self.resolve_arguments(function.signature(), ctx, &display_name)?;
                debug!(action = %display_name, "Invoking closure");
                function.call(arguments).await.map_err(Error::Action)?
            }
        };

        Self::convert_result(result, ctx)
    }
}

fn parameter_failure(error: ParameterError, display_name: &str) -> Error {
    let status = match &error {
        ParameterError::MissingValue { .. } => StatusCode::BAD_REQUEST,
        ParameterError::FailedContentNegotiation { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ParameterError::RequestBodyDeserialization { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };

    HttpException::new(status, format!("Failed to invoke {}", display_name))
        .with_source(error)
        .into()
}
