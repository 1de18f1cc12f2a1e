// Binding formal parameters to values from the request

use crate::action::{FormalParameter, ParameterType};
use crate::arguments::ArgumentValue;
use crate::context::RequestContext;
use crate::error::ParameterError;
use bytes::Buf;
use tracing::debug;

/// Resolves one formal parameter of a route action.
pub trait ParameterResolver: Send + Sync {
    fn resolve_parameter(
        &self,
        parameter: &FormalParameter,
        ctx: &RequestContext,
    ) -> Result<ArgumentValue, ParameterError>;
}

/// The standard resolution order for controller and closure parameters.
///
/// Object-typed parameters are always read from the body. Scalars take the
/// first of: route variable, query variable, declared default, null (when
/// nullable). Scalar values are passed on as the raw strings the request
/// carried.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerParameterResolver;

impl ControllerParameterResolver {
    pub fn new() -> Self {
        Self
    }

    fn resolve_body(
        &self,
        parameter: &FormalParameter,
        ctx: &RequestContext,
    ) -> Result<ArgumentValue, ParameterError> {
        let ParameterType::Object(body_type) = parameter.parameter_type() else {
            return Err(missing(parameter, "parameter is not an object type"));
        };

        let Some(body) = ctx.request().body.as_ref() else {
            return null_or(parameter, || missing(parameter, "request has no body"));
        };

        let Some(negotiation) = ctx.request_content_negotiation_result() else {
            return null_or(parameter, || ParameterError::FailedContentNegotiation {
                name: parameter.name().to_string(),
            });
        };

        let mut reader = body.clone().reader();
        match negotiation
            .formatter()
            .read_from_stream(&mut reader, &body_type)
        {
            Ok(value) => Ok(ArgumentValue::Body(value)),
            Err(source) => {
                debug!(
                    parameter = parameter.name(),
                    target = body_type.type_name(),
                    error = %source,
                    "Request body rejected"
                );
                null_or(parameter, || ParameterError::RequestBodyDeserialization {
                    name: parameter.name().to_string(),
                    source,
                })
            }
        }
    }
}

impl ParameterResolver for ControllerParameterResolver {
    fn resolve_parameter(
        &self,
        parameter: &FormalParameter,
        ctx: &RequestContext,
    ) -> Result<ArgumentValue, ParameterError> {
        if parameter.is_body() {
            return self.resolve_body(parameter, ctx);
        }

        if let Some(value) = ctx.route_var(parameter.name()) {
            return Ok(ArgumentValue::Raw(value.to_string()));
        }

        if let Some(value) = ctx.request().query_vars().remove(parameter.name()) {
            return Ok(ArgumentValue::Raw(value));
        }

        if let Some(default) = parameter.default_value() {
            return Ok(ArgumentValue::Default(default.to_string()));
        }

        null_or(parameter, || missing(parameter, "no route, query or default value"))
    }
}

fn missing(parameter: &FormalParameter, reason: &'static str) -> ParameterError {
    ParameterError::MissingValue {
        name: parameter.name().to_string(),
        reason,
    }
}

fn null_or(
    parameter: &FormalParameter,
    error: impl FnOnce() -> ParameterError,
) -> Result<ArgumentValue, ParameterError> {
    if parameter.is_nullable() {
        Ok(ArgumentValue::Null)
    } else {
        Err(error())
    }
}
