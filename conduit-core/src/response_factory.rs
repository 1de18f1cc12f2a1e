// Response factories
//
// Each factory has its status code fixed by its type. A body value is encoded
// with the negotiated response formatter when there is one and as JSON
// otherwise, so a response can always be produced, including on error paths
// where negotiation is what failed.

use crate::content_negotiation::ContentNegotiationResult;
use crate::context::RequestContext;
use crate::error::{Error, SerializationError};
use crate::headers::HeaderMap;
use crate::http::Response;
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

/// Content type used when no response formatter was negotiated.
pub const FALLBACK_CONTENT_TYPE: &str = "application/json";

/// Builds a response from the context of the request it answers.
pub trait ResponseFactory: Send + Sync {
    fn create_response(&self, ctx: &RequestContext) -> Result<Response, Error>;
}

impl<F> ResponseFactory for F
where
    F: Fn(&RequestContext) -> Result<Response, Error> + Send + Sync,
{
    fn create_response(&self, ctx: &RequestContext) -> Result<Response, Error> {
        self(ctx)
    }
}

/// A response with a given status, headers and optional body value.
#[derive(Debug, Clone)]
pub struct StatusResponseFactory {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Value>,
}

impl StatusResponseFactory {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for header in &headers {
            self.headers.append(header.name.clone(), header.value.clone());
        }
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` into the body value.
    pub fn with_serialized_body<T: Serialize + ?Sized>(self, body: &T) -> Result<Self, serde_json::Error> {
        Ok(self.with_body(serde_json::to_value(body)?))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Build the response, encoding the body with `negotiation` if given.
    pub fn build(&self, negotiation: Option<&ContentNegotiationResult>) -> Result<Response, Error> {
        let mut response = Response::new(self.status);
        response.headers = self.headers.clone();

        let Some(body) = &self.body else {
            return Ok(response);
        };

        match negotiation {
            Some(negotiation) => {
                let mut buffer = Vec::new();
                negotiation
                    .formatter()
                    .write_to_stream(body, &mut buffer)
                    .map_err(Error::ResponseSerialization)?;
                if let Some(content_type) = negotiation.content_type() {
                    response.headers.insert("Content-Type", content_type);
                }
                response.body = Some(buffer.into());
            }
            None => {
                let buffer = serde_json::to_vec(body).map_err(|e| {
                    Error::ResponseSerialization(SerializationError::Malformed {
                        media_type: FALLBACK_CONTENT_TYPE.to_string(),
                        message: e.to_string(),
                    })
                })?;
                response.headers.insert("Content-Type", FALLBACK_CONTENT_TYPE);
                response.body = Some(buffer.into());
            }
        }

        Ok(response)
    }
}

impl ResponseFactory for StatusResponseFactory {
    fn create_response(&self, ctx: &RequestContext) -> Result<Response, Error> {
        self.build(ctx.response_content_negotiation_result())
    }
}

macro_rules! status_factories {
    ($($(#[$doc:meta])* $name:ident => $status:ident;)+) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone)]
            pub struct $name(StatusResponseFactory);

            impl $name {
                pub const STATUS: StatusCode = StatusCode::$status;

                pub fn new() -> Self {
                    Self(StatusResponseFactory::new(Self::STATUS))
                }

                pub fn with_body(body: Value) -> Self {
                    Self(StatusResponseFactory::new(Self::STATUS).with_body(body))
                }

                pub fn body(self, body: Value) -> Self {
                    Self(self.0.with_body(body))
                }

                pub fn with_header(self, name: impl Into<String>, value: impl Into<String>) -> Self {
                    Self(self.0.with_header(name, value))
                }

                pub fn with_headers(self, headers: HeaderMap) -> Self {
                    Self(self.0.with_headers(headers))
                }

                /// Build the response, encoding the body with `negotiation` if given.
                pub fn build(&self, negotiation: Option<&ContentNegotiationResult>) -> Result<Response, Error> {
                    self.0.build(negotiation)
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl ResponseFactory for $name {
                fn create_response(&self, ctx: &RequestContext) -> Result<Response, Error> {
                    self.0.create_response(ctx)
                }
            }
        )+
    };
}

status_factories! {
    /// 200 OK
    OkResponseFactory => OK;
    /// 201 Created
    CreatedResponseFactory => CREATED;
    /// 202 Accepted
    AcceptedResponseFactory => ACCEPTED;
    /// 204 No Content
    NoContentResponseFactory => NO_CONTENT;
    /// 400 Bad Request
    BadRequestResponseFactory => BAD_REQUEST;
    /// 401 Unauthorized
    UnauthorizedResponseFactory => UNAUTHORIZED;
    /// 403 Forbidden
    ForbiddenResponseFactory => FORBIDDEN;
    /// 404 Not Found
    NotFoundResponseFactory => NOT_FOUND;
    /// 409 Conflict
    ConflictResponseFactory => CONFLICT;
    /// 500 Internal Server Error
    InternalServerErrorResponseFactory => INTERNAL_SERVER_ERROR;
}

impl CreatedResponseFactory {
    /// A 201 pointing at the created resource.
    pub fn at(location: impl Into<String>) -> Self {
        Self::new().with_header("Location", location)
    }
}
