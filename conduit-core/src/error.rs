// Error types for the dispatch pipeline

use crate::exception_handler::Severity;
use crate::http::Response;
use http::StatusCode;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// A boxed, thread-safe error used as the cause of an [`HttpException`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// The error type that crosses the invoker and kernel boundaries.
///
/// Dispatch failures arrive here already mapped to an [`HttpException`];
/// failures raised by the route action itself are carried untouched in
/// [`Error::Action`].
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] HttpException),

    #[error(transparent)]
    RouteNotFound(#[from] RouteNotFoundError),

    #[error(transparent)]
    DependencyResolution(#[from] DependencyResolutionError),

    #[error("Failed to serialize response body: {0}")]
    ResponseSerialization(#[source] SerializationError),

    #[error("{0}")]
    Action(anyhow::Error),

    #[error("Route action panicked: {0}")]
    Panic(String),

    #[error("{severity} raised: {message}")]
    Diagnostic { severity: Severity, message: String },
}

/// Discriminant of [`Error`], used to configure which failures get logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Http,
    RouteNotFound,
    DependencyResolution,
    ResponseSerialization,
    Action,
    Panic,
    Diagnostic,
}

impl ErrorKind {
    /// Parse the snake_case name used in configuration files.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" => Some(ErrorKind::Http),
            "route_not_found" => Some(ErrorKind::RouteNotFound),
            "dependency_resolution" => Some(ErrorKind::DependencyResolution),
            "response_serialization" => Some(ErrorKind::ResponseSerialization),
            "action" => Some(ErrorKind::Action),
            "panic" => Some(ErrorKind::Panic),
            "diagnostic" => Some(ErrorKind::Diagnostic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Http => "http",
            ErrorKind::RouteNotFound => "route_not_found",
            ErrorKind::DependencyResolution => "dependency_resolution",
            ErrorKind::ResponseSerialization => "response_serialization",
            ErrorKind::Action => "action",
            ErrorKind::Panic => "panic",
            ErrorKind::Diagnostic => "diagnostic",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Wrap an error raised by a route action.
    pub fn action(error: impl Into<anyhow::Error>) -> Self {
        Error::Action(error.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http(_) => ErrorKind::Http,
            Error::RouteNotFound(_) => ErrorKind::RouteNotFound,
            Error::DependencyResolution(_) => ErrorKind::DependencyResolution,
            Error::ResponseSerialization(_) => ErrorKind::ResponseSerialization,
            Error::Action(_) => ErrorKind::Action,
            Error::Panic(_) => ErrorKind::Panic,
            Error::Diagnostic { .. } => ErrorKind::Diagnostic,
        }
    }

    /// Get the status this error maps to when no exception response
    /// factory is registered for it.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Http(ex) => ex.status(),
            Error::RouteNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// The concrete error value this variant carries.
    ///
    /// For [`Error::Action`] this is the action's own error, so lookups by
    /// type see through the wrapper.
    pub fn inner(&self) -> &(dyn StdError + 'static) {
        match self {
            Error::Http(ex) => ex,
            Error::RouteNotFound(e) => e,
            Error::DependencyResolution(e) => e,
            Error::ResponseSerialization(e) => e,
            Error::Action(e) => &**e,
            Error::Panic(_) | Error::Diagnostic { .. } => self,
        }
    }
}

/// An error carrying the HTTP response that should be sent for it.
#[derive(Debug)]
pub struct HttpException {
    response: Response,
    message: String,
    source: Option<BoxError>,
}

impl HttpException {
    /// Create an exception whose response is an empty one with `status`.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::from_response(Response::new(status), message)
    }

    /// Create an exception around a prepared response.
    pub fn from_response(response: Response, message: impl Into<String>) -> Self {
        Self {
            response,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the failure that caused this exception.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.response.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}

impl fmt::Display for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.response.status)
    }
}

impl StdError for HttpException {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Failure to resolve one formal parameter of a route action.
///
/// These never leave the invoker: each kind is re-raised as an
/// [`HttpException`] with the original kept as its source.
#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("No valid value for parameter {name}: {reason}")]
    MissingValue { name: String, reason: &'static str },

    #[error("Failed to negotiate request content when resolving parameter {name}")]
    FailedContentNegotiation { name: String },

    #[error("Failed to deserialize request body when resolving parameter {name}")]
    RequestBodyDeserialization {
        name: String,
        #[source]
        source: SerializationError,
    },
}

impl ParameterError {
    /// Name of the parameter that failed to resolve.
    pub fn parameter(&self) -> &str {
        match self {
            ParameterError::MissingValue { name, .. }
            | ParameterError::FailedContentNegotiation { name }
            | ParameterError::RequestBodyDeserialization { name, .. } => name,
        }
    }
}

/// Failure inside a media type formatter.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed {media_type} content: {message}")]
    Malformed { media_type: String, message: String },

    #[error("Content cannot be converted to {type_name}: {source}")]
    Type {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("{media_type} cannot represent a {value_kind} value")]
    Unsupported {
        media_type: String,
        value_kind: &'static str,
    },
}

/// No route matched the incoming request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No route matched {method} {path}")]
pub struct RouteNotFoundError {
    pub method: String,
    pub path: String,
}

/// The dependency resolver could not produce an instance.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to resolve {type_name}: {reason}")]
pub struct DependencyResolutionError {
    pub type_name: String,
    pub reason: String,
}

/// A resolved argument could not be read the way the action asked for it.
#[derive(Error, Debug)]
pub enum ArgumentError {
    #[error("Parameter {0} is not declared by this action")]
    Undeclared(String),

    #[error("Parameter {0} resolved to null")]
    Null(String),

    #[error("Parameter {name} value {value:?} is not a valid {type_name}: {reason}")]
    Conversion {
        name: String,
        value: String,
        type_name: &'static str,
        reason: String,
    },

    #[error("Parameter {name} does not hold a {expected}")]
    TypeMismatch { name: String, expected: &'static str },
}

/// An action signature was declared inconsistently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Parameter {0} is declared more than once")]
    DuplicateParameter(String),

    #[error("Parameters {first} and {second} both read the request body")]
    MultipleBodyParameters { first: String, second: String },
}
