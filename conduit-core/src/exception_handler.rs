//! Exception handling
//!
//! Turns any error that escapes dispatch into the one response the request
//! gets. Responses come from factories registered per error type; when there
//! is no request context, or when a factory itself fails, a fixed 500 with a
//! JSON content type is used instead, without touching content negotiation.
//!
//! # Examples
//!
//! ```
//! use conduit_core::exception_handler::{ExceptionHandler, ExceptionResponseFactoryRegistry};
//! use conduit_core::http::Response;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("quota exceeded")]
//! struct QuotaExceeded;
//!
//! let mut registry = ExceptionResponseFactoryRegistry::with_defaults();
//! registry.register::<QuotaExceeded, _>(|_, _| {
//!     Ok(Response::new(http::StatusCode::TOO_MANY_REQUESTS))
//! });
//! let handler = ExceptionHandler::new(registry);
//! ```

use crate::content_negotiation::ContentNegotiationResult;
use crate::context::RequestContext;
use crate::error::{ArgumentError, DependencyResolutionError, Error, ErrorKind, HttpException, RouteNotFoundError};
use crate::http::{Request, Response};
use crate::response_factory::{BadRequestResponseFactory, InternalServerErrorResponseFactory, NotFoundResponseFactory};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::any::TypeId;
use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// Severities
// ============================================================================

/// Severity of a non-fatal diagnostic reported during a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Deprecation,
    Notice,
    Warning,
    Error,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Deprecation,
        Severity::Notice,
        Severity::Warning,
        Severity::Error,
    ];

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "deprecation" | "deprecated" => Some(Severity::Deprecation),
            "notice" => Some(Severity::Notice),
            "warning" | "warn" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Deprecation => "deprecation",
            Severity::Notice => "notice",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Severity::Deprecation => 1,
            Severity::Notice => 1 << 1,
            Severity::Warning => 1 << 2,
            Severity::Error => 1 << 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of severities, stored as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeveritySet(u8);

impl SeveritySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0b1111)
    }

    pub const fn with(self, severity: Severity) -> Self {
        Self(self.0 | severity.bit())
    }

    pub const fn without(self, severity: Severity) -> Self {
        Self(self.0 & !severity.bit())
    }

    pub const fn contains(&self, severity: Severity) -> bool {
        self.0 & severity.bit() != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Severity> + '_ {
        Severity::ALL.into_iter().filter(|s| self.contains(*s))
    }
}

impl FromIterator<Severity> for SeveritySet {
    fn from_iter<I: IntoIterator<Item = Severity>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

// ============================================================================
// Context
// ============================================================================

/// What the handler knows about the request that failed.
#[derive(Debug, Clone, Copy)]
pub struct ExceptionContext<'a> {
    pub request: &'a Request,
    /// Negotiated response formatter, if negotiation got that far.
    pub response_negotiation: Option<&'a ContentNegotiationResult>,
    /// The full context, once routing succeeded.
    pub request_context: Option<&'a RequestContext>,
}

impl<'a> ExceptionContext<'a> {
    pub fn new(request: &'a Request, response_negotiation: Option<&'a ContentNegotiationResult>) -> Self {
        Self {
            request,
            response_negotiation,
            request_context: None,
        }
    }

    pub fn from_request_context(ctx: &'a RequestContext) -> Self {
        Self {
            request: ctx.request(),
            response_negotiation: ctx.response_content_negotiation_result(),
            request_context: Some(ctx),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

type ErasedFactory =
    Arc<dyn Fn(&(dyn StdError + 'static), &ExceptionContext<'_>) -> Option<Result<Response, Error>> + Send + Sync>;

/// Response factories keyed by error type.
#[derive(Clone, Default)]
pub struct ExceptionResponseFactoryRegistry {
    factories: Vec<(TypeId, &'static str, ErasedFactory)>,
}

impl ExceptionResponseFactoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard mappings:
    ///
    /// | Error                          | Response                          |
    /// |--------------------------------|-----------------------------------|
    /// | [`HttpException`]              | its embedded response             |
    /// | [`RouteNotFoundError`]         | 404                               |
    /// | [`DependencyResolutionError`]  | 500                               |
    /// | [`ArgumentError`]              | 400 for conversions, 500 otherwise |
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register::<HttpException, _>(|ex, _| Ok(ex.response().clone()));
        registry.register::<RouteNotFoundError, _>(|_, ctx| {
            NotFoundResponseFactory::new().build(ctx.response_negotiation)
        });
        registry.register::<DependencyResolutionError, _>(|_, ctx| {
            InternalServerErrorResponseFactory::new().build(ctx.response_negotiation)
        });
        registry.register::<ArgumentError, _>(|err, ctx| match err {
            ArgumentError::Conversion { .. } => BadRequestResponseFactory::new().build(ctx.response_negotiation),
            _ => InternalServerErrorResponseFactory::new().build(ctx.response_negotiation),
        });
        registry
    }

    /// Register the factory for errors of type `E`, replacing any earlier one.
    pub fn register<E, F>(&mut self, factory: F)
    where
        E: StdError + 'static,
        F: Fn(&E, &ExceptionContext<'_>) -> Result<Response, Error> + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<E>();
        let erased: ErasedFactory = Arc::new(move |err: &(dyn StdError + 'static), ctx: &ExceptionContext<'_>| {
            err.downcast_ref::<E>().map(|e| factory(e, ctx))
        });
        let entry = (type_id, std::any::type_name::<E>(), erased);

        match self.factories.iter_mut().find(|(id, _, _)| *id == type_id) {
            Some(slot) => *slot = entry,
            None => self.factories.push(entry),
        }
    }

    pub fn has<E: StdError + 'static>(&self) -> bool {
        let type_id = TypeId::of::<E>();
        self.factories.iter().any(|(id, _, _)| *id == type_id)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Run the factory registered for `error`, if there is one.
    ///
    /// Matches against [`Error::inner`], so the error an action returned is
    /// looked up by its own type.
    pub fn create_response(&self, error: &Error, ctx: &ExceptionContext<'_>) -> Option<Result<Response, Error>> {
        let inner = error.inner();
        self.factories.iter().find_map(|(_, _, factory)| factory(inner, ctx))
    }
}

impl fmt::Debug for ExceptionResponseFactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.factories.iter().map(|(_, name, _)| name))
            .finish()
    }
}

// ============================================================================
// Handler
// ============================================================================

/// What gets logged and what gets raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandlerConfig {
    /// Diagnostic severities that are logged.
    pub logged_severities: SeveritySet,
    /// Diagnostic severities that are raised as errors.
    pub thrown_severities: SeveritySet,
    /// Error kinds that are never logged.
    pub unlogged_kinds: HashSet<ErrorKind>,
}

impl Default for ExceptionHandlerConfig {
    fn default() -> Self {
        Self {
            logged_severities: SeveritySet::empty(),
            thrown_severities: SeveritySet::all().without(Severity::Deprecation),
            unlogged_kinds: HashSet::new(),
        }
    }
}

impl ExceptionHandlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logged_severities(mut self, severities: SeveritySet) -> Self {
        self.logged_severities = severities;
        self
    }

    pub fn thrown_severities(mut self, severities: SeveritySet) -> Self {
        self.thrown_severities = severities;
        self
    }

    pub fn without_logging(mut self, kind: ErrorKind) -> Self {
        self.unlogged_kinds.insert(kind);
        self
    }
}

/// Converts errors into responses and applies the logging policy.
#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    registry: ExceptionResponseFactoryRegistry,
    config: ExceptionHandlerConfig,
}

impl Default for ExceptionHandler {
    fn default() -> Self {
        Self::new(ExceptionResponseFactoryRegistry::with_defaults())
    }
}

impl ExceptionHandler {
    pub fn new(registry: ExceptionResponseFactoryRegistry) -> Self {
        Self {
            registry,
            config: ExceptionHandlerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExceptionHandlerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ExceptionHandlerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ExceptionResponseFactoryRegistry {
        &self.registry
    }

    /// Produce the response for `error`. Never fails.
    pub fn handle(&self, error: &Error, ctx: Option<&ExceptionContext<'_>>) -> Response {
        if self.should_log(error) {
            log_error(error);
        }

        let Some(ctx) = ctx else {
            return Self::fallback_response();
        };

        let result = match self.registry.create_response(error, ctx) {
            Some(result) => result,
            None => InternalServerErrorResponseFactory::new().build(ctx.response_negotiation),
        };

        match result {
            Ok(response) => response,
            Err(secondary) => {
                warn!(
                    error = %error,
                    secondary = %secondary,
                    "Failed to build error response; sending fallback"
                );
                Self::fallback_response()
            }
        }
    }

    /// Report a non-fatal diagnostic.
    ///
    /// Logged if its severity is in `logged_severities`; returned as
    /// [`Error::Diagnostic`] if it is in `thrown_severities`.
    pub fn handle_diagnostic(&self, severity: Severity, message: impl Into<String>) -> Result<(), Error> {
        let message = message.into();

        if self.config.logged_severities.contains(severity) {
            match severity {
                Severity::Deprecation | Severity::Notice => info!(%severity, "{}", message),
                Severity::Warning => warn!(%severity, "{}", message),
                Severity::Error => tracing::error!(%severity, "{}", message),
            }
        }

        if self.config.thrown_severities.contains(severity) {
            return Err(Error::Diagnostic { severity, message });
        }
        Ok(())
    }

    /// The response used when nothing better can be built.
    pub fn fallback_response() -> Response {
        Response::new(StatusCode::INTERNAL_SERVER_ERROR).with_header("Content-Type", "application/json")
    }

    fn should_log(&self, error: &Error) -> bool {
        !self.config.unlogged_kinds.contains(&error.kind())
    }
}

fn log_error(error: &Error) {
    let mut causes = Vec::new();
    let mut source = error.inner().source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }

    tracing::error!(
        kind = %error.kind(),
        status = error.status_code().as_u16(),
        causes = ?causes,
        "{}",
        error
    );
}
