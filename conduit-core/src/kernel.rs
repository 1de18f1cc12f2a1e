// Request handling entry point
//
// Wires negotiation, routing, invocation and exception handling together.
// Every request gets exactly one response: failures and panics raised while
// dispatching are turned into responses by the exception handler.

use crate::container::DependencyResolver;
use crate::content_negotiation::{ContentNegotiator, MediaTypeNegotiator};
use crate::context::{MatchedRoute, RequestContext};
use crate::error::{Error, RouteNotFoundError};
use crate::exception_handler::{ExceptionContext, ExceptionHandler};
use crate::http::{Request, Response};
use crate::invoker::{ActionInvoker, RouteActionInvoker};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// Finds the route for a request.
pub trait RouteMatcher: Send + Sync {
    fn match_route(&self, request: &Request) -> Option<MatchedRoute>;
}

impl<F> RouteMatcher for F
where
    F: Fn(&Request) -> Option<MatchedRoute> + Send + Sync,
{
    fn match_route(&self, request: &Request) -> Option<MatchedRoute> {
        self(request)
    }
}

/// Handles requests end to end.
#[derive(Clone)]
pub struct Kernel {
    router: Arc<dyn RouteMatcher>,
    negotiator: Arc<dyn ContentNegotiator>,
    invoker: Arc<dyn ActionInvoker>,
    exception_handler: Arc<ExceptionHandler>,
}

impl Kernel {
    /// A kernel with the default negotiator and exception handler.
    pub fn new(router: Arc<dyn RouteMatcher>, invoker: Arc<dyn ActionInvoker>) -> Self {
        Self {
            router,
            negotiator: Arc::new(MediaTypeNegotiator::default()),
            invoker,
            exception_handler: Arc::new(ExceptionHandler::default()),
        }
    }

    /// A kernel invoking actions with a [`RouteActionInvoker`] over `resolver`.
    pub fn with_resolver(router: Arc<dyn RouteMatcher>, resolver: Arc<dyn DependencyResolver>) -> Self {
        Self::new(router, Arc::new(RouteActionInvoker::new(resolver)))
    }

    pub fn with_negotiator(mut self, negotiator: Arc<dyn ContentNegotiator>) -> Self {
        self.negotiator = negotiator;
        self
    }

    pub fn with_exception_handler(mut self, exception_handler: ExceptionHandler) -> Self {
        self.exception_handler = Arc::new(exception_handler);
        self
    }

    pub fn exception_handler(&self) -> &ExceptionHandler {
        &self.exception_handler
    }

    /// Handle one request.
    pub async fn handle(&self, request: Request) -> Response {
        let span = info_span!("request", method = %request.method, path = %request.path());
        self.dispatch(request).instrument(span).await
    }

    async fn dispatch(&self, request: Request) -> Response {
        let request_negotiation = self.negotiator.negotiate_request_content(&request);
        let response_negotiation = self.negotiator.negotiate_response_content(&request);

        let Some(matched_route) = self.router.match_route(&request) else {
            let error = Error::from(RouteNotFoundError {
                method: request.method.to_string(),
                path: request.path().to_string(),
            });
            let ctx = ExceptionContext::new(&request, response_negotiation.as_ref());
            return self.exception_handler.handle(&error, Some(&ctx));
        };

        debug!(action = %matched_route.action.display_name(), "Route matched");
        let action = matched_route.action.clone();
        let ctx = RequestContext::new(request, request_negotiation, response_negotiation, matched_route);

        let outcome = AssertUnwindSafe(self.invoker.invoke_route_action(&action, &ctx))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(response)) => return response,
            Ok(Err(error)) => error,
            Err(panic) => Error::Panic(panic_message(panic.as_ref())),
        };

        self.exception_handler
            .handle(&error, Some(&ExceptionContext::from_request_context(&ctx)))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
