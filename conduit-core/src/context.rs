// Per-request dispatch context

use crate::action::RouteAction;
use crate::content_negotiation::ContentNegotiationResult;
use crate::http::Request;
use std::collections::HashMap;

/// The route a request matched, with the variables captured from its path.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    pub action: RouteAction,
    pub route_vars: HashMap<String, String>,
}

impl MatchedRoute {
    pub fn new(action: RouteAction) -> Self {
        Self {
            action,
            route_vars: HashMap::new(),
        }
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.route_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.route_vars
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// Everything known about a request once it has been routed and negotiated.
///
/// Built once per request and read by parameter resolution, the invoker and
/// response factories.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request: Request,
    request_negotiation: Option<ContentNegotiationResult>,
    response_negotiation: Option<ContentNegotiationResult>,
    matched_route: MatchedRoute,
}

impl RequestContext {
    pub fn new(
        request: Request,
        request_negotiation: Option<ContentNegotiationResult>,
        response_negotiation: Option<ContentNegotiationResult>,
        matched_route: MatchedRoute,
    ) -> Self {
        Self {
            request,
            request_negotiation,
            response_negotiation,
            matched_route,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Formatter chosen to read the request body.
    pub fn request_content_negotiation_result(&self) -> Option<&ContentNegotiationResult> {
        self.request_negotiation.as_ref()
    }

    /// Formatter chosen to write the response body.
    pub fn response_content_negotiation_result(&self) -> Option<&ContentNegotiationResult> {
        self.response_negotiation.as_ref()
    }

    pub fn matched_route(&self) -> &MatchedRoute {
        &self.matched_route
    }

    pub fn route_action(&self) -> &RouteAction {
        &self.matched_route.action
    }

    /// A captured route variable.
    pub fn route_var(&self, name: &str) -> Option<&str> {
        self.matched_route.route_vars.get(name).map(String::as_str)
    }
}
