// HTTP request and response types

use crate::headers::HeaderMap;
use bytes::Bytes;
use http::{Method, StatusCode, Uri};
use std::collections::HashMap;

/// An inbound HTTP request as seen by the dispatch pipeline.
///
/// `body` is `None` when the request carried no body at all, which is
/// distinct from an empty one.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Get a header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Query string variables of the request URI.
    pub fn query_vars(&self) -> HashMap<String, String> {
        parse_query_string(&self.uri)
    }
}

/// Parse the query string of `uri` into a name/value mapping.
///
/// Values are percent-decoded. When a name repeats, the last value wins.
pub fn parse_query_string(uri: &Uri) -> HashMap<String, String> {
    let Some(query) = uri.query() else {
        return HashMap::new();
    };

    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_default()
}

/// An HTTP response produced by a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn created() -> Self {
        Self::new(StatusCode::CREATED)
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST)
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND)
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Declared media type of the body, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    /// The body as UTF-8 text, if there is a body and it is valid UTF-8.
    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|body| std::str::from_utf8(body).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_vars() {
        let request = Request::new(
            Method::GET,
            Uri::from_static("http://example.com/users?name=dave&tag=a%20b&tag=c"),
        );
        let vars = request.query_vars();
        assert_eq!(vars.get("name").map(String::as_str), Some("dave"));
        assert_eq!(vars.get("tag").map(String::as_str), Some("c"));
    }

    #[test]
    fn test_no_query_string() {
        let request = Request::new(Method::GET, Uri::from_static("/users"));
        assert!(request.query_vars().is_empty());
        assert_eq!(request.path(), "/users");
    }

    #[test]
    fn test_absent_and_empty_body_differ() {
        let request = Request::new(Method::POST, Uri::from_static("/"));
        assert!(request.body.is_none());

        let request = request.with_body(Bytes::new());
        assert_eq!(request.body.as_deref(), Some(&b""[..]));
    }

    #[test]
    fn test_response_builders() {
        let response = Response::created()
            .with_header("Content-Type", "text/plain")
            .with_body("hi");
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.body_text(), Some("hi"));
        assert!(Response::no_content().body.is_none());
    }
}
