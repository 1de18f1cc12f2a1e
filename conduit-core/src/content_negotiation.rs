//! Content negotiation for request and response bodies.
//!
//! The dispatch pipeline only consumes the outcome of negotiation: a
//! [`ContentNegotiationResult`] naming the formatter to read a request body
//! with, and another naming the formatter to write a response body with.
//! Either may be absent when no formatter fits the request.
//!
//! [`MediaTypeNegotiator`] is the default [`ContentNegotiator`]. It picks
//! the request formatter from `Content-Type` and the response formatter from
//! `Accept` (quality values and specificity respected) and `Accept-Charset`.
//!
//! # Examples
//!
//! ```
//! use conduit_core::content_negotiation::{Accept, MediaType};
//!
//! let accept = Accept::parse("application/json, text/html;q=0.9, */*;q=0.1");
//! assert_eq!(accept.preferred(), Some(&MediaType::json()));
//! assert_eq!(accept.quality_for(&MediaType::html()), 0.9);
//! ```

use crate::action::BodyType;
use crate::error::SerializationError;
use crate::http::Request;
use serde_json::Value;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

// ============================================================================
// Media Types
// ============================================================================

/// Represents a media type (MIME type) with optional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// The type (e.g., "application", "text")
    pub type_: String,
    /// The subtype (e.g., "json", "plain")
    pub subtype: String,
    /// Optional parameters (e.g., charset=utf-8)
    pub params: HashMap<String, String>,
}

impl MediaType {
    pub fn new(type_: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            subtype: subtype.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// `application/json`
    pub fn json() -> Self {
        Self::new("application", "json")
    }

    /// `text/plain`
    pub fn plain_text() -> Self {
        Self::new("text", "plain")
    }

    /// `text/html`
    pub fn html() -> Self {
        Self::new("text", "html")
    }

    /// `*/*`
    pub fn any() -> Self {
        Self::new("*", "*")
    }

    /// Parse a media type, dropping any quality parameter.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split(';');

        let (type_, subtype) = parts.next()?.trim().split_once('/')?;
        let type_ = type_.trim().to_lowercase();
        let subtype = subtype.trim().to_lowercase();
        if type_.is_empty() || subtype.is_empty() {
            return None;
        }

        let mut params = HashMap::new();
        for param in parts {
            if let Some((key, value)) = param.trim().split_once('=') {
                let key = key.trim().to_lowercase();
                if key != "q" {
                    params.insert(key, value.trim().trim_matches('"').to_string());
                }
            }
        }

        Some(Self {
            type_,
            subtype,
            params,
        })
    }

    /// Check if this media type matches another (considering wildcards).
    pub fn matches(&self, other: &MediaType) -> bool {
        let type_matches = self.type_ == "*" || other.type_ == "*" || self.type_ == other.type_;
        let subtype_matches =
            self.subtype == "*" || other.subtype == "*" || self.subtype == other.subtype;
        type_matches && subtype_matches
    }

    /// Check if either part is a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.type_ == "*" || self.subtype == "*"
    }

    /// Structured syntax suffix, e.g. `json` for `application/problem+json`.
    pub fn suffix(&self) -> Option<&str> {
        self.subtype.rsplit_once('+').map(|(_, suffix)| suffix)
    }

    pub fn charset(&self) -> Option<&str> {
        self.params.get("charset").map(String::as_str)
    }

    /// `type/subtype` without parameters.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.type_, self.subtype)
    }

    fn specificity(&self) -> u8 {
        let mut score = 0u8;
        if self.type_ != "*" {
            score += 2;
        }
        if self.subtype != "*" {
            score += 1;
        }
        score
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.type_, self.subtype)?;
        let mut params: Vec<_> = self.params.iter().collect();
        params.sort();
        for (key, value) in params {
            write!(f, "; {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Split `value; q=0.5` into the value and its clamped quality.
///
/// Parameters after `q` are accept-extensions and are dropped with it.
fn split_quality(s: &str) -> (&str, f32) {
    let mut offset = 0;
    for segment in s.split(';') {
        let start = offset;
        offset += segment.len() + 1;
        if start == 0 {
            continue;
        }

        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("q") {
            let quality = value.trim().parse::<f32>().unwrap_or(1.0).clamp(0.0, 1.0);
            return (s[..start - 1].trim_end(), quality);
        }
    }
    (s, 1.0)
}

// ============================================================================
// Accept Header
// ============================================================================

/// A parsed `Accept` header, most preferred first.
#[derive(Debug, Clone, Default)]
pub struct Accept {
    pub media_types: Vec<(MediaType, f32)>,
}

impl Accept {
    pub fn parse(header: &str) -> Self {
        let mut media_types: Vec<(MediaType, f32)> = header
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                let (media_part, quality) = split_quality(part);
                MediaType::parse(media_part).map(|mt| (mt, quality))
            })
            .collect();

        // Quality first, then specificity; the sort is stable so ties keep
        // header order.
        media_types.sort_by(|a, b| match b.1.partial_cmp(&a.1) {
            Some(Ordering::Equal) | None => b.0.specificity().cmp(&a.0.specificity()),
            Some(ord) => ord,
        });

        Self { media_types }
    }

    /// Quality of the most specific entry matching `media_type`.
    pub fn quality_for(&self, media_type: &MediaType) -> f32 {
        self.media_types
            .iter()
            .filter(|(mt, _)| mt.matches(media_type))
            .max_by_key(|(mt, _)| mt.specificity())
            .map(|(_, quality)| *quality)
            .unwrap_or(0.0)
    }

    pub fn accepts(&self, media_type: &MediaType) -> bool {
        self.quality_for(media_type) > 0.0
    }

    pub fn preferred(&self) -> Option<&MediaType> {
        self.media_types.first().map(|(mt, _)| mt)
    }
}

// ============================================================================
// Accept-Charset Header
// ============================================================================

/// A parsed `Accept-Charset` header.
#[derive(Debug, Clone, Default)]
pub struct AcceptCharset {
    pub charsets: Vec<(String, f32)>,
}

impl AcceptCharset {
    pub fn parse(header: &str) -> Self {
        let mut charsets: Vec<(String, f32)> = header
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (charset, quality) = split_quality(part);
                (charset.trim().to_lowercase(), quality)
            })
            .collect();

        charsets.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        Self { charsets }
    }

    pub fn quality_for(&self, charset: &str) -> f32 {
        let charset = charset.to_lowercase();
        if let Some((_, quality)) = self.charsets.iter().find(|(cs, _)| *cs == charset) {
            return *quality;
        }
        if let Some((_, quality)) = self.charsets.iter().find(|(cs, _)| cs == "*") {
            return *quality;
        }
        // UTF-8 is acceptable unless explicitly refused
        if charset == "utf-8" { 1.0 } else { 0.0 }
    }
}

// ============================================================================
// Formatters
// ============================================================================

/// Reads and writes bodies of one family of media types.
///
/// Formatters decode into a format-neutral [`Value`] tree; the typed
/// conversion to a body parameter's declared type happens in
/// [`MediaTypeFormatter::read_from_stream`] through its [`BodyType`].
pub trait MediaTypeFormatter: Send + Sync + 'static {
    /// Media types this formatter handles, preferred first.
    fn supported_media_types(&self) -> &[MediaType];

    /// Decode the stream into a value tree.
    fn read_value(&self, stream: &mut dyn Read) -> Result<Value, SerializationError>;

    /// Encode `value` onto the stream.
    fn write_to_stream(&self, value: &Value, stream: &mut dyn Write) -> Result<(), SerializationError>;

    /// Decode the stream into an instance of `target`.
    fn read_from_stream(
        &self,
        stream: &mut dyn Read,
        target: &BodyType,
    ) -> Result<Box<dyn Any + Send>, SerializationError> {
        let value = self.read_value(stream)?;
        target.decode(value)
    }

    fn can_read(&self, media_type: &MediaType) -> bool {
        self.supported_media_types()
            .iter()
            .any(|supported| supported.type_ == media_type.type_ && supported.subtype == media_type.subtype)
    }

    fn can_write(&self, media_type: &MediaType) -> bool {
        self.supported_media_types()
            .iter()
            .any(|supported| supported.matches(media_type))
    }

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// `application/json` and any `+json` structured syntax.
#[derive(Debug, Clone)]
pub struct JsonMediaTypeFormatter {
    media_types: Vec<MediaType>,
}

impl JsonMediaTypeFormatter {
    pub fn new() -> Self {
        Self {
            media_types: vec![MediaType::json()],
        }
    }
}

impl Default for JsonMediaTypeFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTypeFormatter for JsonMediaTypeFormatter {
    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn read_value(&self, stream: &mut dyn Read) -> Result<Value, SerializationError> {
        serde_json::from_reader(stream).map_err(|e| SerializationError::Malformed {
            media_type: "application/json".to_string(),
            message: e.to_string(),
        })
    }

    fn write_to_stream(&self, value: &Value, stream: &mut dyn Write) -> Result<(), SerializationError> {
        serde_json::to_writer(&mut *stream, value).map_err(|e| SerializationError::Malformed {
            media_type: "application/json".to_string(),
            message: e.to_string(),
        })
    }

    fn can_read(&self, media_type: &MediaType) -> bool {
        media_type.type_ == "application"
            && (media_type.subtype == "json" || media_type.suffix() == Some("json"))
    }

    fn can_write(&self, media_type: &MediaType) -> bool {
        media_type.is_wildcard() && media_type.matches(&MediaType::json()) || self.can_read(media_type)
    }
}

/// `text/plain`; strings pass through verbatim.
#[derive(Debug, Clone)]
pub struct PlainTextMediaTypeFormatter {
    media_types: Vec<MediaType>,
}

impl PlainTextMediaTypeFormatter {
    pub fn new() -> Self {
        Self {
            media_types: vec![MediaType::plain_text()],
        }
    }
}

impl Default for PlainTextMediaTypeFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTypeFormatter for PlainTextMediaTypeFormatter {
    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn read_value(&self, stream: &mut dyn Read) -> Result<Value, SerializationError> {
        let mut text = String::new();
        stream.read_to_string(&mut text).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                SerializationError::Malformed {
                    media_type: "text/plain".to_string(),
                    message: "body is not valid UTF-8".to_string(),
                }
            } else {
                SerializationError::Io(e)
            }
        })?;
        Ok(Value::String(text))
    }

    fn write_to_stream(&self, value: &Value, stream: &mut dyn Write) -> Result<(), SerializationError> {
        let text = match value {
            Value::Null => return Ok(()),
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(SerializationError::Unsupported {
                    media_type: "text/plain".to_string(),
                    value_kind: if value.is_array() { "array" } else { "object" },
                });
            }
        };
        stream.write_all(text.as_bytes())?;
        Ok(())
    }
}

// ============================================================================
// Negotiation
// ============================================================================

/// The outcome of negotiating one direction (request or response) of a
/// request's content.
#[derive(Clone)]
pub struct ContentNegotiationResult {
    formatter: Arc<dyn MediaTypeFormatter>,
    media_type: Option<MediaType>,
    charset: Option<String>,
}

impl ContentNegotiationResult {
    pub fn new(
        formatter: Arc<dyn MediaTypeFormatter>,
        media_type: Option<MediaType>,
        charset: Option<String>,
    ) -> Self {
        Self {
            formatter,
            media_type,
            charset,
        }
    }

    pub fn formatter(&self) -> &dyn MediaTypeFormatter {
        self.formatter.as_ref()
    }

    pub fn media_type(&self) -> Option<&MediaType> {
        self.media_type.as_ref()
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    /// Value for a `Content-Type` header describing this result.
    pub fn content_type(&self) -> Option<String> {
        let media_type = self.media_type.as_ref()?;
        Some(match &self.charset {
            Some(charset) => format!("{}; charset={}", media_type.mime_type(), charset),
            None => media_type.mime_type(),
        })
    }
}

impl fmt::Debug for ContentNegotiationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentNegotiationResult")
            .field("formatter", &self.formatter.name())
            .field("media_type", &self.media_type)
            .field("charset", &self.charset)
            .finish()
    }
}

/// Selects formatters for the two directions of a request.
pub trait ContentNegotiator: Send + Sync {
    /// Formatter able to read the request body, or `None`.
    fn negotiate_request_content(&self, request: &Request) -> Option<ContentNegotiationResult>;

    /// Formatter the client accepts for the response body, or `None`.
    fn negotiate_response_content(&self, request: &Request) -> Option<ContentNegotiationResult>;
}

/// Header-driven negotiator over a list of formatters.
#[derive(Clone)]
pub struct MediaTypeNegotiator {
    formatters: Vec<Arc<dyn MediaTypeFormatter>>,
    default_charset: String,
}

impl MediaTypeNegotiator {
    /// A negotiator with no formatters.
    pub fn new() -> Self {
        Self {
            formatters: Vec::new(),
            default_charset: "utf-8".to_string(),
        }
    }

    /// Add a formatter. Earlier formatters win ties.
    pub fn with_formatter<F: MediaTypeFormatter>(mut self, formatter: F) -> Self {
        self.formatters.push(Arc::new(formatter));
        self
    }

    pub fn with_formatter_arc(mut self, formatter: Arc<dyn MediaTypeFormatter>) -> Self {
        self.formatters.push(formatter);
        self
    }

    pub fn with_default_charset(mut self, charset: impl Into<String>) -> Self {
        self.default_charset = charset.into().to_lowercase();
        self
    }

    pub fn formatters(&self) -> &[Arc<dyn MediaTypeFormatter>] {
        &self.formatters
    }

    fn response_charset(&self, request: &Request) -> Option<String> {
        match request.header("Accept-Charset") {
            Some(header) if AcceptCharset::parse(header).quality_for(&self.default_charset) <= 0.0 => None,
            _ => Some(self.default_charset.clone()),
        }
    }
}

impl Default for MediaTypeNegotiator {
    /// JSON first, then plain text.
    fn default() -> Self {
        Self::new()
            .with_formatter(JsonMediaTypeFormatter::new())
            .with_formatter(PlainTextMediaTypeFormatter::new())
    }
}

impl ContentNegotiator for MediaTypeNegotiator {
    fn negotiate_request_content(&self, request: &Request) -> Option<ContentNegotiationResult> {
        let media_type = MediaType::parse(request.header("Content-Type")?)?;
        let formatter = self.formatters.iter().find(|f| f.can_read(&media_type))?;
        let charset = media_type
            .charset()
            .map(str::to_lowercase)
            .unwrap_or_else(|| self.default_charset.clone());

        Some(ContentNegotiationResult::new(
            formatter.clone(),
            Some(media_type),
            Some(charset),
        ))
    }

    fn negotiate_response_content(&self, request: &Request) -> Option<ContentNegotiationResult> {
        let charset = self.response_charset(request)?;

        let Some(header) = request.header("Accept") else {
            let formatter = self.formatters.first()?;
            let media_type = formatter.supported_media_types().first().cloned();
            return Some(ContentNegotiationResult::new(formatter.clone(), media_type, Some(charset)));
        };

        let accept = Accept::parse(header);
        for (accepted, quality) in &accept.media_types {
            if *quality <= 0.0 {
                continue;
            }
            for formatter in &self.formatters {
                if !formatter.can_write(accepted) {
                    continue;
                }
                let media_type = if accepted.is_wildcard() {
                    formatter
                        .supported_media_types()
                        .iter()
                        .find(|mt| accepted.matches(mt))
                        .cloned()
                } else {
                    Some(MediaType::new(accepted.type_.clone(), accepted.subtype.clone()))
                };
                // An explicitly refused type further down the header still wins
                if let Some(mt) = &media_type
                    && accept.quality_for(mt) <= 0.0
                {
                    continue;
                }
                return Some(ContentNegotiationResult::new(formatter.clone(), media_type, Some(charset)));
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, Uri};

    fn request() -> Request {
        Request::new(Method::POST, Uri::from_static("/"))
    }

    #[test]
    fn test_media_type_parse() {
        let mt = MediaType::parse("Application/JSON; charset=UTF-8").unwrap();
        assert_eq!(mt.type_, "application");
        assert_eq!(mt.subtype, "json");
        assert_eq!(mt.charset(), Some("UTF-8"));
        assert!(MediaType::parse("nonsense").is_none());
    }

    #[test]
    fn test_media_type_suffix() {
        let mt = MediaType::parse("application/problem+json").unwrap();
        assert_eq!(mt.suffix(), Some("json"));
        assert_eq!(MediaType::json().suffix(), None);
    }

    #[test]
    fn test_accept_ordering() {
        let accept = Accept::parse("text/*;q=0.5, text/plain, */*;q=0.1");
        assert_eq!(accept.media_types[0].0, MediaType::plain_text());
        assert_eq!(accept.quality_for(&MediaType::html()), 0.5);
        assert_eq!(accept.quality_for(&MediaType::json()), 0.1);
    }

    #[test]
    fn test_accept_quality_with_whitespace() {
        let accept = Accept::parse("text/plain; q=0.1, application/json");
        assert_eq!(accept.media_types[0].0, MediaType::json());
        assert_eq!(accept.quality_for(&MediaType::plain_text()), 0.1);

        let accept = Accept::parse("text/plain ; Q = 0 ; level=1");
        assert_eq!(accept.media_types[0].0, MediaType::plain_text());
        assert_eq!(accept.quality_for(&MediaType::plain_text()), 0.0);

        let accept = Accept::parse("text/html;level=1;q=0.7");
        assert_eq!(accept.media_types[0].1, 0.7);
        assert_eq!(accept.media_types[0].0.params.get("level").map(String::as_str), Some("1"));

        assert_eq!(AcceptCharset::parse("utf-8; q=0").quality_for("utf-8"), 0.0);
    }

    #[test]
    fn test_response_negotiation_honours_spaced_quality() {
        let negotiator = MediaTypeNegotiator::default();
        let req = request().with_header("Accept", "text/plain; q=0.1, application/json");
        let result = negotiator.negotiate_response_content(&req).unwrap();
        assert_eq!(result.media_type(), Some(&MediaType::json()));
    }

    #[test]
    fn test_accept_charset() {
        let accept = AcceptCharset::parse("iso-8859-1, utf-8;q=0");
        assert_eq!(accept.quality_for("utf-8"), 0.0);
        assert_eq!(accept.quality_for("iso-8859-1"), 1.0);
        assert_eq!(AcceptCharset::parse("iso-8859-1").quality_for("utf-8"), 1.0);
    }

    #[test]
    fn test_request_negotiation_by_content_type() {
        let negotiator = MediaTypeNegotiator::default();
        let req = request().with_header("Content-Type", "application/vnd.api+json");
        let result = negotiator.negotiate_request_content(&req).unwrap();
        assert_eq!(result.media_type().unwrap().subtype, "vnd.api+json");
        assert_eq!(result.charset(), Some("utf-8"));

        let req = request().with_header("Content-Type", "text/plain; charset=ISO-8859-1");
        let result = negotiator.negotiate_request_content(&req).unwrap();
        assert_eq!(result.media_type(), Some(&MediaType::plain_text().with_param("charset", "ISO-8859-1")));
        assert_eq!(result.charset(), Some("iso-8859-1"));
    }

    #[test]
    fn test_request_negotiation_fails_without_formatter() {
        let negotiator = MediaTypeNegotiator::default();
        assert!(negotiator.negotiate_request_content(&request()).is_none());

        let req = request().with_header("Content-Type", "application/xml");
        assert!(negotiator.negotiate_request_content(&req).is_none());
    }

    #[test]
    fn test_response_negotiation_defaults_to_first_formatter() {
        let negotiator = MediaTypeNegotiator::default();
        let result = negotiator.negotiate_response_content(&request()).unwrap();
        assert_eq!(result.content_type().as_deref(), Some("application/json; charset=utf-8"));
    }

    #[test]
    fn test_response_negotiation_by_accept() {
        let negotiator = MediaTypeNegotiator::default();

        let req = request().with_header("Accept", "text/plain, application/json;q=0.5");
        let result = negotiator.negotiate_response_content(&req).unwrap();
        assert_eq!(result.media_type(), Some(&MediaType::plain_text()));

        let req = request().with_header("Accept", "text/*");
        let result = negotiator.negotiate_response_content(&req).unwrap();
        assert_eq!(result.media_type(), Some(&MediaType::plain_text()));

        let req = request().with_header("Accept", "*/*, application/json;q=0");
        let result = negotiator.negotiate_response_content(&req).unwrap();
        assert_eq!(result.media_type(), Some(&MediaType::plain_text()));

        let req = request().with_header("Accept", "image/png");
        assert!(negotiator.negotiate_response_content(&req).is_none());
    }

    #[test]
    fn test_response_negotiation_respects_accept_charset() {
        let negotiator = MediaTypeNegotiator::default();
        let req = request().with_header("Accept-Charset", "utf-8;q=0");
        assert!(negotiator.negotiate_response_content(&req).is_none());
    }

    #[test]
    fn test_json_formatter_roundtrip_to_type() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct User {
            id: u32,
        }

        let formatter = JsonMediaTypeFormatter::new();
        let mut body: &[u8] = br#"{"id": 7}"#;
        let user = formatter
            .read_from_stream(&mut body, &BodyType::of::<User>())
            .unwrap()
            .downcast::<User>()
            .unwrap();
        assert_eq!(*user, User { id: 7 });

        let mut bad: &[u8] = br#"{"id": "seven"}"#;
        let err = formatter
            .read_from_stream(&mut bad, &BodyType::of::<User>())
            .unwrap_err();
        assert!(matches!(err, SerializationError::Type { .. }));
    }

    #[test]
    fn test_plain_text_formatter_writes_strings_verbatim() {
        let formatter = PlainTextMediaTypeFormatter::new();
        let mut out = Vec::new();
        formatter
            .write_to_stream(&Value::String("foo".into()), &mut out)
            .unwrap();
        assert_eq!(out, b"foo");

        let err = formatter
            .write_to_stream(&serde_json::json!({"a": 1}), &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, SerializationError::Unsupported { value_kind: "object", .. }));
    }
}
