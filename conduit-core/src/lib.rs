// Core library for the Conduit dispatch pipeline
// Binds route action parameters from requests, invokes actions and turns their
// results, or their failures, into responses.

pub mod action;
pub mod arguments;
pub mod container;
pub mod content_negotiation;
pub mod context;
pub mod error;
pub mod exception_handler;
pub mod headers;
pub mod http;
pub mod invoker;
pub mod kernel;
pub mod logging;
pub mod resolver;
pub mod response_factory;

// Re-export commonly used types
pub use action::*;
pub use arguments::*;
pub use container::*;
pub use content_negotiation::*;
pub use context::*;
pub use error::*;
pub use exception_handler::*;
pub use headers::{Header, HeaderMap};
pub use self::http::{Request, Response, parse_query_string};
pub use invoker::*;
pub use kernel::*;
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput, LoggingError, Rotation};
pub use resolver::*;
pub use response_factory::*;

// Re-export async_trait for Controller implementations
pub use async_trait::async_trait;
