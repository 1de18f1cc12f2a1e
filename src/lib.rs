// Conduit - route action dispatch for Rust
//
// Binds route and query variables and request bodies to action parameters,
// invokes controller methods and closures, and turns their results or their
// failures into exactly one response per request.

// Re-export core functionality
pub use conduit_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use conduit_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        ActionResult,
        ActionSignature,
        Arguments,
        Container,
        ContentNegotiator,
        Controller,
        CreatedResponseFactory,
        Error,
        ExceptionHandler,
        ExceptionResponseFactoryRegistry,
        FormalParameter,
        HttpException,
        Kernel,
        MatchedRoute,
        MediaTypeNegotiator,
        MethodInfo,
        OkResponseFactory,
        Request,
        Response,
        ResponseFactory,
        RouteAction,
        async_trait,
    };

    #[cfg(feature = "config")]
    pub use conduit_config::{Settings, SettingsLoader};
}
