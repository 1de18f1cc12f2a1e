// Route actions and the metadata that describes their parameters
//
// Signatures are declared explicitly when a route is defined instead of being
// discovered at dispatch time. Free functions are stored type-erased behind an
// Arc, the same way boxed handlers are, so route tables stay cheap to clone.

use crate::arguments::Arguments;
use crate::error::{SerializationError, SignatureError};
use crate::http::Response;
use crate::response_factory::ResponseFactory;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Display identity used for actions that are not controller methods.
pub const CLOSURE_DISPLAY_NAME: &str = "Closure";

/// The future a route action returns.
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<ActionResult, anyhow::Error>> + Send>>;

type DecodeFn = fn(Value) -> Result<Box<dyn Any + Send>, serde_json::Error>;

/// The declared type of a body parameter, with a decoder into it.
#[derive(Clone, Copy)]
pub struct BodyType {
    type_name: &'static str,
    decode: DecodeFn,
}

impl BodyType {
    pub fn of<T: DeserializeOwned + Send + 'static>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            decode: decode_as::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Convert a decoded value tree into an instance of this type.
    pub fn decode(&self, value: Value) -> Result<Box<dyn Any + Send>, SerializationError> {
        (self.decode)(value).map_err(|source| SerializationError::Type {
            type_name: self.type_name,
            source,
        })
    }
}

fn decode_as<T: DeserializeOwned + Send + 'static>(
    value: Value,
) -> Result<Box<dyn Any + Send>, serde_json::Error> {
    serde_json::from_value::<T>(value).map(|v| Box::new(v) as Box<dyn Any + Send>)
}

impl fmt::Debug for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BodyType").field(&self.type_name).finish()
    }
}

/// Declared type of a formal parameter.
#[derive(Debug, Clone, Copy)]
pub enum ParameterType {
    /// A primitive bound from route or query variables.
    Scalar { type_name: &'static str },
    /// An object type bound by deserializing the request body.
    Object(BodyType),
}

/// One declared parameter of a route action.
#[derive(Debug, Clone)]
pub struct FormalParameter {
    name: String,
    ty: ParameterType,
    nullable: bool,
    default: Option<String>,
}

impl FormalParameter {
    /// A primitive parameter declared as `T`.
    pub fn scalar<T: ?Sized>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ParameterType::Scalar {
                type_name: std::any::type_name::<T>(),
            },
            nullable: false,
            default: None,
        }
    }

    /// Shorthand for a `String` parameter.
    pub fn string(name: impl Into<String>) -> Self {
        Self::scalar::<String>(name)
    }

    /// An object parameter read from the request body.
    pub fn body<T: DeserializeOwned + Send + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ParameterType::Object(BodyType::of::<T>()),
            nullable: false,
            default: None,
        }
    }

    /// Allow the parameter to resolve to null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Default used when neither the route nor the query string provide a value.
    ///
    /// Stored in the same raw string form as route and query values.
    pub fn with_default(mut self, value: impl ToString) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter_type(&self) -> ParameterType {
        self.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn is_body(&self) -> bool {
        matches!(self.ty, ParameterType::Object(_))
    }
}

/// The ordered parameter list of a route action.
#[derive(Debug, Clone)]
pub struct ActionSignature {
    parameters: Arc<[FormalParameter]>,
}

impl ActionSignature {
    /// A signature without parameters.
    pub fn empty() -> Self {
        Self {
            parameters: Arc::from(Vec::new()),
        }
    }

    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    /// Parameters in declaration order.
    pub fn parameters(&self) -> &[FormalParameter] {
        &self.parameters
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

impl Default for ActionSignature {
    fn default() -> Self {
        Self::empty()
    }
}

/// Collects parameters and validates them into an [`ActionSignature`].
#[derive(Debug, Default)]
pub struct SignatureBuilder {
    parameters: Vec<FormalParameter>,
}

impl SignatureBuilder {
    pub fn param(mut self, parameter: FormalParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Names must be unique and at most one parameter may read the body,
    /// since the body can only be consumed once.
    pub fn build(self) -> Result<ActionSignature, SignatureError> {
        let mut seen = HashSet::new();
        let mut body: Option<&str> = None;

        for parameter in &self.parameters {
            if !seen.insert(parameter.name()) {
                return Err(SignatureError::DuplicateParameter(parameter.name().to_string()));
            }
            if parameter.is_body() {
                if let Some(first) = body {
                    return Err(SignatureError::MultipleBodyParameters {
                        first: first.to_string(),
                        second: parameter.name().to_string(),
                    });
                }
                body = Some(parameter.name());
            }
        }

        Ok(ActionSignature {
            parameters: Arc::from(self.parameters),
        })
    }
}

/// Accessibility of a controller method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

/// What a controller reports about one of its methods.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub signature: ActionSignature,
    pub visibility: Visibility,
}

impl MethodInfo {
    pub fn public(signature: ActionSignature) -> Self {
        Self {
            signature,
            visibility: Visibility::Public,
        }
    }

    pub fn protected(signature: ActionSignature) -> Self {
        Self {
            signature,
            visibility: Visibility::Protected,
        }
    }

    pub fn private(signature: ActionSignature) -> Self {
        Self {
            signature,
            visibility: Visibility::Private,
        }
    }
}

/// A type whose methods can serve as route actions.
///
/// `reflect` exposes a method's declared parameters; `call` runs it with
/// arguments resolved for those parameters. Only methods reported as
/// [`Visibility::Public`] are ever called by the invoker.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl Controller for UserController {
///     fn reflect(&self, method: &str) -> Option<MethodInfo> {
///         match method {
///             "show" => Some(MethodInfo::public(self.show_signature.clone())),
///             _ => None,
///         }
///     }
///
///     async fn call(&self, method: &str, args: Arguments) -> anyhow::Result<ActionResult> {
///         match method {
///             "show" => self.show(args.parse("id")?).await,
///             other => anyhow::bail!("no method {other}"),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    /// Describe `method`, or `None` if the controller has no such method.
    fn reflect(&self, method: &str) -> Option<MethodInfo>;

    /// Run `method` with its resolved arguments.
    async fn call(&self, method: &str, args: Arguments) -> Result<ActionResult, anyhow::Error>;
}

/// Name under which a controller type is registered and displayed.
pub fn controller_name<C: ?Sized>() -> &'static str {
    std::any::type_name::<C>()
}

/// A free function route action with its declared signature.
#[derive(Clone)]
pub struct ActionFunction {
    signature: ActionSignature,
    handler: Arc<dyn Fn(Arguments) -> ActionFuture + Send + Sync>,
}

impl ActionFunction {
    pub fn new<F, Fut>(signature: ActionSignature, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionResult, anyhow::Error>> + Send + 'static,
    {
        Self {
            signature,
            handler: Arc::new(move |args| Box::pin(f(args))),
        }
    }

    pub fn signature(&self) -> &ActionSignature {
        &self.signature
    }

    #[inline]
    pub fn call(&self, args: Arguments) -> ActionFuture {
        (self.handler)(args)
    }
}

impl fmt::Debug for ActionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionFunction")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// The callable a matched route dispatches to.
#[derive(Debug, Clone)]
pub enum RouteAction {
    /// A method on a controller obtained from the dependency resolver.
    Method { owner: String, method: String },
    /// A directly invocable function.
    Function(ActionFunction),
}

impl RouteAction {
    /// A method on controller type `C`.
    pub fn method<C: Controller>(method: impl Into<String>) -> Self {
        Self::bound(controller_name::<C>(), method)
    }

    /// A method on the controller registered as `owner`.
    pub fn bound(owner: impl Into<String>, method: impl Into<String>) -> Self {
        RouteAction::Method {
            owner: owner.into(),
            method: method.into(),
        }
    }

    pub fn function<F, Fut>(signature: ActionSignature, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionResult, anyhow::Error>> + Send + 'static,
    {
        RouteAction::Function(ActionFunction::new(signature, f))
    }

    /// `Owner::method` for controller methods, `Closure` otherwise.
    pub fn display_name(&self) -> String {
        match self {
            RouteAction::Method { owner, method } => format!("{}::{}", owner, method),
            RouteAction::Function(_) => CLOSURE_DISPLAY_NAME.to_string(),
        }
    }
}

/// What a route action returned.
pub enum ActionResult {
    /// A finished response, passed through unchanged.
    Response(Response),
    /// The action has nothing to return.
    NoContent,
    /// A factory that builds the response from the request context.
    Factory(Box<dyn ResponseFactory>),
    /// A value to send as the body of a 200 response.
    Value(Value),
}

impl ActionResult {
    /// Serialize `value` into a 200 response body.
    pub fn value<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(ActionResult::Value)
    }

    /// Send an already built JSON value.
    pub fn json(value: Value) -> Self {
        ActionResult::Value(value)
    }

    pub fn factory<F: ResponseFactory + 'static>(factory: F) -> Self {
        ActionResult::Factory(Box::new(factory))
    }
}

impl From<Response> for ActionResult {
    fn from(response: Response) -> Self {
        ActionResult::Response(response)
    }
}

impl From<()> for ActionResult {
    fn from(_: ()) -> Self {
        ActionResult::NoContent
    }
}

impl From<Value> for ActionResult {
    fn from(value: Value) -> Self {
        ActionResult::Value(value)
    }
}

impl fmt::Debug for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionResult::Response(response) => f.debug_tuple("Response").field(response).finish(),
            ActionResult::NoContent => f.write_str("NoContent"),
            ActionResult::Factory(_) => f.write_str("Factory(..)"),
            ActionResult::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}
