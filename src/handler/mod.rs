//! Handlers: the canonical `(Context, Request) -> Response` shape and its adapters.
//!
//! Routes accept several handler shapes, listed in [`HandlerSpec`]. Each is turned
//! into a [`Handler`] once, when the route is registered, by [`adapt`]; the router
//! and the middleware chain only ever deal with [`Handler`].
//!
//! | Shape                                  | Sees the [`Context`]? |
//! |----------------------------------------|-----------------------|
//! | [`Handler`] (`Handler::from_fn`)        | yes                   |
//! | [`HttpHandler`] (`HttpHandler::from_fn`)| no                    |
//! | `Arc<dyn ServeHttpC>`                   | yes                   |
//! | `Arc<dyn ServeHttp>`                    | no                    |

use std::{any::Any, fmt, future::Future, pin::Pin, sync::Arc};

use thiserror::Error;

use crate::{Request, Response, context::Context};

/// Boxed, `Send` future returned by every handler.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type ContextFn = dyn Fn(Context, Request) -> BoxFuture<Response> + Send + Sync + 'static;
type PlainFn = dyn Fn(Request) -> BoxFuture<Response> + Send + Sync + 'static;

/// Raised when a handler or middleware spec has a shape the router cannot use.
#[derive(Debug, Error)]
pub enum AdaptError {
    #[error("unsupported handler shape: {0}")]
    UnsupportedHandlerShape(String),
}

/// The canonical handler: receives the request's [`Context`] and the [`Request`],
/// produces the [`Response`].
///
/// Clones share the same underlying function.
///
/// ```
/// use rttp_web::{Response, StatusCode, context::Context, handler::Handler, Request};
///
/// let hello = Handler::from_fn(|ctx: Context, _req: Request| async move {
///     let name = ctx.param("name").unwrap_or("stranger").to_owned();
///     Response::new(StatusCode::Ok).body(format!("Hello, {name}!"))
/// });
/// # let _ = hello;
/// ```
#[derive(Clone)]
pub struct Handler {
    inner: Arc<ContextFn>,
}

impl Handler {
    /// Wrap an async function of the context and the request.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::from_boxed_fn(move |ctx, req| Box::pin(f(ctx, req)))
    }

    pub(crate) fn from_boxed_fn<F>(f: F) -> Self
    where
        F: Fn(Context, Request) -> BoxFuture<Response> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Lift a context-unaware handler; the context is dropped on the way in.
    pub fn from_http(handler: HttpHandler) -> Self {
        Self::from_boxed_fn(move |_ctx, req| handler.call(req))
    }

    /// Invoke the handler.
    pub fn call(&self, ctx: Context, req: Request) -> BoxFuture<Response> {
        (self.inner)(ctx, req)
    }

    /// Use this handler where a context-unaware one is expected.
    ///
    /// Each call receives a fresh, empty [`Context`].
    pub fn into_http(self) -> HttpHandler {
        HttpHandler::from_boxed_fn(move |req| self.call(Context::default(), req))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler(..)")
    }
}

/// A handler that never sees the [`Context`], the shape plain request/response
/// code and context-unaware middleware deal in.
#[derive(Clone)]
pub struct HttpHandler {
    inner: Arc<PlainFn>,
}

impl HttpHandler {
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::from_boxed_fn(move |req| Box::pin(f(req)))
    }

    pub(crate) fn from_boxed_fn<F>(f: F) -> Self
    where
        F: Fn(Request) -> BoxFuture<Response> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    pub fn call(&self, req: Request) -> BoxFuture<Response> {
        (self.inner)(req)
    }
}

impl fmt::Debug for HttpHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HttpHandler(..)")
    }
}

/// A context-unaware handler object, for types that carry their own state.
pub trait ServeHttp: Send + Sync {
    fn serve_http(&self, req: Request) -> BoxFuture<Response>;
}

/// A context-aware handler object.
pub trait ServeHttpC: Send + Sync {
    fn serve_http_c(&self, ctx: Context, req: Request) -> BoxFuture<Response>;
}

impl ServeHttp for HttpHandler {
    fn serve_http(&self, req: Request) -> BoxFuture<Response> {
        self.call(req)
    }
}

impl ServeHttpC for Handler {
    fn serve_http_c(&self, ctx: Context, req: Request) -> BoxFuture<Response> {
        self.call(ctx, req)
    }
}

// Served as a plain handler, a context-aware handler gets an empty context.
impl ServeHttp for Handler {
    fn serve_http(&self, req: Request) -> BoxFuture<Response> {
        self.call(Context::default(), req)
    }
}

/// Every handler shape a route accepts.
pub enum HandlerSpec {
    /// Plain request → response handler; the context is ignored.
    Http(HttpHandler),
    /// Context-aware handler, used as-is.
    Contextual(Handler),
    /// Context-unaware handler object.
    Service(Arc<dyn ServeHttp>),
    /// Context-aware handler object.
    ServiceC(Arc<dyn ServeHttpC>),
    /// A type-erased spec, resolved by [`HandlerSpec::from_any`].
    Dynamic(Box<dyn Any + Send + Sync>),
}

impl HandlerSpec {
    /// Resolve a type-erased handler.
    ///
    /// Accepts [`Handler`], [`HttpHandler`], `Arc<dyn ServeHttp>`,
    /// `Arc<dyn ServeHttpC>` and `HandlerSpec` itself.
    ///
    /// # Errors
    ///
    /// [`AdaptError::UnsupportedHandlerShape`] for any other type.
    pub fn from_any(value: Box<dyn Any + Send + Sync>) -> Result<Self, AdaptError> {
        let value = match value.downcast::<Handler>() {
            Ok(handler) => return Ok(Self::Contextual(*handler)),
            Err(value) => value,
        };
        let value = match value.downcast::<HttpHandler>() {
            Ok(handler) => return Ok(Self::Http(*handler)),
            Err(value) => value,
        };
        let value = match value.downcast::<Arc<dyn ServeHttp>>() {
            Ok(service) => return Ok(Self::Service(*service)),
            Err(value) => value,
        };
        let value = match value.downcast::<Arc<dyn ServeHttpC>>() {
            Ok(service) => return Ok(Self::ServiceC(*service)),
            Err(value) => value,
        };
        match value.downcast::<HandlerSpec>() {
            Ok(spec) if !matches!(*spec, HandlerSpec::Dynamic(_)) => Ok(*spec),
            Ok(_) => Err(AdaptError::UnsupportedHandlerShape(
                "nested dynamic handler spec".to_owned(),
            )),
            Err(value) => Err(AdaptError::UnsupportedHandlerShape(format!(
                "handler of type {:?}",
                (*value).type_id()
            ))),
        }
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::Http(_) => "Http",
            Self::Contextual(_) => "Contextual",
            Self::Service(_) => "Service",
            Self::ServiceC(_) => "ServiceC",
            Self::Dynamic(_) => "Dynamic",
        };
        write!(f, "HandlerSpec::{shape}(..)")
    }
}

impl From<Handler> for HandlerSpec {
    fn from(handler: Handler) -> Self {
        Self::Contextual(handler)
    }
}

impl From<HttpHandler> for HandlerSpec {
    fn from(handler: HttpHandler) -> Self {
        Self::Http(handler)
    }
}

impl From<Arc<dyn ServeHttp>> for HandlerSpec {
    fn from(service: Arc<dyn ServeHttp>) -> Self {
        Self::Service(service)
    }
}

impl From<Arc<dyn ServeHttpC>> for HandlerSpec {
    fn from(service: Arc<dyn ServeHttpC>) -> Self {
        Self::ServiceC(service)
    }
}

/// Normalize any accepted handler shape into a [`Handler`].
///
/// Context-unaware shapes are wrapped so they ignore the context; their responses
/// pass through untouched.
///
/// # Errors
///
/// [`AdaptError::UnsupportedHandlerShape`] when a [`HandlerSpec::Dynamic`] value
/// is none of the accepted types.
pub fn adapt(spec: impl Into<HandlerSpec>) -> Result<Handler, AdaptError> {
    let spec = match spec.into() {
        HandlerSpec::Dynamic(value) => HandlerSpec::from_any(value)?,
        spec => spec,
    };

    Ok(match spec {
        HandlerSpec::Contextual(handler) => handler,
        HandlerSpec::Http(handler) => Handler::from_http(handler),
        HandlerSpec::Service(service) => {
            Handler::from_boxed_fn(move |_ctx, req| service.serve_http(req))
        }
        HandlerSpec::ServiceC(service) => {
            Handler::from_boxed_fn(move |ctx, req| service.serve_http_c(ctx, req))
        }
        HandlerSpec::Dynamic(_) => {
            return Err(AdaptError::UnsupportedHandlerShape(
                "nested dynamic handler spec".to_owned(),
            ));
        }
    })
}
