//! Middleware: adapting wrapping functions and composing them into a chain.
//!
//! Two middleware shapes are accepted (see [`MiddlewareSpec`]):
//!
//! - **Wrap**: `Fn(HttpHandler) -> HttpHandler`. The middleware never sees the
//!   [`Context`]; it decorates a plain handler, the way `net/http`-style code does.
//! - **Contextual**: [`Middleware::handle`] receives the [`Context`] and the
//!   [`Request`] *before* the inner handler runs, may change either, and decides
//!   whether to call [`Next::run`].
//!
//! Both are adapted into a [`Layer`] (`Handler -> Handler`) at registration time,
//! and [`build_chain`] folds the layers around a terminal [`Handler`]. The first
//! layer registered is the outermost, so layers run in registration order.
//!
//! A wrap layer can't pass the context on itself. Its adapter parks the context
//! before calling the layer and takes it back out in the plain handler it hands the
//! layer as "inner". The parked context travels in a private [`Request`] extension
//! and in a task-local scoped to the layer's call, so it survives a layer that
//! forwards a brand new request. Mutations made before a wrap layer are therefore
//! still visible after it.
//!
//! ## Short-circuiting
//!
//! A middleware that returns without calling its inner handler ends the chain right
//! there; nothing downstream runs. This is how early responses (auth rejections,
//! cached hits) are produced.
//!
//! ```
//! use rttp_web::{
//!     Request, Response, StatusCode,
//!     context::Context,
//!     handler::Handler,
//!     middleware::{MiddlewareSpec, Next, compose},
//! };
//!
//! let require_token = MiddlewareSpec::contextual(|ctx: Context, req: Request, next: Next| async move {
//!     if req.headers().contains("authorization") {
//!         next.run(ctx, req).await
//!     } else {
//!         Response::new(StatusCode::Unauthorized)
//!     }
//! });
//! let handler = Handler::from_fn(|_ctx: Context, _req: Request| async {
//!     Response::new(StatusCode::Ok)
//! });
//! let chain = compose([require_token], handler).unwrap();
//! # let _ = chain;
//! ```

use std::{
    any::Any,
    fmt,
    future::Future,
    sync::{Arc, Mutex},
};

use tracing::{debug, warn};

use crate::{
    Request, Response,
    context::Context,
    handler::{AdaptError, BoxFuture, Handler, HandlerSpec, HttpHandler, adapt},
};

/// The context-aware middleware trait.
///
/// Implementations receive the request's [`Context`] and [`Request`] by value plus a
/// [`Next`] for the rest of the chain. They may:
///
/// - **Pass through**: `next.run(ctx, req).await`.
/// - **Prepare**: change `ctx` (URL params, env) or `req`, then pass through.
/// - **Short-circuit**: return a [`Response`] without calling `next`.
/// - **Decorate**: pass through, then modify the returned response.
///
/// Closures `Fn(Context, Request, Next) -> impl Future<Output = Response>` implement
/// this trait.
pub trait Middleware: Send + Sync {
    fn handle(&self, ctx: Context, req: Request, next: Next) -> BoxFuture<Response>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Context, Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, ctx: Context, req: Request, next: Next) -> BoxFuture<Response> {
        Box::pin((self)(ctx, req, next))
    }
}

/// The remainder of the chain after the current middleware.
///
/// Consumed by [`run`](Self::run), so the rest of the chain runs at most once per
/// invocation.
pub struct Next {
    inner: Handler,
}

impl Next {
    fn new(inner: Handler) -> Self {
        Self { inner }
    }

    /// Hand `ctx` and `req` to the next layer (or the terminal handler).
    pub async fn run(self, ctx: Context, req: Request) -> Response {
        self.inner.call(ctx, req).await
    }

    /// The rest of the chain as a handler.
    pub fn into_handler(self) -> Handler {
        self.inner
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next(..)")
    }
}

type WrapFn = dyn Fn(HttpHandler) -> HttpHandler + Send + Sync + 'static;

/// Every middleware shape the stack accepts.
pub enum MiddlewareSpec {
    /// Decorates a context-unaware handler.
    Wrap(Arc<WrapFn>),
    /// Receives the context before delegating.
    Contextual(Arc<dyn Middleware>),
    /// A type-erased spec, resolved by [`MiddlewareSpec::from_any`].
    Dynamic(Box<dyn Any + Send + Sync>),
}

impl MiddlewareSpec {
    /// A middleware that wraps a plain handler.
    ///
    /// `wrap` is called once for every chain the middleware is built into.
    pub fn wrap<F>(wrap: F) -> Self
    where
        F: Fn(HttpHandler) -> HttpHandler + Send + Sync + 'static,
    {
        Self::Wrap(Arc::new(wrap))
    }

    /// A context-aware middleware from an async closure.
    pub fn contextual<F, Fut>(f: F) -> Self
    where
        F: Fn(Context, Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self::Contextual(Arc::new(f))
    }

    /// A context-aware middleware from a [`Middleware`] implementation.
    pub fn from_middleware<M>(middleware: Arc<M>) -> Self
    where
        M: Middleware + 'static,
    {
        Self::Contextual(middleware)
    }

    /// Resolve a type-erased middleware.
    ///
    /// Accepts `Arc<dyn Fn(HttpHandler) -> HttpHandler + Send + Sync>`,
    /// `Arc<dyn Middleware>` and `MiddlewareSpec` itself.
    ///
    /// # Errors
    ///
    /// [`AdaptError::UnsupportedHandlerShape`] for any other type.
    pub fn from_any(value: Box<dyn Any + Send + Sync>) -> Result<Self, AdaptError> {
        let value = match value.downcast::<Arc<WrapFn>>() {
            Ok(wrap) => return Ok(Self::Wrap(*wrap)),
            Err(value) => value,
        };
        let value = match value.downcast::<Arc<dyn Middleware>>() {
            Ok(middleware) => return Ok(Self::Contextual(*middleware)),
            Err(value) => value,
        };
        match value.downcast::<MiddlewareSpec>() {
            Ok(spec) if !matches!(*spec, MiddlewareSpec::Dynamic(_)) => Ok(*spec),
            Ok(_) => Err(AdaptError::UnsupportedHandlerShape(
                "nested dynamic middleware spec".to_owned(),
            )),
            Err(value) => Err(AdaptError::UnsupportedHandlerShape(format!(
                "middleware of type {:?}",
                (*value).type_id()
            ))),
        }
    }
}

impl fmt::Debug for MiddlewareSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match self {
            Self::Wrap(_) => "Wrap",
            Self::Contextual(_) => "Contextual",
            Self::Dynamic(_) => "Dynamic",
        };
        write!(f, "MiddlewareSpec::{shape}(..)")
    }
}

/// An adapted middleware: turns the inner handler into the outer one.
#[derive(Clone)]
pub struct Layer {
    kind: &'static str,
    wrap: Arc<dyn Fn(Handler) -> Handler + Send + Sync + 'static>,
}

impl Layer {
    /// A layer straight from a canonical wrapping function.
    pub fn new<F>(wrap: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self::with_kind("custom", wrap)
    }

    fn with_kind<F>(kind: &'static str, wrap: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self {
            kind,
            wrap: Arc::new(wrap),
        }
    }

    /// Wrap `inner`, returning the composed handler.
    pub fn apply(&self, inner: Handler) -> Handler {
        (self.wrap)(inner)
    }

    /// `"wrap"`, `"contextual"` or `"custom"`, for diagnostics.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer").field("kind", &self.kind).finish()
    }
}

// The context while a wrap layer runs; only this module can name it. The slot is
// reachable both from the request extensions and from a task-local, so a layer
// that hands a freshly built request to its inner handler doesn't lose it.
type ParkedSlot = Arc<Mutex<Option<Context>>>;

struct Parked(ParkedSlot);

tokio::task_local! {
    static PARKED_CONTEXT: ParkedSlot;
}

fn take_parked(req: &mut Request) -> Option<Context> {
    let slot = match req.extensions_mut().remove::<Parked>() {
        Some(Parked(slot)) => slot,
        None => PARKED_CONTEXT.try_with(Arc::clone).ok()?,
    };
    let mut guard = slot.lock().ok()?;
    guard.take()
}

/// Normalize a middleware spec into a [`Layer`].
///
/// # Errors
///
/// [`AdaptError::UnsupportedHandlerShape`] when a [`MiddlewareSpec::Dynamic`] value
/// is none of the accepted types.
pub fn adapt_middleware(spec: impl Into<MiddlewareSpec>) -> Result<Layer, AdaptError> {
    let spec = match spec.into() {
        MiddlewareSpec::Dynamic(value) => MiddlewareSpec::from_any(value)?,
        spec => spec,
    };

    match spec {
        MiddlewareSpec::Wrap(wrap) => Ok(wrap_layer(wrap)),
        MiddlewareSpec::Contextual(middleware) => Ok(contextual_layer(middleware)),
        MiddlewareSpec::Dynamic(_) => Err(AdaptError::UnsupportedHandlerShape(
            "nested dynamic middleware spec".to_owned(),
        )),
    }
}

fn wrap_layer(wrap: Arc<WrapFn>) -> Layer {
    Layer::with_kind("wrap", move |inner: Handler| {
        let unpark = HttpHandler::from_boxed_fn(move |mut req: Request| {
            let ctx = take_parked(&mut req).unwrap_or_else(|| {
                warn!(
                    path = req.path(),
                    "request context missing after context-unaware middleware; continuing with an empty one"
                );
                Context::default()
            });
            inner.call(ctx, req)
        });

        let outer = wrap(unpark);

        Handler::from_boxed_fn(move |ctx: Context, mut req: Request| {
            let slot: ParkedSlot = Arc::new(Mutex::new(Some(ctx)));
            req.extensions_mut().insert(Parked(Arc::clone(&slot)));
            let fut = PARKED_CONTEXT.sync_scope(Arc::clone(&slot), || outer.call(req));
            let scoped: BoxFuture<Response> = Box::pin(PARKED_CONTEXT.scope(slot, fut));
            scoped
        })
    })
}

fn contextual_layer(middleware: Arc<dyn Middleware>) -> Layer {
    Layer::with_kind("contextual", move |inner: Handler| {
        let middleware = Arc::clone(&middleware);
        Handler::from_boxed_fn(move |ctx, req| middleware.handle(ctx, req, Next::new(inner.clone())))
    })
}

/// Compose `layers` around `terminal`.
///
/// `layers[0]` ends up outermost. Every call is an independent composition: wrap
/// layers get their wrapping function invoked again.
pub fn build_chain(layers: &[Layer], terminal: Handler) -> Handler {
    let chain = layers
        .iter()
        .rev()
        .fold(terminal, |inner, layer| layer.apply(inner));
    debug!(depth = layers.len(), "built middleware chain");
    chain
}

/// Adapt `middleware` and `terminal`, then compose them.
///
/// # Errors
///
/// The first [`AdaptError`] hit while adapting, before anything is composed.
pub fn compose<I>(middleware: I, terminal: impl Into<HandlerSpec>) -> Result<Handler, AdaptError>
where
    I: IntoIterator,
    I::Item: Into<MiddlewareSpec>,
{
    let layers = middleware
        .into_iter()
        .map(|spec| adapt_middleware(spec))
        .collect::<Result<Vec<_>, _>>()?;
    let terminal = adapt(terminal)?;
    Ok(build_chain(&layers, terminal))
}

/// An ordered, growable list of adapted middleware.
#[derive(Clone, Debug, Default)]
pub struct Stack {
    layers: Vec<Layer>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapt `spec` and append it as the innermost layer so far.
    ///
    /// # Errors
    ///
    /// [`AdaptError::UnsupportedHandlerShape`] for unusable specs; the stack is left
    /// unchanged.
    pub fn push(&mut self, spec: impl Into<MiddlewareSpec>) -> Result<(), AdaptError> {
        let layer = adapt_middleware(spec)?;
        debug!(kind = layer.kind(), position = self.layers.len(), "middleware added");
        self.layers.push(layer);
        Ok(())
    }

    pub fn push_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Compose the stack around `terminal`.
    pub fn build(&self, terminal: Handler) -> Handler {
        build_chain(&self.layers, terminal)
    }
}
