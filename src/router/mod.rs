//! Request routing: map URL patterns and HTTP methods to middleware-wrapped handlers.
//!
//! Routes are registered on a [`Router`], which compiles each pattern and adapts each
//! handler as soon as it is registered, so a bad route fails at startup rather than on
//! the first request. [`Router::build`] then composes the middleware stack around every
//! route and freezes the result into a [`Mux`], which is what serves requests.
//!
//! | Pattern                 | Example match              | Bound params                       |
//! |-------------------------|----------------------------|------------------------------------|
//! | `/users`                | `/users`                   | *(none)*                           |
//! | `/users/:id`            | `/users/42`                | `id → "42"`                        |
//! | `/files/*`              | `/files/docs/readme.txt`   | `* → "/docs/readme.txt"`           |
//! | `^/ip/(?P<ip>[0-9.]+)$` | `/ip/10.0.0.1`             | `ip → "10.0.0.1"`                  |
//!
//! Paths are compared exactly: `/users/` and `/users` are different routes.
//!
//! Routes are tried in registration order and the first route whose method and pattern
//! both match wins. When nothing matches, the not-found handler runs. If some route
//! matched the path but not the method, [`allowed_methods`] reports which methods
//! would have been accepted, and the default not-found handler answers
//! `405 Method Not Allowed` with an `Allow` header instead of `404 Not Found`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    Method, Request, Response, StatusCode,
    context::{Context, EnvKey},
    handler::{AdaptError, Handler, HandlerSpec, adapt},
    middleware::{MiddlewareSpec, Stack},
    pattern::{CompileError, Pattern, PatternSpec, compile},
};

/// Errors raised while registering routes or middleware.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    Pattern(#[from] CompileError),

    #[error(transparent)]
    Handler(#[from] AdaptError),
}

#[derive(PartialEq, Eq, Hash)]
struct AllowedMethods;

impl EnvKey for AllowedMethods {
    type Value = Vec<Method>;
}

/// Methods accepted by the routes whose pattern matched a request that no route
/// served.
///
/// Only set in the context handed to the not-found handler.
pub fn allowed_methods(ctx: &Context) -> Option<&[Method]> {
    ctx.env().get(&AllowedMethods).map(Vec::as_slice)
}

// A registered route before middleware composition.
#[derive(Debug)]
struct Route {
    // Empty means any method.
    methods: Vec<Method>,
    pattern: Arc<dyn Pattern>,
    handler: Handler,
}

/// Collects routes and middleware, then [`build`](Self::build)s a [`Mux`].
///
/// # Examples
///
/// ```
/// use rttp_web::{Context, Handler, Request, Response, Router, StatusCode};
///
/// let mut router = Router::new();
/// router
///     .get("/users/:id", Handler::from_fn(|ctx: Context, _req: Request| async move {
///         let id = ctx.param("id").unwrap_or_default().to_owned();
///         Response::new(StatusCode::Ok).body(id)
///     }))
///     .unwrap();
///
/// assert!(router.get("/users/:", Handler::from_fn(|_ctx: Context, _req: Request| async {
///     Response::new(StatusCode::Ok)
/// })).is_err());
///
/// let mux = router.build();
/// assert_eq!(mux.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Router {
    stack: Stack,
    routes: Vec<Route>,
    not_found: Option<Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware to the stack every route is wrapped in.
    ///
    /// Middleware applies to all routes, including ones registered before it, and to
    /// the not-found handler. The first middleware added is the outermost.
    ///
    /// # Errors
    ///
    /// [`RouteError::Handler`] if the middleware has an unsupported shape.
    pub fn use_middleware(&mut self, spec: impl Into<MiddlewareSpec>) -> Result<(), RouteError> {
        self.stack.push(spec)?;
        Ok(())
    }

    /// Register `handler` for requests whose method is in `methods` and whose path
    /// matches `pattern`. An empty `methods` accepts any method.
    ///
    /// # Errors
    ///
    /// [`RouteError::Pattern`] if the pattern does not compile, [`RouteError::Handler`]
    /// if the handler has an unsupported shape. Nothing is registered on error.
    pub fn handle<M>(
        &mut self,
        methods: M,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError>
    where
        M: IntoIterator<Item = Method>,
    {
        let pattern = compile(pattern)?;
        let handler = adapt(handler)?;
        let methods: Vec<Method> = methods.into_iter().collect();

        debug!(?methods, ?pattern, "route registered");
        self.routes.push(Route {
            methods,
            pattern,
            handler,
        });
        Ok(())
    }

    /// Register a `GET` route. It also serves `HEAD`.
    pub fn get(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError> {
        self.handle([Method::Get, Method::Head], pattern, handler)
    }

    pub fn post(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError> {
        self.handle([Method::Post], pattern, handler)
    }

    pub fn put(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError> {
        self.handle([Method::Put], pattern, handler)
    }

    pub fn delete(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError> {
        self.handle([Method::Delete], pattern, handler)
    }

    pub fn patch(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError> {
        self.handle([Method::Patch], pattern, handler)
    }

    pub fn options(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError> {
        self.handle([Method::Options], pattern, handler)
    }

    pub fn head(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError> {
        self.handle([Method::Head], pattern, handler)
    }

    /// Register a route that accepts every method.
    pub fn any(
        &mut self,
        pattern: impl Into<PatternSpec>,
        handler: impl Into<HandlerSpec>,
    ) -> Result<(), RouteError> {
        self.handle(Vec::new(), pattern, handler)
    }

    /// Replace the handler run when no route matches.
    ///
    /// # Errors
    ///
    /// [`RouteError::Handler`] if the handler has an unsupported shape.
    pub fn not_found(&mut self, handler: impl Into<HandlerSpec>) -> Result<(), RouteError> {
        self.not_found = Some(adapt(handler)?);
        Ok(())
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Compose the middleware stack around every route and the not-found handler.
    pub fn build(self) -> Mux {
        let routes = self
            .routes
            .into_iter()
            .map(|route| CompiledRoute {
                chain: self.stack.build(route.handler),
                methods: route.methods,
                pattern: route.pattern,
            })
            .collect::<Vec<_>>();

        let not_found = self
            .stack
            .build(self.not_found.unwrap_or_else(default_not_found));

        debug!(
            routes = routes.len(),
            middleware = self.stack.len(),
            "router built"
        );
        Mux { routes, not_found }
    }
}

fn default_not_found() -> Handler {
    Handler::from_fn(|ctx: Context, _req: Request| async move {
        match allowed_methods(&ctx) {
            Some(methods) => {
                let allow = methods
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                Response::new(StatusCode::MethodNotAllowed).header("Allow", allow)
            }
            None => Response::new(StatusCode::NotFound),
        }
    })
}

#[derive(Debug)]
struct CompiledRoute {
    methods: Vec<Method>,
    pattern: Arc<dyn Pattern>,
    chain: Handler,
}

impl CompiledRoute {
    fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

/// A frozen router. Cheap to share: wrap it in an `Arc` and route from any task.
#[derive(Debug)]
pub struct Mux {
    routes: Vec<CompiledRoute>,
    not_found: Handler,
}

impl Mux {
    /// Dispatch `request` to the first route matching its method and path.
    ///
    /// The route's chain runs with a fresh [`Context`] holding the URL parameters the
    /// pattern bound. Otherwise the not-found chain runs.
    pub async fn route(&self, request: Request) -> Response {
        let mut allowed: Vec<Method> = Vec::new();

        for route in &self.routes {
            let path = request.path();
            if !path.starts_with(route.pattern.prefix()) {
                continue;
            }
            let Some(params) = route.pattern.matches(path) else {
                continue;
            };

            let method = request.method();
            if route.allows(method) {
                trace!(%method, path, pattern = ?route.pattern, "route matched");
                return route.chain.call(Context::with_params(params), request).await;
            }

            for method in &route.methods {
                if !allowed.contains(method) {
                    allowed.push(method.clone());
                }
            }
        }

        let mut ctx = Context::new();
        if !allowed.is_empty() {
            trace!(path = request.path(), ?allowed, "path matched with another method");
            ctx.env_mut().insert(AllowedMethods, allowed);
        }
        self.not_found.call(ctx, request).await
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
