//! # rttp-web
//!
//! Pattern routing and composable middleware on top of a from-scratch async
//! HTTP/1.1 server.
//!
//! - [`pattern`] compiles route patterns (`/users/:id`, `/static/*`, regular
//!   expressions, or your own [`Pattern`]) into matchers that bind URL variables.
//! - [`handler`] normalizes the handler shapes a route accepts into one canonical,
//!   context-aware [`Handler`].
//! - [`middleware`] adapts middleware, context-aware or not, and composes it into a
//!   chain around a handler.
//! - [`router`] ties the three together: a [`Router`] collects routes and middleware
//!   and builds a [`Mux`] that dispatches requests.
//! - [`server`] accepts connections and feeds requests to a [`Mux`] or a plain
//!   handler function.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rttp_web::{Context, Handler, Request, Response, Router, Server, StatusCode};
//! use rttp_web::middleware::{MiddlewareSpec, Next};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.use_middleware(MiddlewareSpec::contextual(
//!         |ctx: Context, req: Request, next: Next| async move {
//!             tracing::info!(path = req.path(), "request");
//!             next.run(ctx, req).await
//!         },
//!     ))?;
//!     router.get("/hello/:name", Handler::from_fn(|ctx: Context, _req: Request| async move {
//!         let name = ctx.param("name").unwrap_or("world").to_owned();
//!         Response::new(StatusCode::Ok).body(format!("Hello, {name}!"))
//!     }))?;
//!
//!     Server::bind("127.0.0.1:8080").await?.serve(router.build()).await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod handler;
pub mod http;
pub mod middleware;
pub mod pattern;
pub mod router;
pub mod server;

pub use context::{Context, Env, EnvKey, UrlParams};
pub use handler::{AdaptError, BoxFuture, Handler, HttpHandler, ServeHttp, ServeHttpC, adapt};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{Layer, Middleware, MiddlewareSpec, Next, adapt_middleware, build_chain};
pub use pattern::{CompileError, Pattern, PatternSpec, compile};
pub use router::{Mux, RouteError, Router};
pub use server::{ConfigError, Server, ServerConfig, ServerError};
