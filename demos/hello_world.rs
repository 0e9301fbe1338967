//! Routed hello-world server.
//!
//! ```text
//! RUST_LOG=debug cargo run --example hello_world
//! curl localhost:8080/hello/carl
//! curl localhost:8080/ip/10.0.0.1
//! curl -X POST localhost:8080/hello/carl     # 405 with Allow: GET, HEAD
//! curl -H 'Authorization: x' localhost:8080/admin/stats
//! ```
//!
//! Pass a JSON config file as the first argument to override the listener settings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use regex::Regex;
use rttp_web::{
    Context, EnvKey, Handler, HttpHandler, Request, Response, Router, Server, ServerConfig,
    StatusCode,
    middleware::{MiddlewareSpec, Next},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(PartialEq, Eq, Hash)]
struct RequestId;

impl EnvKey for RequestId {
    type Value = u64;
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ServerConfig::default(),
    };

    let mut router = Router::new();

    // Context-unaware timing layer.
    router.use_middleware(MiddlewareSpec::wrap(|inner: HttpHandler| {
        HttpHandler::from_fn(move |req: Request| {
            let inner = inner.clone();
            async move {
                let started = Instant::now();
                let method = req.method().clone();
                let path = req.path().to_owned();
                let res = inner.call(req).await;
                info!(%method, path, status = %res.status(), elapsed = ?started.elapsed(), "served");
                res
            }
        })
    }))?;

    // Context-aware layer tagging each request.
    router.use_middleware(MiddlewareSpec::contextual(
        |mut ctx: Context, req: Request, next: Next| async move {
            let id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
            ctx.env_mut().insert(RequestId, id);
            let mut res = next.run(ctx, req).await;
            res.add_header("X-Request-Id", id.to_string());
            res
        },
    ))?;

    router.get(
        "/hello/:name",
        Handler::from_fn(|ctx: Context, _req: Request| async move {
            let name = ctx.param("name").unwrap_or("world").to_owned();
            Response::new(StatusCode::Ok).body(format!("Hello, {name}!\n"))
        }),
    )?;

    router.get(
        Regex::new(r"^/ip/(?P<ip>(?:\d{1,3}\.){3}\d{1,3})$")?,
        Handler::from_fn(|ctx: Context, _req: Request| async move {
            let ip = ctx.param("ip").unwrap_or_default().to_owned();
            Response::new(StatusCode::Ok).body(format!("looking up {ip}\n"))
        }),
    )?;

    router.get(
        "/admin/*",
        Handler::from_fn(|ctx: Context, req: Request| async move {
            if !req.headers().contains("authorization") {
                return Response::new(StatusCode::Unauthorized);
            }
            let rest = ctx.param("*").unwrap_or("/").to_owned();
            let id = ctx.env().get(&RequestId).copied().unwrap_or_default();
            Response::new(StatusCode::Ok).body(format!("admin {rest} (request {id})\n"))
        }),
    )?;

    let server = Server::with_config(config).await?;
    println!("Listening on http://{}", server.local_addr());
    server.serve(router.build()).await?;
    Ok(())
}
