//! Async TCP server using Tokio.
//!
//! Accepts TCP connections and dispatches HTTP/1.1 requests either to a plain handler
//! function ([`Server::run`]) or to a routed [`Mux`] ([`Server::serve`]). Supports
//! HTTP/1.1 persistent connections (keep-alive) out of the box.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    Method, StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::router::Mux;

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced while loading a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid server config: {0}")]
    Invalid(&'static str),
}

/// Listener and connection settings.
///
/// Every field has a default, so `{}` is a valid configuration.
///
/// ```
/// use rttp_web::server::ServerConfig;
///
/// let config = ServerConfig::from_json(r#"{ "addr": "0.0.0.0:3000" }"#).unwrap();
/// assert_eq!(config.addr, "0.0.0.0:3000");
/// assert_eq!(config.max_request_size, 8 * 1024 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind, e.g. `127.0.0.1:8080`.
    pub addr: String,
    /// Largest request (head plus body) buffered before answering 413.
    pub max_request_size: usize,
    /// Initial read buffer capacity per connection.
    pub initial_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_owned(),
            max_request_size: 8 * 1024 * 1024,
            initial_buffer_size: 4096,
        }
    }
}

impl ServerConfig {
    /// Parse a JSON document, filling missing fields with defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Json`] for malformed JSON or unknown fields,
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_request_size == 0 {
            return Err(ConfigError::Invalid("max_request_size must be positive"));
        }
        if self.initial_buffer_size == 0 {
            return Err(ConfigError::Invalid("initial_buffer_size must be positive"));
        }
        Ok(())
    }
}

// Per-connection limits copied out of the config.
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_request_size: usize,
    initial_buffer_size: usize,
}

/// The HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use rttp_web::{Context, Handler, Request, Response, Router, Server, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut router = Router::new();
///     router.get("/", Handler::from_fn(|_ctx: Context, _req: Request| async {
///         Response::new(StatusCode::Ok).body("Hello!")
///     }))?;
///
///     Server::bind("127.0.0.1:8080").await?.serve(router.build()).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    limits: Limits,
}

impl Server {
    /// Binds the server to the given TCP address with default limits.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        Self::with_config(ServerConfig {
            addr: addr.as_ref().to_owned(),
            ..ServerConfig::default()
        })
        .await
    }

    /// Binds the server as described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if `config.addr` cannot be bound.
    pub async fn with_config(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: config.addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            limits: Limits {
                max_request_size: config.max_request_size,
                initial_buffer_size: config.initial_buffer_size,
            },
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves every request through `mux` until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn serve(self, mux: Mux) -> Result<(), ServerError> {
        let mux = Arc::new(mux);
        self.run(move |req| {
            let mux = Arc::clone(&mux);
            async move { mux.route(req).await }
        })
        .await
    }

    /// Starts accepting connections and dispatching requests to `handler`.
    ///
    /// The handler is wrapped in an [`Arc`] and shared across all spawned Tokio
    /// tasks, so it must be `Send + Sync + 'static`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "rttp-web listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let handler = Arc::clone(&handler);
            let limits = self.limits;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, limits).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, reading one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`.
async fn handle_connection<H, F>(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<H>,
    limits: Limits,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(limits.initial_buffer_size);

    loop {
        let bytes_read = stream.read_buf(&mut buf).await?;

        if bytes_read == 0 {
            debug!(peer = %peer_addr, "connection closed by peer");
            break;
        }

        if buf.len() > limits.max_request_size {
            warn!(peer = %peer_addr, limit = limits.max_request_size, "request too large, sending 413");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            stream.write_all(&response.into_bytes()).await?;
            break;
        }

        // A single read may carry several pipelined requests.
        while !buf.is_empty() {
            let (mut request, body_offset) = match Request::parse(&buf) {
                Ok(pair) => pair,
                Err(RequestError::Incomplete) => break,
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                    let response = Response::new(StatusCode::BadRequest)
                        .body(format!("Bad Request: {e}"))
                        .keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    return Ok(());
                }
            };

            let content_length = request.content_length().unwrap_or(0);
            let total_needed = match body_offset.checked_add(content_length) {
                Some(total) if total <= limits.max_request_size => total,
                _ => {
                    warn!(peer = %peer_addr, content_length, "declared body too large, sending 413");
                    let response = Response::new(StatusCode::PayloadTooLarge)
                        .body("Request entity too large")
                        .keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    return Ok(());
                }
            };
            if buf.len() < total_needed {
                break;
            }

            let frame = buf.split_to(total_needed).freeze();
            request = request.with_body(frame.slice(body_offset..));
            let keep_alive = request.is_keep_alive();
            let head = *request.method() == Method::Head;

            debug!(
                peer = %peer_addr,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            let mut response = handler(request).await;
            if !keep_alive {
                response = response.keep_alive(false);
            }
            let keep_alive = response.is_keep_alive();
            let wire = if head {
                response.into_head_bytes()
            } else {
                response.into_bytes()
            };
            stream.write_all(&wire).await?;
            stream.flush().await?;

            if !keep_alive {
                debug!(peer = %peer_addr, "Connection: close, shutting down");
                return Ok(());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::Context, handler::Handler, router::Router};

    #[test]
    fn config_defaults_from_empty_object() {
        let config = ServerConfig::from_json("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.addr, "127.0.0.1:8080");
        assert_eq!(config.initial_buffer_size, 4096);
    }

    #[test]
    fn config_overrides_fields() {
        let config = ServerConfig::from_json(
            r#"{ "addr": "0.0.0.0:9000", "max_request_size": 1024, "initial_buffer_size": 512 }"#,
        )
        .unwrap();
        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.max_request_size, 1024);
        assert_eq!(config.initial_buffer_size, 512);
    }

    #[test]
    fn config_rejects_unknown_fields_and_bad_values() {
        assert!(matches!(
            ServerConfig::from_json(r#"{ "port": 80 }"#),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            ServerConfig::from_json(r#"{ "max_request_size": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(ServerConfig::from_json("not json"), Err(ConfigError::Json(_))));
    }

    #[tokio::test]
    async fn bind_reports_bad_address() {
        let err = Server::bind("definitely not an address").await.err().unwrap();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    async fn spawn_mux(config: ServerConfig) -> SocketAddr {
        let mut router = Router::new();
        router
            .get(
                "/hello/:name",
                Handler::from_fn(|ctx: Context, _req: Request| async move {
                    Response::new(StatusCode::Ok)
                        .body(format!("hello {}", ctx.param("name").unwrap_or("")))
                }),
            )
            .unwrap();
        router
            .post(
                "/echo",
                Handler::from_fn(|_ctx: Context, req: Request| async move {
                    Response::new(StatusCode::Ok).body_bytes(req.body().to_vec())
                }),
            )
            .unwrap();

        let server = Server::with_config(config).await.unwrap();
        let addr = server.local_addr();
        tokio::spawn(server.serve(router.build()));
        addr
    }

    fn local_config() -> ServerConfig {
        ServerConfig {
            addr: "127.0.0.1:0".to_owned(),
            ..ServerConfig::default()
        }
    }

    async fn exchange(addr: SocketAddr, raw: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn serves_routed_requests() {
        let addr = spawn_mux(local_config()).await;
        let reply = exchange(
            addr,
            "GET /hello/carl HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
        assert!(reply.ends_with("hello carl"), "{reply}");
    }

    #[tokio::test]
    async fn reads_request_body() {
        let addr = spawn_mux(local_config()).await;
        let reply = exchange(
            addr,
            "POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nping!",
        )
        .await;
        assert!(reply.ends_with("ping!"), "{reply}");
    }

    #[tokio::test]
    async fn answers_405_and_404() {
        let addr = spawn_mux(local_config()).await;
        let reply = exchange(addr, "DELETE /echo HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{reply}");
        assert!(reply.contains("Allow: POST\r\n"), "{reply}");

        let reply = exchange(addr, "GET /nope HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 404 Not Found\r\n"), "{reply}");
    }

    #[tokio::test]
    async fn pipelined_requests_are_all_answered() {
        let addr = spawn_mux(local_config()).await;
        let reply = exchange(
            addr,
            "GET /hello/a HTTP/1.1\r\n\r\nGET /hello/b HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert_eq!(reply.matches("HTTP/1.1 200 OK").count(), 2, "{reply}");
        assert!(reply.contains("hello a"));
        assert!(reply.ends_with("hello b"));
    }

    #[tokio::test]
    async fn oversized_body_gets_413() {
        let addr = spawn_mux(ServerConfig {
            max_request_size: 64,
            ..local_config()
        })
        .await;
        let reply = exchange(
            addr,
            "POST /echo HTTP/1.1\r\nContent-Length: 1000\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{reply}");
    }

    #[tokio::test]
    async fn head_response_has_length_but_no_body() {
        let addr = spawn_mux(local_config()).await;
        let reply = exchange(
            addr,
            "HEAD /hello/carl HTTP/1.1\r\n\r\nGET /hello/ada HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await;
        let (head, rest) = reply.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
        assert!(head.contains("Content-Length: 10"), "{reply}");
        assert!(rest.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
        assert!(rest.ends_with("hello ada"), "{reply}");
        assert!(!reply.contains("hello carl"), "{reply}");
    }

    #[tokio::test]
    async fn huge_content_length_gets_413() {
        let addr = spawn_mux(local_config()).await;
        let reply = exchange(
            addr,
            &format!("POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n", usize::MAX),
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 413 Payload Too Large\r\n"), "{reply}");
    }

    #[tokio::test]
    async fn malformed_request_gets_400() {
        let addr = spawn_mux(local_config()).await;
        let reply = exchange(addr, "NOT A REQUEST\r\n\r\n").await;
        assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{reply}");
    }
}
