//! Outbound responses.
//!
//! A [`Response`] is both the value a handler returns and the sink middleware
//! write into: the builder methods suit handlers constructing one from scratch,
//! the `&mut self` methods suit layers decorating what came back from downstream.

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// An HTTP/1.1 response.
///
/// ```
/// use rttp_web::http::{Response, StatusCode};
///
/// let mut response = Response::new(StatusCode::Ok).body("Hello");
/// response.write(", world");
/// response.add_header("X-Served-By", "rttp");
///
/// assert_eq!(response.payload(), b"Hello, world");
/// let wire = response.into_bytes();
/// assert!(wire.starts_with(b"HTTP/1.1 200 OK\r\n"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    keep_alive: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    /// Append a header (builder style).
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the body with `body` (builder style).
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Overwrite the status code.
    pub fn write_header(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Append bytes to the body.
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) {
        self.body.extend_from_slice(chunk.as_ref());
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The body written so far.
    pub fn payload(&self) -> &[u8] {
        &self.body
    }

    pub fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Serialize to HTTP/1.1 wire format.
    ///
    /// Adds `Content-Type: text/plain; charset=utf-8` for a non-empty body without a
    /// content type, and sets `Connection` and `Content-Length`, replacing any values
    /// a handler added for them.
    pub fn into_bytes(self) -> BytesMut {
        self.encode(true)
    }

    /// Serialize as the answer to a `HEAD` request: the same head, no body.
    pub fn into_head_bytes(self) -> BytesMut {
        self.encode(false)
    }

    fn encode(mut self, with_body: bool) -> BytesMut {
        let content_length = self.body.len();

        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        self.headers.set("Connection", connection);
        self.headers.set("Content-Length", content_length.to_string());

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64 + content_length);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        buf.put(&b"\r\n"[..]);
        if with_body {
            buf.put(self.body.as_slice());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}
