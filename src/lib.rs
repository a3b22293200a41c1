//! oneshot_http - Minimal async HTTP/1.x server engine
//!
//! Every accepted connection carries exactly one request: the head is read up
//! to `CRLF CRLF`, a body of the declared `Content-Length` follows, the handler
//! registered for the method and exact path fills in the response, the
//! response is written and the connection is closed.
//!
//! # Protocol Support
//!
//! - **HTTP/1.0 and HTTP/1.1** request lines, echoed back in the status line
//! - **Exact-match routing** on `GET`, `POST`, `PUT` and `DELETE`
//! - **Optional TLS** through rustls, from PEM certificate and key files
//!
//! Not supported: keep-alive, pipelining, chunked bodies, compression and
//! path parameters.
//!
//! # Threads
//!
//! - **Reactor** - a dedicated thread owning a multi-threaded tokio runtime
//!   ([`worker_threads`](limits::ServerLimits::worker_threads) workers) that
//!   runs the accept loop and one task per connection
//! - **Reaper** - wakes every [`reaper_interval`](limits::ServerLimits::reaper_interval)
//!   and forgets connections that have closed
//!
//! Handlers run synchronously on the reactor's workers and should not block.
//!
//! # Examples
//!
//! Quick start:
//! ```no_run
//! use oneshot_http::{Method, Request, Response, Server, StatusCode};
//!
//! let mut server = Server::new("127.0.0.1", 8080);
//!
//! server
//!     .register(Method::Get, "/", |_: &Request, resp: &mut Response| {
//!         resp.status(StatusCode::Ok)
//!             .content_type("text/plain")
//!             .body("Hello World!");
//!     })
//!     .unwrap();
//!
//! server
//!     .register(Method::Post, "/api/echo", |req: &Request, resp: &mut Response| {
//!         resp.status(StatusCode::Ok)
//!             .content_type("application/octet-stream")
//!             .body(req.body());
//!     })
//!     .unwrap();
//!
//! assert!(server.start());
//! std::thread::park();
//! ```
//! Advanced configuration:
//! ```no_run
//! use oneshot_http::{Server, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use std::time::Duration;
//!
//! let mut server = Server::builder()
//!     .address("0.0.0.0")
//!     .port(8443)
//!     .tls("certs/cert.pem", "certs/key.pem")
//!     .server_limits(ServerLimits {
//!         worker_threads: 4,
//!         ..ServerLimits::default()
//!     })
//!     .connection_limits(ConnLimits {
//!         socket_read_timeout: Duration::from_secs(5),
//!         ..ConnLimits::default()
//!     })
//!     .request_limits(ReqLimits {
//!         body_size: 16 * 1024,  // 16KB for larger payloads
//!         ..ReqLimits::default()
//!     })
//!     .build();
//!
//! if let Err(err) = server.try_start() {
//!     eprintln!("cannot start: {err}");
//! }
//! ```
//!
//! # Logging
//!
//! Events are emitted through [`tracing`]; install any subscriber to see them.

pub(crate) mod http {
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod connection;
    pub(crate) mod router;
    pub(crate) mod server_impl;
    pub(crate) mod tls;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    errors::{ServerError, TlsConfigError},
    http::{
        request::Request,
        response::Response,
        types::{HeaderMap, Method, StatusCode},
    },
    server::{
        router::Handler,
        server_impl::{Server, ServerBuilder},
    },
};

#[doc(hidden)]
pub fn run_test<F: FnOnce(&Request, &mut Response)>(f: F) {
    let request = Request::blank();
    let mut response = Response::for_request(&request);
    f(&request, &mut response);
}
