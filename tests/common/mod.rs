#![allow(dead_code)]

use oneshot_http::{Method, Request, Response, Server, StatusCode};
use std::{
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    time::Duration,
};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_test_writer()
        .try_init();
}

pub const ROOT_BODY: &str = "<html><body><h1>HELLO WORLD from root!</h1></body></html>";
pub const ASDF_BODY: &str = "<html><body><h1>HELLO WORLD! from /api/asdf</h1></body></html>";
pub const POST_BODY: &str = r#"{"asdf":"asdf"}"#;

/// The three demo routes on an OS-assigned loopback port, not started.
pub fn demo_server() -> Server {
    let mut server = Server::new("127.0.0.1", 0);
    register_demo_routes(&mut server);
    server
}

pub fn register_demo_routes(server: &mut Server) {
    server
        .register(Method::Get, "/", |_: &Request, resp: &mut Response| {
            resp.status(StatusCode::Ok)
                .host("localhost")
                .content_type("text/html")
                .body(ROOT_BODY);
        })
        .unwrap();

    server
        .register(Method::Get, "/api/asdf", |_: &Request, resp: &mut Response| {
            resp.status(StatusCode::Ok)
                .host("localhost")
                .content_type("text/html")
                .body(ASDF_BODY);
        })
        .unwrap();

    server
        .register(Method::Post, "/api/post_test", |_: &Request, resp: &mut Response| {
            resp.status(StatusCode::Ok)
                .host("localhost")
                .content_type("application/json")
                .body(POST_BODY);
        })
        .unwrap();
}

/// Sends `request` and reads until the server closes the connection.
pub fn send(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(request).unwrap();

    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

pub fn expected(status: &str, host: &str, content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nServer: {host}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}
