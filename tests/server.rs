mod common;

use common::*;
use oneshot_http::{
    limits::{ConnLimits, ServerLimits},
    Method, Request, Response, Server, StatusCode,
};
use std::{
    io::{Read, Write},
    net::TcpStream,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn get_root() {
    init_test_logging();
    let mut server = demo_server();
    assert!(server.start());
    let addr = server.local_addr().unwrap();

    let resp = send(addr, b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(resp, expected("200 OK", "localhost", "text/html", ROOT_BODY));

    let resp = send(addr, b"GET /api/asdf HTTP/1.1\r\n\r\n");
    assert_eq!(resp, expected("200 OK", "localhost", "text/html", ASDF_BODY));
}

#[test]
fn post_with_body() {
    init_test_logging();
    let mut server = demo_server();
    assert!(server.start());

    let resp = send(
        server.local_addr().unwrap(),
        b"POST /api/post_test HTTP/1.1\r\nContent-Length: 2\r\n\r\n{}",
    );
    assert_eq!(
        resp,
        expected("200 OK", "localhost", "application/json", POST_BODY)
    );
}

#[test]
fn request_reaches_handler_intact() {
    init_test_logging();
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let store = seen.clone();

    let mut server = Server::new("127.0.0.1", 0);
    server
        .register(Method::Put, "/items/7?x=1", move |req: &Request, resp: &mut Response| {
            *store.lock() = Some((
                req.request_line(),
                req.header("X-Trace").map(str::to_owned),
                req.body().to_vec(),
                req.peer_addr().ip(),
            ));
            resp.status(StatusCode::NoContent);
        })
        .unwrap();
    assert!(server.start());

    let resp = send(
        server.local_addr().unwrap(),
        b"PUT /items/7?x=1 HTTP/1.0\r\nHost: api\r\nx-trace: abc\r\nContent-Length: 5\r\n\r\nhello",
    );
    assert_eq!(
        resp,
        "HTTP/1.0 204 No Content\r\nServer: api\r\nContent-Type: \r\nContent-Length: 0\r\n\r\n"
    );

    let (line, trace, body, ip) = seen.lock().take().unwrap();
    assert_eq!(line, "PUT /items/7?x=1 HTTP/1.0");
    assert_eq!(trace.as_deref(), Some("abc"));
    assert_eq!(body, b"hello");
    assert!(ip.is_loopback());
}

#[test]
fn unknown_route_is_404() {
    init_test_logging();
    let mut server = demo_server();
    assert!(server.start());
    let addr = server.local_addr().unwrap();

    for req in [
        &b"GET /nope HTTP/1.1\r\n\r\n"[..],
        b"POST / HTTP/1.1\r\n\r\n",
        b"GET /api/asdf/ HTTP/1.1\r\n\r\n",
    ] {
        assert_eq!(send(addr, req), expected("404 Not Found", "", "", ""));
    }
}

#[test]
fn malformed_request_is_400() {
    init_test_logging();
    let mut server = demo_server();
    assert!(server.start());
    let addr = server.local_addr().unwrap();

    let resp = send(addr, b"GARBAGE\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{resp:?}");
    assert!(resp.ends_with(r#""code":"INVALID_REQUEST_LINE"}"#));

    let resp = send(addr, b"BREW /pot HTTP/1.1\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(resp.ends_with(r#""code":"INVALID_METHOD"}"#));

    // The server keeps serving afterwards
    let resp = send(addr, b"GET / HTTP/1.1\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
}

#[test]
fn no_body_read_without_length() {
    init_test_logging();
    let mut server = demo_server();
    assert!(server.start());
    let addr = server.local_addr().unwrap();

    for head in [
        &b"POST /api/post_test HTTP/1.1\r\nContent-Length: 0\r\n\r\n"[..],
        b"POST /api/post_test HTTP/1.1\r\n\r\n",
    ] {
        // The write side stays open, so any body read would hang until timeout
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(1))).unwrap();
        stream.write_all(head).unwrap();

        let started = Instant::now();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(out.ends_with(POST_BODY));
    }
}

#[test]
fn handler_panic_is_500() {
    init_test_logging();
    let mut server = Server::new("127.0.0.1", 0);
    server
        .register(Method::Get, "/boom", |_: &Request, _: &mut Response| {
            panic!("boom");
        })
        .unwrap();
    assert!(server.start());
    let addr = server.local_addr().unwrap();

    let resp = send(addr, b"GET /boom HTTP/1.1\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));

    // Worker threads survive the panic
    let resp = send(addr, b"GET /boom HTTP/1.1\r\n\r\n");
    assert!(resp.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
}

#[test]
fn duplicate_route_first_wins() {
    init_test_logging();
    let mut server = Server::new("127.0.0.1", 0);
    for body in ["first", "second"] {
        server
            .register(Method::Get, "/dup", move |_: &Request, resp: &mut Response| {
                resp.status(StatusCode::Ok).body(body);
            })
            .unwrap();
    }
    assert!(server.start());

    let resp = send(server.local_addr().unwrap(), b"GET /dup HTTP/1.1\r\n\r\n");
    assert!(resp.ends_with("\r\n\r\nfirst"));
}

#[test]
fn hundred_concurrent_clients() {
    init_test_logging();
    let mut server = Server::new("127.0.0.1", 0);
    let hits = Arc::new(AtomicUsize::new(0));

    for i in 0..100 {
        let hits = hits.clone();
        server
            .register(Method::Get, &format!("/r{i}"), move |_: &Request, resp: &mut Response| {
                hits.fetch_add(1, Ordering::Relaxed);
                resp.status(StatusCode::Ok).body(format!("route {i}"));
            })
            .unwrap();
    }
    assert!(server.start());
    let addr = server.local_addr().unwrap();

    let clients: Vec<_> = (0..100)
        .map(|i| {
            thread::spawn(move || {
                let resp = send(addr, format!("GET /r{i} HTTP/1.1\r\n\r\n").as_bytes());
                assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"));
                assert!(resp.ends_with(&format!("\r\n\r\nroute {i}")), "{resp:?}");
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }
    assert_eq!(hits.load(Ordering::Relaxed), 100);
}

#[test]
fn reaper_forgets_closed_connections() {
    init_test_logging();
    let mut server = Server::builder()
        .port(0)
        .server_limits(ServerLimits {
            reaper_interval: Duration::from_millis(10),
            ..ServerLimits::default()
        })
        .build();
    assert!(server.start());
    let addr = server.local_addr().unwrap();

    let idle = TcpStream::connect(addr).unwrap();
    wait_until("the idle connection to register", || {
        server.live_connections() == 1
    });

    // Still reading its header, so the reaper must keep it
    thread::sleep(Duration::from_millis(50));
    assert_eq!(server.live_connections(), 1);

    drop(idle);
    wait_until("the registry to drain", || server.live_connections() == 0);
}

#[test]
fn stop_aborts_in_flight() {
    init_test_logging();
    let mut server = Server::builder()
        .port(0)
        .connection_limits(ConnLimits {
            socket_read_timeout: Duration::from_secs(30),
            ..ConnLimits::default()
        })
        .build();
    register_demo_routes(&mut server);
    assert!(server.start());
    let addr = server.local_addr().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\n").unwrap();
    wait_until("the connection to register", || server.live_connections() == 1);

    let started = Instant::now();
    server.stop();
    assert!(!server.is_running());
    assert_eq!(server.live_connections(), 0);

    // Closed without a response, long before the read timeout
    let mut out = Vec::new();
    let read = stream.read_to_end(&mut out);
    assert!(read.is_ok() || read.is_err_and(|e| e.kind() == std::io::ErrorKind::ConnectionReset));
    assert!(out.is_empty());
    assert!(started.elapsed() < Duration::from_secs(5));
}
