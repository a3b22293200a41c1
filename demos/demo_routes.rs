//! Serves the three demo routes until Enter is pressed.
//!
//! ```text
//! cargo run --example demo_routes -- 127.0.0.1 8080
//! cargo run --example demo_routes -- 127.0.0.1 8443 cert.pem key.pem
//! ```
//! Set `RUST_LOG=oneshot_http=debug` to see every request.

use oneshot_http::{Method, Request, Response, Server, StatusCode};
use std::{env, io, process::ExitCode, thread};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oneshot_http=info,demo_routes=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let address = args.first().map(String::as_str).unwrap_or("127.0.0.1");
    let port = match args.get(1).map(|p| p.parse::<u16>()) {
        Some(Ok(port)) => port,
        Some(Err(err)) => {
            error!(%err, "invalid port");
            return ExitCode::FAILURE;
        }
        None => 80,
    };

    let mut builder = Server::builder().address(address).port(port);
    if let (Some(cert), Some(key)) = (args.get(2), args.get(3)) {
        builder = builder.tls(cert, key);
    }
    let mut server = builder.build();

    if let Err(err) = register_routes(&mut server) {
        error!(%err, "failed to register routes");
        return ExitCode::FAILURE;
    }

    info!("starting web server now");
    if !server.start() {
        return ExitCode::FAILURE;
    }

    // Any line on stdin, or its end, stops the server
    let waiter = thread::spawn(|| {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
    });
    let _ = waiter.join();

    server.stop();
    ExitCode::SUCCESS
}

fn register_routes(server: &mut Server) -> Result<(), oneshot_http::ServerError> {
    server.register(Method::Get, "/", |_: &Request, resp: &mut Response| {
        resp.status(StatusCode::Ok)
            .host("localhost")
            .content_type("text/html")
            .body("<html><body><h1>HELLO WORLD from root!</h1></body></html>");
    })?;

    server.register(Method::Get, "/api/asdf", |req: &Request, resp: &mut Response| {
        info!(url = req.url(), "from /api/asdf");

        resp.status(StatusCode::Ok)
            .host("localhost")
            .content_type("text/html")
            .body("<html><body><h1>HELLO WORLD! from /api/asdf</h1></body></html>");
    })?;

    server.register(Method::Post, "/api/post_test", |req: &Request, resp: &mut Response| {
        info!(body = req.body_str().unwrap_or("<binary>"), "from /api/post_test");

        resp.status(StatusCode::Ok)
            .host("localhost")
            .content_type("application/json")
            .body(r#"{"asdf":"asdf"}"#);
    })?;

    Ok(())
}
