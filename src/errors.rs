use crate::StatusCode;
use std::{fmt, io, net::SocketAddr, path::PathBuf};
use thiserror::Error;

/// Everything that can end a single connection before a normal response is written.
#[derive(Debug, PartialEq, Error)]
pub(crate) enum ErrorKind {
    #[error("request line is not `METHOD SP PATH SP PROTOCOL/VERSION`")]
    InvalidRequestLine,
    #[error("unsupported request method")]
    InvalidMethod,
    #[error("malformed header line")]
    MalformedHeader,
    #[error("request head is not valid UTF-8")]
    InvalidEncoding,

    #[error("request head exceeds the configured limit")]
    HeaderTooLarge,
    #[error("declared body exceeds the configured limit")]
    BodyTooLarge,
    #[error("body ended after {available} of {expected} bytes")]
    ShortBody { expected: usize, available: usize },

    #[error("handler panicked")]
    HandlerPanicked,

    #[error("peer closed the connection before the request head was complete")]
    ConnectionClosed,
    #[error("i/o error: {0}")]
    Io(IoError),
}

macro_rules! http_errors {
    ($($name:ident: $status:ident => $json:literal; )*) => {
        pub(crate) const fn status(&self) -> StatusCode {
            match self { $(
                Self::$name { .. } => StatusCode::$status,
            )* }
        }

        pub(crate) const fn json(&self) -> &'static str {
            match self { $(
                Self::$name { .. } => $json,
            )* }
        }
    };
}

impl ErrorKind {
    http_errors! {
        InvalidRequestLine: BadRequest
            => r#"{"error":"Invalid request line","code":"INVALID_REQUEST_LINE"}"#;
        InvalidMethod: BadRequest
            => r#"{"error":"Invalid HTTP method","code":"INVALID_METHOD"}"#;
        MalformedHeader: BadRequest
            => r#"{"error":"Invalid header format","code":"MALFORMED_HEADER"}"#;
        InvalidEncoding: BadRequest
            => r#"{"error":"Request line or header name is not UTF-8","code":"INVALID_ENCODING"}"#;

        HeaderTooLarge: RequestHeaderFieldsTooLarge
            => r#"{"error":"Request head too large","code":"HEADER_TOO_LARGE"}"#;
        BodyTooLarge: PayloadTooLarge
            => r#"{"error":"Request body too large","code":"BODY_TOO_LARGE"}"#;
        ShortBody: BadRequest
            => r#"{"error":"Body shorter than Content-Length","code":"SHORT_BODY"}"#;

        HandlerPanicked: InternalServerError
            => r#"{"error":"Internal server error","code":"HANDLER_PANICKED"}"#;

        ConnectionClosed: BadRequest
            => r#"{"error":"Connection closed","code":"CONNECTION_CLOSED"}"#;
        Io: ServiceUnavailable
            => r#"{"error":"I/O error occurred","code":"IO_ERROR"}"#;
    }

    /// Transport failures close the socket without an answer.
    #[inline]
    pub(crate) const fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::ConnectionClosed)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        ErrorKind::Io(IoError(err))
    }
}

#[derive(Debug)]
pub(crate) struct IoError(pub(crate) io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Failures that prevent a [`Server`](crate::Server) from starting or changing its routes.
///
/// None of these leave a listener reachable by clients.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured bind address is not an IP address.
    #[error("invalid bind address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// Creating, binding or listening on the socket failed.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Certificate or key could not be loaded.
    #[error(transparent)]
    Tls(#[from] TlsConfigError),

    /// The reactor runtime or one of the server threads could not be created.
    #[error("failed to start server threads: {0}")]
    Runtime(#[source] io::Error),

    /// `start` or `register` was called while the server is running.
    #[error("server is already running")]
    AlreadyStarted,
}

/// Errors produced while building the TLS acceptor.
#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("a certificate path was given without a private key path")]
    MissingKey,

    #[error("a private key path was given without a certificate path")]
    MissingCertificate,

    #[error("failed to load PEM file {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyCertificateChain(PathBuf),

    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),
}
