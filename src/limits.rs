//! Server configuration limits and timeouts
//!
//! # Security-First Defaults
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion attacks
//! - Slowloris attacks
//! - Oversized request heads and bodies
//!
//! # Examples
//!
//! ```no_run
//! use oneshot_http::{Server, limits::{ConnLimits, ReqLimits, ServerLimits}};
//! use std::time::Duration;
//!
//! let mut server = Server::builder()
//!     .address("127.0.0.1")
//!     .port(8080)
//!     .server_limits(ServerLimits {
//!         worker_threads: 4,
//!         ..ServerLimits::default()
//!     })
//!     .connection_limits(ConnLimits {
//!         socket_read_timeout: Duration::from_secs(5),
//!         ..ConnLimits::default()
//!     })
//!     .request_limits(ReqLimits {
//!         body_size: 64 * 1024,
//!         ..ReqLimits::default()
//!     })
//!     .build();
//!
//! assert!(server.start());
//! server.stop();
//! ```

use std::time::Duration;

/// Controls the reactor, the reaper and the shape of error responses.
///
/// # Threads
/// ```text
/// [ reactor thread ] -- tokio runtime, `worker_threads` workers
///        |                 accept loop + one task per connection
///        v
/// [   registry     ] <-- append on accept, sweep every `reaper_interval`
///        ^
///        |
/// [ reaper thread  ]
/// ```
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of runtime worker threads driving socket I/O (default: `2`).
    ///
    /// Handlers execute on these threads. A handler that blocks stalls every
    /// connection scheduled on the same worker.
    pub worker_threads: usize,

    /// How often the reaper removes closed connections from the registry (default: `20ms`).
    pub reaper_interval: Duration,

    /// How long `stop()` waits for the runtime to wind down after aborting
    /// in-flight connections (default: `1s`).
    pub shutdown_timeout: Duration,

    /// Format for error responses (default: `true`)
    ///
    /// # Examples
    /// If `true`, then on error the server will return:
    /// ```text
    /// HTTP/1.1 400 Bad Request\r
    /// Server: \r
    /// Content-Type: application/json\r
    /// Content-Length: 55\r
    /// \r
    /// {"error":"Invalid HTTP method","code":"INVALID_METHOD"}
    /// ```
    /// If `false`, then on error the server will return:
    /// ```text
    /// HTTP/1.1 400 Bad Request\r
    /// Server: \r
    /// Content-Type: \r
    /// Content-Length: 0\r
    /// \r
    /// ```
    pub json_errors: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            reaper_interval: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(1),
            json_errors: true,

            _priv: (),
        }
    }
}

/// Per-connection timeouts
///
/// Every connection serves exactly one request, so these bound the whole
/// lifetime of a connection.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum duration of a single socket read (default: `2 seconds`)
    ///
    /// Covers each read of the request head and body. Prevents
    /// `slowloris attacks` and frees resources from inactive clients.
    pub socket_read_timeout: Duration,

    /// Maximum duration to write the whole response (default: `3 seconds`)
    pub socket_write_timeout: Duration,

    /// Maximum duration of the TLS handshake (default: `5 seconds`)
    ///
    /// Ignored for plain TCP servers.
    pub handshake_timeout: Duration,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ConnLimits {
    #[inline(always)]
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(2),
            socket_write_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(5),

            _priv: (),
        }
    }
}

/// HTTP request size limits
///
/// You MAY need to increase these if you see:
/// - `413 Payload Too Large` for legitimate requests
/// - `431 Request Header Fields Too Large`
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Maximum size of the request line plus headers, excluding the
    /// terminating `CRLF CRLF` (default: `8 KB`)
    pub header_size: usize,

    /// Maximum request body size in bytes (default: `64 KB`)
    ///
    /// Checked against `Content-Length` before any body byte is read.
    pub body_size: usize,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            header_size: 8 * 1024,
            body_size: 64 * 1024,

            _priv: (),
        }
    }
}

impl ReqLimits {
    // Header block + "\r\n\r\n" + body
    #[inline(always)]
    pub(crate) fn initial_buffer(&self) -> usize {
        (self.header_size + 4).min(4 * 1024)
    }
}
