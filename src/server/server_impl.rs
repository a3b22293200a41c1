use crate::{
    errors::ServerError,
    limits::{ConnLimits, ReqLimits, ServerLimits},
    server::{
        connection::{AllLimits, ClosedOnDrop, Connection, ConnectionHandle, Dispatch},
        router::{Handler, Router},
        tls::{self, TlsPaths},
    },
    Method, Request, Response,
};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io,
    net::{IpAddr, SocketAddr},
    ops::ControlFlow,
    path::PathBuf,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    runtime::{self, Runtime},
    sync::watch,
    time,
};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, trace, warn};

/// An HTTP server that answers exactly one request per connection.
///
/// Routes are registered up front, then [`start`](Server::start) binds the
/// listener and spawns two threads: the reactor, which owns a tokio runtime
/// driving the accept loop and one task per connection, and the reaper,
/// which periodically drops finished connections from the live registry.
///
/// # Examples
///
/// ```no_run
/// use oneshot_http::{Method, Request, Response, Server, StatusCode};
///
/// let mut server = Server::new("127.0.0.1", 8080);
///
/// server
///     .register(Method::Get, "/", |_: &Request, resp: &mut Response| {
///         resp.status(StatusCode::Ok)
///             .host("localhost")
///             .content_type("text/html")
///             .body("<html><body><h1>HELLO WORLD from root!</h1></body></html>");
///     })
///     .unwrap();
///
/// assert!(server.start());
/// // ...
/// server.stop();
/// ```
pub struct Server {
    address: String,
    port: u16,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,
    limits: Arc<AllLimits>,

    router: Arc<Router>,
    registry: Arc<Registry>,
    running: Option<Running>,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    reactor: JoinHandle<()>,
    reaper_stop: Sender<()>,
    reaper: JoinHandle<()>,
}

impl Server {
    /// Creates a plain TCP server with default limits.
    ///
    /// Nothing is bound until [`start`](Server::start). Port `0` asks the OS
    /// for a free port, see [`local_addr`](Server::local_addr).
    #[inline]
    pub fn new<A: Into<String>>(address: A, port: u16) -> Self {
        Self::builder().address(address).port(port).build()
    }

    /// Creates a new builder for configuring the server instance.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use oneshot_http::{Server, limits::ServerLimits};
    ///
    /// let server = Server::builder()
    ///     .address("0.0.0.0")
    ///     .port(8443)
    ///     .tls("certs/cert.pem", "certs/key.pem")
    ///     .server_limits(ServerLimits {
    ///         worker_threads: 4,
    ///         ..ServerLimits::default()
    ///     })
    ///     .build();
    /// ```
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Adds a route.
    ///
    /// Paths are matched exactly against the request target. Registering the
    /// same method and path twice keeps both, but only the first one is ever
    /// reached.
    ///
    /// # Errors
    ///
    /// [`ServerError::AlreadyStarted`] while the server is running.
    pub fn register<H: Handler>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
    ) -> Result<(), ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        Arc::make_mut(&mut self.router).register(method, path, handler);
        Ok(())
    }

    /// Starts serving; `false` if the server could not start.
    ///
    /// The failure itself is logged. Use [`try_start`](Server::try_start)
    /// to inspect it.
    pub fn start(&mut self) -> bool {
        match self.try_start() {
            Ok(()) => true,
            Err(err) => {
                error!(%err, address = %self.address, port = self.port, "failed to start server");
                false
            }
        }
    }

    /// Binds the listener and spawns the reactor and reaper threads.
    ///
    /// On error nothing keeps running and no port stays bound.
    pub fn try_start(&mut self) -> Result<(), ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyStarted);
        }

        let ip: IpAddr = self
            .address
            .parse()
            .map_err(|source| ServerError::InvalidAddress {
                address: self.address.clone(),
                source,
            })?;
        let addr = SocketAddr::new(ip, self.port);

        let acceptor = match TlsPaths::pair(self.cert_path.clone(), self.key_path.clone())? {
            Some(paths) => Some(paths.acceptor()?),
            None => None,
        };

        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(self.limits.server.worker_threads.max(1))
            .thread_name("oneshot-http-worker")
            .enable_io()
            .enable_time()
            .build()
            .map_err(ServerError::Runtime)?;

        let listener = {
            let _guard = runtime.enter();
            bind_listener(addr)
                .and_then(TcpListener::from_std)
                .map_err(|source| ServerError::Bind { addr, source })?
        };
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept = AcceptLoop {
            listener,
            shutdown: shutdown_rx,
            acceptor,
            dispatch: self.dispatch(),
            limits: self.limits.clone(),
            registry: self.registry.clone(),
        };

        let reactor = spawn_reactor(runtime, accept, self.limits.server.shutdown_timeout)
            .map_err(ServerError::Runtime)?;

        let (reaper_stop, reaper) = match spawn_reaper(self.registry.clone(), &self.limits.server) {
            Ok(parts) => parts,
            Err(err) => {
                let _ = shutdown.send(true);
                let _ = reactor.join();
                self.registry.clear();
                return Err(ServerError::Runtime(err));
            }
        };

        info!(
            addr = %local_addr,
            tls = self.cert_path.is_some(),
            routes = self.router.len(),
            "server started"
        );

        self.running = Some(Running {
            local_addr,
            shutdown,
            reactor,
            reaper_stop,
            reaper,
        });
        Ok(())
    }

    /// Stops accepting, aborts in-flight connections and joins both threads.
    ///
    /// Calling it on a server that is not running does nothing. A stopped
    /// server can be started again.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        let _ = running.shutdown.send(true);
        if running.reactor.join().is_err() {
            error!("reactor thread panicked");
        }

        let _ = running.reaper_stop.send(());
        if running.reaper.join().is_err() {
            error!("reaper thread panicked");
        }

        self.registry.clear();
        info!(addr = %running.local_addr, "server stopped");
    }

    /// Bound address while running, with the real port when `0` was requested.
    #[inline]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Connections accepted and not yet reaped.
    #[inline]
    pub fn live_connections(&self) -> usize {
        self.registry.len()
    }

    fn dispatch(&self) -> Dispatch {
        let router = self.router.clone();
        Arc::new(move |req: &Request, resp: &mut Response| {
            router.dispatch(req, resp);
        })
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("tls", &self.cert_path.is_some())
            .field("routes", &self.router)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

// REGISTRY

/// Live connections, appended by the accept loop and swept by the reaper.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    live: Mutex<Vec<Arc<ConnectionHandle>>>,
}

impl Registry {
    #[inline]
    pub(crate) fn push(&self, handle: Arc<ConnectionHandle>) {
        self.live.lock().push(handle);
    }

    /// Drops every closed connection, returns how many were removed.
    pub(crate) fn reap(&self) -> usize {
        let mut live = self.live.lock();
        let before = live.len();
        live.retain(|handle| !handle.is_reclaimable());
        before - live.len()
    }

    pub(crate) fn abort_all(&self) {
        for handle in self.live.lock().iter() {
            handle.abort();
        }
    }

    pub(crate) fn clear(&self) {
        self.live.lock().clear();
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.live.lock().len()
    }
}

fn spawn_reaper(
    registry: Arc<Registry>,
    limits: &ServerLimits,
) -> io::Result<(Sender<()>, JoinHandle<()>)> {
    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    let ticker = channel::tick(limits.reaper_interval);

    let reaper = thread::Builder::new()
        .name("oneshot-http-reaper".into())
        .spawn(move || loop {
            channel::select! {
                recv(ticker) -> _ => {
                    let removed = registry.reap();
                    if removed > 0 {
                        trace!(removed, remaining = registry.len(), "reaped closed connections");
                    }
                }
                recv(stop_rx) -> _ => break,
            }
        })?;

    Ok((stop_tx, reaper))
}

// REACTOR

struct AcceptLoop {
    listener: TcpListener,
    shutdown: watch::Receiver<bool>,
    acceptor: Option<TlsAcceptor>,
    dispatch: Dispatch,
    limits: Arc<AllLimits>,
    registry: Arc<Registry>,
}

fn spawn_reactor(
    runtime: Runtime,
    accept: AcceptLoop,
    shutdown_timeout: Duration,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("oneshot-http-reactor".into())
        .spawn(move || {
            let registry = accept.registry.clone();
            runtime.block_on(accept.run());

            registry.abort_all();
            runtime.shutdown_timeout(shutdown_timeout);
        })
}

impl AcceptLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => return,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(err) => {
                        if self.recover(err).await.is_break() {
                            break;
                        }
                    }
                },
            }
        }

        self.close_listener().await;
    }

    /// Decides whether accepting goes on after a failed `accept`.
    async fn recover(&mut self, err: io::Error) -> ControlFlow<()> {
        match AcceptFailure::of(&err) {
            AcceptFailure::Connection => {
                warn!(%err, "failed to accept a connection");
                ControlFlow::Continue(())
            }
            AcceptFailure::Resources => {
                warn!(%err, backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "accept failed, retrying");

                tokio::select! {
                    biased;

                    _ = self.shutdown.changed() => ControlFlow::Break(()),
                    _ = time::sleep(ACCEPT_BACKOFF) => ControlFlow::Continue(()),
                }
            }
            AcceptFailure::Listener => {
                error!(%err, "listener failed, no longer accepting connections");
                ControlFlow::Break(())
            }
        }
    }

    /// Releases the port; in-flight connections keep running until `stop`.
    async fn close_listener(self) {
        let Self {
            listener,
            mut shutdown,
            ..
        } = self;
        drop(listener);

        if !*shutdown.borrow() {
            let _ = shutdown.changed().await;
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let handle = ConnectionHandle::new(peer, self.acceptor.is_some());
        debug!(id = handle.id(), %peer, "accepted connection");

        let task_handle = handle.clone();
        let acceptor = self.acceptor.clone();
        let dispatch = self.dispatch.clone();
        let limits = self.limits.clone();

        let task = tokio::spawn(async move {
            let _closed = ClosedOnDrop(task_handle.clone());

            match acceptor {
                None => {
                    Connection::new(stream, task_handle, dispatch, limits)
                        .run()
                        .await
                }
                Some(acceptor) => match tls::handshake(&acceptor, stream, &limits.conn).await {
                    Ok(stream) => {
                        Connection::new(stream, task_handle, dispatch, limits)
                            .run()
                            .await
                    }
                    Err(err) => {
                        warn!(id = task_handle.id(), %peer, %err, "TLS handshake failed");
                    }
                },
            }
        });

        handle.attach(task.abort_handle());
        self.registry.push(handle);
    }
}

const ACCEPT_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The peer went away before the handshake completed.
    Connection,
    /// The listener is unusable.
    Listener,
    /// Anything else, out of descriptors or buffers included.
    Resources,
}

impl AcceptFailure {
    fn of(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => Self::Connection,
            io::ErrorKind::NotConnected | io::ErrorKind::InvalidInput => Self::Listener,
            _ => Self::Resources,
        }
    }
}

fn bind_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

//

/// Builder for configuring and creating [`Server`] instances.
///
/// Every setting is fixed once [`build`](ServerBuilder::build) returns.
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    address: String,
    port: u16,
    cert_path: Option<PathBuf>,
    key_path: Option<PathBuf>,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    request_limits: Option<ReqLimits>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_owned(),
            port: 80,
            cert_path: None,
            key_path: None,

            server_limits: None,
            connection_limits: None,
            request_limits: None,
        }
    }
}

impl ServerBuilder {
    /// IP address to bind (default: `127.0.0.1`).
    ///
    /// Host names are not resolved; `start` fails with
    /// [`ServerError::InvalidAddress`] for anything that is not an IP.
    #[inline(always)]
    pub fn address<A: Into<String>>(mut self, address: A) -> Self {
        self.address = address.into();
        self
    }

    /// TCP port (default: `80`).
    #[inline(always)]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Serves over TLS with a PEM certificate chain and a PEM private key.
    ///
    /// The files are read when the server starts.
    #[inline(always)]
    pub fn tls<C: Into<PathBuf>, K: Into<PathBuf>>(mut self, cert_path: C, key_path: K) -> Self {
        self.cert_path = Some(cert_path.into());
        self.key_path = Some(key_path.into());
        self
    }

    /// Sets only the certificate path; starting fails until a key is set too.
    #[inline(always)]
    pub fn cert_path<C: Into<PathBuf>>(mut self, cert_path: C) -> Self {
        self.cert_path = Some(cert_path.into());
        self
    }

    /// Sets only the key path; starting fails until a certificate is set too.
    #[inline(always)]
    pub fn key_path<K: Into<PathBuf>>(mut self, key_path: K) -> Self {
        self.key_path = Some(key_path.into());
        self
    }

    /// Configures threads, the reaper and error response format.
    ///
    /// # Examples
    ///
    /// ```
    /// use oneshot_http::{Server, limits::ServerLimits};
    /// use std::time::Duration;
    ///
    /// let server = Server::builder()
    ///     .server_limits(ServerLimits {
    ///         // Your changes
    ///         reaper_interval: Duration::from_millis(100),
    ///         json_errors: false,
    ///         ..ServerLimits::default() // Required line
    ///     })
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures per-connection timeouts.
    ///
    /// # Examples
    ///
    /// ```
    /// use oneshot_http::{Server, limits::ConnLimits};
    /// use std::time::Duration;
    ///
    /// let server = Server::builder()
    ///     .connection_limits(ConnLimits {
    ///         // Your changes
    ///         socket_read_timeout: Duration::from_secs(5),
    ///         socket_write_timeout: Duration::from_secs(2),
    ///         ..ConnLimits::default() // Required line
    ///     })
    ///     .build();
    /// ```
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures request size limits.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Finalizes the builder and constructs a stopped [`Server`].
    #[inline]
    pub fn build(self) -> Server {
        let limits = AllLimits {
            server: self.server_limits.unwrap_or_default(),
            conn: self.connection_limits.unwrap_or_default(),
            req: self.request_limits.unwrap_or_default(),
        };

        Server {
            address: self.address,
            port: self.port,
            cert_path: self.cert_path,
            key_path: self.key_path,
            limits: Arc::new(limits),

            router: Arc::new(Router::default()),
            registry: Arc::new(Registry::default()),
            running: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;
    use std::{
        io::{Read, Write},
        net::TcpStream as StdStream,
        time::{Duration, Instant},
    };

    fn local() -> Server {
        let mut server = Server::new("127.0.0.1", 0);
        server
            .register(Method::Get, "/", |_: &Request, resp: &mut Response| {
                resp.status(StatusCode::Ok).body("ok");
            })
            .unwrap();
        server
    }

    fn get(addr: SocketAddr) -> String {
        let mut stream = StdStream::connect(addr).unwrap();
        stream.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn lifecycle() {
        let mut server = local();
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);

        server.stop();

        assert!(server.start());
        assert!(server.is_running());
        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(get(addr).ends_with("\r\n\r\nok"));

        assert!(matches!(server.try_start(), Err(ServerError::AlreadyStarted)));
        assert!(matches!(
            server.register(Method::Get, "/late", |_: &Request, _: &mut Response| {}),
            Err(ServerError::AlreadyStarted)
        ));

        server.stop();
        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.live_connections(), 0);
        assert!(StdStream::connect(addr).is_err());

        // Restart on a fresh port
        assert!(server.start());
        assert!(get(server.local_addr().unwrap()).ends_with("ok"));
    }

    #[test]
    fn start_errors() {
        let mut server = Server::new("not-an-ip", 0);
        assert!(matches!(
            server.try_start(),
            Err(ServerError::InvalidAddress { .. })
        ));
        assert!(!server.start());
        assert!(!server.is_running());

        let mut tls = Server::builder().port(0).cert_path("cert.pem").build();
        assert!(matches!(
            tls.try_start(),
            Err(ServerError::Tls(crate::TlsConfigError::MissingKey))
        ));

        let mut first = local();
        assert!(first.start());
        let taken = first.local_addr().unwrap();

        // SO_REUSEADDR does not allow two listeners on one port
        let mut second = Server::new("127.0.0.1", taken.port());
        assert!(matches!(second.try_start(), Err(ServerError::Bind { .. })));
    }

    #[test]
    fn reaper_empties_registry() {
        let mut server = Server::builder()
            .port(0)
            .server_limits(ServerLimits {
                reaper_interval: Duration::from_millis(5),
                ..ServerLimits::default()
            })
            .build();
        assert!(server.start());
        let addr = server.local_addr().unwrap();

        for _ in 0..5 {
            assert!(get(addr).starts_with("HTTP/1.1 404 Not Found\r\n"));
        }

        let deadline = Instant::now() + Duration::from_secs(2);
        while server.live_connections() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(server.live_connections(), 0);
    }

    #[test]
    fn registry_reap() {
        let registry = Registry::default();
        let peer: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let open = ConnectionHandle::new(peer, false);
        let done = ConnectionHandle::new(peer, false);
        drop(ClosedOnDrop(done.clone()));

        registry.push(open.clone());
        registry.push(done);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.reap(), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.reap(), 0);

        registry.abort_all();
        registry.clear();
        assert_eq!(registry.len(), 0);
        assert!(!open.is_reclaimable());
    }

    #[test]
    fn accept_error_policy() {
        #[rustfmt::skip]
        let cases = [
            (io::Error::from(io::ErrorKind::ConnectionAborted), AcceptFailure::Connection),
            (io::Error::from(io::ErrorKind::ConnectionReset),   AcceptFailure::Connection),
            (io::Error::from(io::ErrorKind::Interrupted),       AcceptFailure::Connection),
            (io::Error::from(io::ErrorKind::InvalidInput),      AcceptFailure::Listener),
            (io::Error::from(io::ErrorKind::PermissionDenied),  AcceptFailure::Resources),
            (io::Error::from(io::ErrorKind::Other),             AcceptFailure::Resources),
            // EMFILE, ENFILE on Linux
            (io::Error::from_raw_os_error(24),                  AcceptFailure::Resources),
            (io::Error::from_raw_os_error(23),                  AcceptFailure::Resources),
        ];

        for (err, expected) in cases {
            assert_eq!(AcceptFailure::of(&err), expected, "{err:?}");
        }
    }

    async fn accept_loop() -> (AcceptLoop, SocketAddr, watch::Sender<bool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let accept = AcceptLoop {
            listener,
            shutdown: shutdown_rx,
            acceptor: None,
            dispatch: local().dispatch(),
            limits: Arc::default(),
            registry: Arc::default(),
        };
        (accept, addr, shutdown)
    }

    #[tokio::test]
    async fn out_of_descriptors_backs_off_and_keeps_serving() {
        let (mut accept, addr, shutdown) = accept_loop().await;

        let started = Instant::now();
        let flow = accept.recover(io::Error::from_raw_os_error(24)).await;
        assert_eq!(flow, ControlFlow::Continue(()));
        assert!(started.elapsed() >= ACCEPT_BACKOFF);

        let serving = tokio::spawn(accept.run());
        let resp = tokio::task::spawn_blocking(move || get(addr)).await.unwrap();
        assert!(resp.ends_with("\r\n\r\nok"), "{resp}");

        shutdown.send(true).unwrap();
        serving.await.unwrap();
    }

    #[tokio::test]
    async fn backoff_ends_on_shutdown() {
        let (mut accept, _, shutdown) = accept_loop().await;
        shutdown.send(true).unwrap();

        let flow = accept.recover(io::Error::from_raw_os_error(24)).await;
        assert_eq!(flow, ControlFlow::Break(()));
    }

    #[tokio::test]
    async fn broken_listener_releases_port() {
        let (mut accept, addr, shutdown) = accept_loop().await;

        let flow = accept.recover(io::Error::from(io::ErrorKind::InvalidInput)).await;
        assert_eq!(flow, ControlFlow::Break(()));

        let idle = tokio::spawn(accept.close_listener());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!idle.is_finished());

        let refused = tokio::task::spawn_blocking(move || StdStream::connect(addr))
            .await
            .unwrap();
        assert!(refused.is_err());

        shutdown.send(true).unwrap();
        idle.await.unwrap();
    }
}
