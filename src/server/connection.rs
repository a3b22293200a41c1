use crate::{
    errors::ErrorKind,
    http::request::{self, Request},
    limits::{ConnLimits, ReqLimits, ServerLimits},
    Response,
};
use memchr::memmem;
use std::{
    io,
    net::SocketAddr,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc, OnceLock,
    },
    time::Instant,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite},
    task::AbortHandle,
    time::timeout,
};
use tracing::{debug, error, warn};

/// The callback a connection hands its request to.
pub(crate) type Dispatch = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// Limits shared by every connection of one server run.
#[derive(Debug, Clone, Default)]
pub(crate) struct AllLimits {
    pub(crate) server: ServerLimits,
    pub(crate) conn: ConnLimits,
    pub(crate) req: ReqLimits,
}

// STATE

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum ConnState {
    Handshaking,
    ReadingHeader,
    ReadingBody,
    Dispatched,
    Writing,
    Closed,
}

impl ConnState {
    #[inline(always)]
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Handshaking,
            1 => Self::ReadingHeader,
            2 => Self::ReadingBody,
            3 => Self::Dispatched,
            4 => Self::Writing,
            _ => Self::Closed,
        }
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Bookkeeping for one accepted socket, shared between its task and the registry.
#[derive(Debug)]
pub(crate) struct ConnectionHandle {
    id: u64,
    peer: SocketAddr,
    state: AtomicU8,
    task: OnceLock<AbortHandle>,
}

impl ConnectionHandle {
    pub(crate) fn new(peer: SocketAddr, tls: bool) -> Arc<Self> {
        let state = match tls {
            true => ConnState::Handshaking,
            false => ConnState::ReadingHeader,
        };

        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            peer,
            state: AtomicU8::new(state as u8),
            task: OnceLock::new(),
        })
    }

    #[inline(always)]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline(always)]
    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    #[inline(always)]
    pub(crate) fn state(&self) -> ConnState {
        ConnState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline(always)]
    pub(crate) fn set_state(&self, state: ConnState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// True once the connection reached its terminal state.
    #[inline(always)]
    pub(crate) fn is_reclaimable(&self) -> bool {
        self.state() == ConnState::Closed
    }

    pub(crate) fn attach(&self, task: AbortHandle) {
        let _ = self.task.set(task);
    }

    pub(crate) fn abort(&self) {
        if let Some(task) = self.task.get() {
            task.abort();
        }
    }
}

/// Marks the handle closed however the owning task ends, abort included.
pub(crate) struct ClosedOnDrop(pub(crate) Arc<ConnectionHandle>);

impl Drop for ClosedOnDrop {
    fn drop(&mut self) {
        self.0.set_state(ConnState::Closed);
    }
}

// CONNECTION

pub(crate) struct Connection<S> {
    stream: S,
    handle: Arc<ConnectionHandle>,
    dispatch: Dispatch,
    limits: Arc<AllLimits>,

    // Error responses echo the request once its head parsed
    reply_template: Option<Response>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    #[inline]
    pub(crate) fn new(
        stream: S,
        handle: Arc<ConnectionHandle>,
        dispatch: Dispatch,
        limits: Arc<AllLimits>,
    ) -> Self {
        Self {
            stream,
            handle,
            dispatch,
            limits,
            reply_template: None,
        }
    }

    /// Serves exactly one request and closes the stream.
    pub(crate) async fn run(mut self) {
        let started = Instant::now();

        match self.impl_run().await {
            Ok((request, response)) => debug!(
                id = self.handle.id(),
                method = %request.method(),
                url = request.url(),
                status = response.status_code(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "request served"
            ),
            Err(err) if err.is_transport() => debug!(
                id = self.handle.id(),
                peer = %self.handle.peer(),
                %err,
                "connection closed without a response"
            ),
            Err(err) => {
                warn!(
                    id = self.handle.id(),
                    peer = %self.handle.peer(),
                    %err,
                    "rejecting request"
                );
                self.send_error(&err).await;
            }
        }

        writer::shutdown(&mut self.stream, &self.limits.conn).await;

        let Self { stream, handle, .. } = self;
        drop(stream);
        handle.set_state(ConnState::Closed);
    }

    async fn impl_run(&mut self) -> Result<(Request, Response), ErrorKind> {
        self.handle.set_state(ConnState::ReadingHeader);

        let mut buffer = Vec::with_capacity(self.limits.req.initial_buffer());
        let header_end = self.read_header(&mut buffer).await?;

        let mut request = request::parse_header(&buffer[..header_end])?;
        request.set_peer_addr(self.handle.peer());
        self.reply_template = Some(Response::for_request(&request));

        match request.content_length() {
            Some(len) if len > self.limits.req.body_size => return Err(ErrorKind::BodyTooLarge),
            Some(len) if len > 0 => {
                self.handle.set_state(ConnState::ReadingBody);

                let residual = &buffer[header_end + 4..];
                let body = self.read_body(residual, len).await?;
                request.set_body(body);
            }
            _ => {}
        }

        self.handle.set_state(ConnState::Dispatched);
        let mut response = Response::for_request(&request);

        let dispatch = &self.dispatch;
        panic::catch_unwind(AssertUnwindSafe(|| dispatch(&request, &mut response)))
            .map_err(|_| ErrorKind::HandlerPanicked)?;

        self.handle.set_state(ConnState::Writing);
        if let Err(err) = writer::write_bytes(
            &mut self.stream,
            &response.serialize(),
            &self.limits.conn,
        )
        .await
        {
            error!(id = self.handle.id(), %err, "failed to write response");
        }

        Ok((request, response))
    }

    async fn read_header(&mut self, buffer: &mut Vec<u8>) -> Result<usize, ErrorKind> {
        let max = self.limits.req.header_size;
        let mut searched = 0;

        loop {
            if let Some(pos) = memmem::find(&buffer[searched..], b"\r\n\r\n") {
                let end = searched + pos;
                return match end > max {
                    true => Err(ErrorKind::HeaderTooLarge),
                    false => Ok(end),
                };
            }

            // The terminator may straddle two reads
            searched = buffer.len().saturating_sub(3);
            if searched > max {
                return Err(ErrorKind::HeaderTooLarge);
            }

            if self.fill(buffer).await? == 0 {
                return Err(ErrorKind::ConnectionClosed);
            }
        }
    }

    async fn read_body(&mut self, residual: &[u8], len: usize) -> Result<Vec<u8>, ErrorKind> {
        let mut body = Vec::with_capacity(len);
        body.extend_from_slice(&residual[..residual.len().min(len)]);

        while body.len() < len {
            if self.fill(&mut body).await? == 0 {
                return Err(ErrorKind::ShortBody {
                    expected: len,
                    available: body.len(),
                });
            }
        }

        body.truncate(len);
        Ok(body)
    }

    #[inline]
    async fn fill(&mut self, buffer: &mut Vec<u8>) -> Result<usize, ErrorKind> {
        match timeout(
            self.limits.conn.socket_read_timeout,
            self.stream.read_buf(buffer),
        )
        .await
        {
            Ok(read) => Ok(read?),
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timeout").into()),
        }
    }

    async fn send_error(&mut self, err: &ErrorKind) {
        let mut response = self
            .reply_template
            .take()
            .unwrap_or_else(|| Response::with_version("HTTP", "1.1"));

        response.status(err.status());
        if self.limits.server.json_errors {
            response.content_type("application/json").body(err.json());
        }

        self.handle.set_state(ConnState::Writing);
        if let Err(e) =
            writer::write_bytes(&mut self.stream, &response.serialize(), &self.limits.conn).await
        {
            error!(id = self.handle.id(), err = %e, "failed to write error response");
        }
    }
}

pub(crate) mod writer {
    use crate::limits::ConnLimits;
    use std::io;
    use tokio::{
        io::{AsyncWrite, AsyncWriteExt},
        time::timeout,
    };

    #[inline(always)]
    pub(crate) async fn write_bytes<S: AsyncWrite + Unpin>(
        stream: &mut S,
        response: &[u8],
        limits: &ConnLimits,
    ) -> Result<(), io::Error> {
        timeout(limits.socket_write_timeout, async {
            stream.write_all(response).await?;
            stream.flush().await
        })
        .await?
    }

    #[inline(always)]
    pub(crate) async fn shutdown<S: AsyncWrite + Unpin>(stream: &mut S, limits: &ConnLimits) {
        let _ = timeout(limits.socket_write_timeout, stream.shutdown()).await;
    }
}
