//! Per-connection session: TLS handshake, then a read/dispatch/write loop.
//!
//! Phases:
//!
//! ```text
//! Handshaking -> Reading -> Dispatching -> Writing -> Reading | Closing -> Closed
//! ```
//!
//! Every I/O phase runs under its own deadline. A handshake failure drops the
//! socket immediately; every other failure goes through `Closing`, which
//! attempts a graceful TLS shutdown. Exactly one operation is outstanding at
//! any time.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use super::router::Router;
use crate::http::{write_response, ProtocolError, Request, RequestDecoder, Response};

const READ_CHUNK: usize = 8 * 1024;

/// Limits applied to every session.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Deadline for each of handshake, read, write and shutdown.
    pub phase_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            phase_timeout: Duration::from_secs(30),
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Handshaking,
    Reading,
    Dispatching,
    Writing,
    Closing,
    Closed,
}

/// Why the Reading phase did not produce a request.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("peer closed the connection")]
    EndOfStream,

    #[error("peer closed the connection mid-message")]
    UnexpectedEof,

    #[error("read deadline elapsed")]
    Timeout,

    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Accept-side entry point: handshake on `tcp`, then drive the session.
///
/// Runs inside a span carrying a fresh session id and the peer address.
pub async fn run(
    tcp: TcpStream,
    peer_addr: SocketAddr,
    acceptor: TlsAcceptor,
    router: Arc<Router>,
    config: SessionConfig,
) {
    let span = info_span!("session", session_id = %Uuid::new_v4(), %peer_addr);
    async move {
        debug!(phase = ?Phase::Handshaking, "session started");
        let stream = match timeout(config.phase_timeout, acceptor.accept(tcp)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "TLS handshake failed");
                return;
            }
            Err(_) => {
                warn!("TLS handshake deadline elapsed");
                return;
            }
        };
        let served = Session::new(stream, router, config).drive().await;
        debug!(requests = served, "session finished");
    }
    .instrument(span)
    .await
}

/// An established, encrypted connection and its per-request state.
pub struct Session<S> {
    stream: S,
    buffer: BytesMut,
    decoder: RequestDecoder,
    request: Request,
    pending: Option<Response>,
    router: Arc<Router>,
    phase_timeout: Duration,
    served: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, router: Arc<Router>, config: SessionConfig) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            decoder: RequestDecoder::new(config.max_body_bytes),
            request: Request::default(),
            pending: None,
            router,
            phase_timeout: config.phase_timeout,
            served: 0,
        }
    }

    /// Run the session until it closes. Returns the number of responses written.
    pub async fn drive(mut self) -> u64 {
        let mut phase = Phase::Reading;
        loop {
            phase = match phase {
                Phase::Reading => self.read().await,
                Phase::Dispatching => self.dispatch(),
                Phase::Writing => self.write().await,
                Phase::Closing => self.close().await,
                Phase::Handshaking | Phase::Closed => break,
            };
        }
        self.served
    }

    async fn read(&mut self) -> Phase {
        self.request = Request::default();
        let deadline = self.phase_timeout;
        let result = match timeout(deadline, self.read_request()).await {
            Ok(result) => result,
            Err(_) => Err(ReadError::Timeout),
        };
        match result {
            Ok(request) => {
                self.request = request;
                Phase::Dispatching
            }
            Err(ReadError::EndOfStream) => {
                debug!("peer closed the connection");
                Phase::Closing
            }
            Err(e) => {
                warn!(error = %e, "read failed");
                Phase::Closing
            }
        }
    }

    async fn read_request(&mut self) -> Result<Request, ReadError> {
        loop {
            if let Some(request) = self.decoder.decode(&mut self.buffer)? {
                return Ok(request);
            }
            self.buffer.reserve(READ_CHUNK);
            let n = match self.stream.read_buf(&mut self.buffer).await {
                Ok(n) => n,
                // rustls reports a peer that skips close_notify as UnexpectedEof.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => 0,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                return Err(if self.buffer.is_empty() {
                    ReadError::EndOfStream
                } else {
                    ReadError::UnexpectedEof
                });
            }
        }
    }

    fn dispatch(&mut self) -> Phase {
        self.pending = Some(self.router.route(&self.request));
        Phase::Writing
    }

    async fn write(&mut self) -> Phase {
        let Some(response) = self.pending.take() else {
            return Phase::Closing;
        };
        let needs_close = !response.keep_alive;
        match timeout(self.phase_timeout, write_response(&mut self.stream, response)).await {
            Ok(Ok(bytes)) => {
                self.served += 1;
                debug!(bytes, needs_close, "response written");
                if needs_close {
                    Phase::Closing
                } else {
                    Phase::Reading
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "write failed");
                Phase::Closing
            }
            Err(_) => {
                warn!("write deadline elapsed");
                Phase::Closing
            }
        }
    }

    async fn close(&mut self) -> Phase {
        match timeout(self.phase_timeout, self.stream.shutdown()).await {
            Ok(Ok(())) => debug!("connection shut down"),
            Ok(Err(e)) => debug!(error = %e, "shutdown failed"),
            Err(_) => warn!("shutdown deadline elapsed"),
        }
        Phase::Closed
    }
}
