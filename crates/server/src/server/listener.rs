//! TCP listener and accept loop.
//!
//! # Responsibilities
//! - Open, configure, bind and listen, reporting each step separately
//! - Accept connections and hand each one to its own session task
//! - Keep accepting after transient accept failures
//! - Stop on request, closing the listening socket

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use super::router::Router;
use super::session::{self, SessionConfig};

const BACKLOG: u32 = 1024;

/// Which startup step failed.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to open socket: {0}")]
    Open(#[source] io::Error),

    #[error("failed to set socket option: {0}")]
    SocketOption(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen: {0}")]
    Listen(#[source] io::Error),
}

/// A bound, listening socket.
pub struct Listener {
    inner: TcpListener,
    backoff: Duration,
}

impl Listener {
    /// Open, configure (`SO_REUSEADDR`), bind and listen on `address:port`.
    /// Port 0 picks an ephemeral port; see [`Listener::local_addr`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(address: IpAddr, port: u16) -> Result<Self, ListenerError> {
        let addr = SocketAddr::new(address, port);
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(ListenerError::Open)?;

        socket
            .set_reuseaddr(true)
            .map_err(ListenerError::SocketOption)?;
        socket
            .bind(addr)
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let inner = socket.listen(BACKLOG).map_err(ListenerError::Listen)?;

        tracing::info!(address = %addr, "listener bound");

        Ok(Self {
            inner,
            backoff: Duration::from_millis(400),
        })
    }

    /// Pause applied after a failed accept.
    pub fn with_accept_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept until `shutdown` is cancelled, running one session task per
    /// connection. Sessions are not tracked and outlive the loop.
    pub async fn serve(
        self,
        acceptor: TlsAcceptor,
        router: Arc<Router>,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) {
        let inner = &self.inner;
        accept_loop(
            move || inner.accept(),
            |tcp, peer_addr| {
                tokio::spawn(session::run(
                    tcp,
                    peer_addr,
                    acceptor.clone(),
                    Arc::clone(&router),
                    config,
                ));
            },
            self.backoff,
            shutdown,
        )
        .await;
    }

    /// Run [`Listener::serve`] on its own task.
    pub fn spawn(
        self,
        acceptor: TlsAcceptor,
        router: Arc<Router>,
        config: SessionConfig,
    ) -> io::Result<ListenerHandle> {
        let local_addr = self.local_addr()?;
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(self.serve(acceptor, router, config, shutdown.clone()));
        Ok(ListenerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Drive `accept` until `shutdown` fires, handing each connection to
/// `on_connection`. A failed accept is logged and retried after `backoff`.
async fn accept_loop<A, F, C, T>(
    mut accept: A,
    mut on_connection: C,
    backoff: Duration,
    shutdown: CancellationToken,
) where
    A: FnMut() -> F,
    F: Future<Output = io::Result<(T, SocketAddr)>>,
    C: FnMut(T, SocketAddr),
{
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = accept() => accepted,
        };
        match accepted {
            Ok((conn, peer_addr)) => {
                tracing::debug!(%peer_addr, "connection accepted");
                on_connection(conn, peer_addr);
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "accept failed"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
    tracing::info!("listener stopped");
}

/// Control handle for a spawned accept loop.
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and close the listening socket. In-flight sessions
    /// keep running.
    pub async fn stop(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "accept loop ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_rustls::TlsConnector;

    use crate::server::files::FileResponder;
    use crate::server::query::{MockQueryEngine, QueryResponder};
    use crate::server::tls;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::start(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported_as_bind() {
        let first = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = first.local_addr().unwrap().port();
        let err = Listener::start(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
            .err()
            .unwrap();
        assert!(matches!(err, ListenerError::Bind { .. }), "got {err}");
    }

    #[tokio::test]
    async fn keeps_accepting_after_failed_accept() {
        let peer = SocketAddr::from((Ipv4Addr::LOCALHOST, 40000));
        let attempts = AtomicUsize::new(0);
        let accepted = Mutex::new(Vec::new());
        let shutdown = CancellationToken::new();
        let backoff = Duration::from_millis(50);

        let started = Instant::now();
        accept_loop(
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    match n {
                        0 => Err(io::Error::new(io::ErrorKind::ConnectionAborted, "aborted")),
                        1 | 2 => Ok((n, peer)),
                        _ => std::future::pending().await,
                    }
                }
            },
            |conn, _| {
                let mut accepted = accepted.lock().unwrap();
                accepted.push(conn);
                if accepted.len() == 2 {
                    shutdown.cancel();
                }
            },
            backoff,
            shutdown.clone(),
        )
        .await;

        assert!(started.elapsed() >= backoff);
        assert_eq!(*accepted.lock().unwrap(), vec![1, 2]);
    }

    struct TlsFixture {
        _dir: tempfile::TempDir,
        acceptor: TlsAcceptor,
        connector: TlsConnector,
        router: Arc<Router>,
    }

    fn tls_fixture() -> TlsFixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clip.mp4"), b"0123456789").unwrap();
        let mut engine = MockQueryEngine::new();
        engine.expect_select().returning(|_| Ok(Vec::new()));
        let router = Router::new(
            FileResponder::new(dir.path(), "/v1/download").unwrap(),
            QueryResponder::new(Arc::new(engine)),
        );

        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let server_config =
            tls::build_server_config(cert.pem().as_bytes(), key_pair.serialize_pem().as_bytes())
                .unwrap();

        let mut roots = rustls::RootCertStore::empty();
        roots.add(cert.der().clone()).unwrap();
        let client_config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();

        TlsFixture {
            _dir: dir,
            acceptor: TlsAcceptor::from(server_config),
            connector: TlsConnector::from(Arc::new(client_config)),
            router: Arc::new(router),
        }
    }

    async fn get_clip<S>(stream: &mut S) -> String
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        stream
            .write_all(b"GET /v1/download/clip.mp4 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let mut out = Vec::new();
        let mut chunk = [0u8; 1024];
        while !out.ends_with(b"0123456789") {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "stream closed early");
            out.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn stop_leaves_open_sessions_running() {
        let fx = tls_fixture();
        let listener = Listener::start(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).unwrap();
        let handle = listener
            .spawn(fx.acceptor.clone(), Arc::clone(&fx.router), SessionConfig::default())
            .unwrap();
        let addr = handle.local_addr();

        let tcp = tokio::net::TcpStream::connect(addr).await.unwrap();
        let server_name = rustls::pki_types::ServerName::try_from("localhost").unwrap();
        let mut stream = fx.connector.connect(server_name, tcp).await.unwrap();
        assert!(get_clip(&mut stream).await.starts_with("HTTP/1.1 200 OK\r\n"));

        handle.stop().await;

        assert!(get_clip(&mut stream).await.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
