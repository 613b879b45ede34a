//! Startup wiring: configuration to a running listener.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::catalog::{self, Catalog};
use crate::config::Config;
use crate::server::{
    tls, FileResponder, Listener, ListenerError, ListenerHandle, QueryResponder, Router,
    SessionConfig,
};

/// Fatal startup failures. Each maps to a distinct process exit code.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration invalid: {0:#}")]
    Config(anyhow::Error),

    #[error("telemetry initialisation failed: {0:#}")]
    Telemetry(anyhow::Error),

    #[error("TLS setup failed: {0:#}")]
    Certificate(anyhow::Error),

    #[error("file root unusable: {0}")]
    FileRoot(io::Error),

    #[error("catalog load failed: {0:#}")]
    Catalog(anyhow::Error),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

impl BootstrapError {
    pub fn exit_code(&self) -> u8 {
        match self {
            BootstrapError::Config(_) => 2,
            BootstrapError::Telemetry(_) => 3,
            BootstrapError::Certificate(_) => 4,
            BootstrapError::FileRoot(_) => 5,
            BootstrapError::Catalog(_) => 6,
            BootstrapError::Listener(ListenerError::Open(_)) => 10,
            BootstrapError::Listener(ListenerError::SocketOption(_)) => 11,
            BootstrapError::Listener(ListenerError::Bind { .. }) => 12,
            BootstrapError::Listener(ListenerError::Listen(_)) => 13,
        }
    }
}

/// A started server: the accept loop plus the optional catalog refresher.
pub struct RunningServer {
    listener: ListenerHandle,
    refresh: Option<JoinHandle<()>>,
}

impl RunningServer {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.listener.local_addr()
    }

    /// Stop accepting connections and the catalog refresh.
    pub async fn stop(self) {
        if let Some(refresh) = self.refresh {
            refresh.abort();
        }
        self.listener.stop().await;
    }
}

/// Build TLS, responders and catalog from `cfg`, then bind and start accepting.
///
/// # Errors
///
/// Returns the [`BootstrapError`] for the first step that fails.
pub async fn start(cfg: &Config) -> Result<RunningServer, BootstrapError> {
    let tls_config =
        tls::load_server_config(Path::new(&cfg.tls_cert_path), Path::new(&cfg.tls_key_path))
            .map_err(BootstrapError::Certificate)?;
    let acceptor = TlsAcceptor::from(tls_config);

    let files = FileResponder::new(cfg.file_root(), cfg.download_prefix.clone())
        .map_err(BootstrapError::FileRoot)?;
    info!(root = %files.root().display(), prefix = %cfg.download_prefix, "serving files");

    let catalog = Catalog::new();
    let catalog_path = cfg.catalog_path.as_deref().map(Path::new);
    match catalog_path {
        Some(path) => catalog::load(path, &catalog)
            .await
            .map_err(BootstrapError::Catalog)?,
        None => info!("no CATALOG_PATH set; queries will return no records"),
    }

    let router = Arc::new(Router::new(
        files,
        QueryResponder::new(Arc::new(catalog.clone())),
    ));
    let session = SessionConfig {
        phase_timeout: cfg.phase_timeout(),
        max_body_bytes: cfg.max_body_bytes,
    };

    let bind_ip = cfg.bind_ip().map_err(BootstrapError::Config)?;
    let listener = Listener::start(bind_ip, cfg.port)?.with_accept_backoff(cfg.accept_backoff());
    let listener = listener
        .spawn(acceptor, router, session)
        .map_err(ListenerError::Listen)?;
    info!(addr = %listener.local_addr(), "listening");

    // Refresh starts after the listener is up.
    let refresh = catalog_path.map(|path| {
        catalog::refresh_task(
            path.to_path_buf(),
            cfg.catalog_refresh_interval(),
            catalog,
        )
    });

    Ok(RunningServer { listener, refresh })
}
