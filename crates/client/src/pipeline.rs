//! Single-shot HTTPS request pipeline.
//!
//! Every call runs the full sequence on a fresh connection:
//! resolve -> connect -> TLS handshake -> write request -> read response -> close.
//! Each step has its own deadline and its own [`TransportError`] variant.
//! Nothing is retried and no connection is reused.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use common::protocol::{DOWNLOAD_PREFIX, QUERY_PATH};
use common::{QueryCriteria, QueryResult};
use http::header::{CONNECTION, CONTENT_TYPE, HOST};
use http::{Method, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::ClientConfig;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::TransportError;
use crate::tls;

/// Fully read response to a [`HttpsClient::request`] call.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl ClientResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// An HTTP/1.1 exchange in flight: the response head plus the task driving
/// the connection.
struct Exchange {
    response: hyper::Response<Incoming>,
    connection: JoinHandle<()>,
}

/// HTTPS client for the media server.
///
/// Cheap to clone; holds no connection between calls.
#[derive(Clone)]
pub struct HttpsClient {
    connector: TlsConnector,
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    timeout: Duration,
}

impl HttpsClient {
    /// Build a client from configuration, loading the trust anchors.
    ///
    /// # Errors
    ///
    /// Returns an error if the root certificate file cannot be loaded or the
    /// server name is invalid.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let roots = tls::load_root_store(Path::new(&cfg.root_ca_path))?;
        let tls_config = tls::client_config(roots)?;
        Self::new(
            cfg.server_host.clone(),
            cfg.server_port,
            cfg.server_name(),
            tls_config,
            cfg.timeout(),
        )
    }

    /// # Errors
    ///
    /// Returns an error if `server_name` is not a valid DNS name or IP address.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        server_name: &str,
        tls_config: Arc<ClientConfig>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let server_name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| anyhow::anyhow!("invalid server name {server_name:?}: {e}"))?;
        Ok(Self {
            connector: TlsConnector::from(tls_config),
            host: host.into(),
            port,
            server_name,
            timeout,
        })
    }

    /// Send one request and read the whole response.
    ///
    /// Any status is returned as `Ok`; only transport failures are errors.
    pub async fn request(
        &self,
        method: Method,
        target: &str,
        body: Option<String>,
    ) -> Result<ClientResponse, TransportError> {
        let Exchange {
            response,
            connection,
        } = self.exchange(method, target, body).await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let mut body = response.into_body();
        let mut collected = BytesMut::new();
        while let Some(chunk) = self.next_chunk(&mut body).await? {
            collected.extend_from_slice(&chunk);
        }
        self.finish(connection).await;

        Ok(ClientResponse {
            status,
            content_type,
            body: collected.freeze(),
        })
    }

    /// Download `<prefix><remote_path>` into `destination`.
    ///
    /// `destination` must not exist yet. It is removed again if the status is
    /// not 200 or any step fails, so a failed download never leaves a file
    /// behind. Returns the number of bytes written.
    pub async fn download(
        &self,
        remote_path: &str,
        destination: &Path,
    ) -> Result<u64, TransportError> {
        let target = download_target(remote_path);
        let mut created = false;
        let result = self.download_into(&target, destination, &mut created).await;
        match &result {
            Ok(bytes) => {
                info!(%target, destination = %destination.display(), bytes, "download complete")
            }
            Err(e) => {
                warn!(%target, error = %e, "download failed");
                if created {
                    if let Err(rm) = tokio::fs::remove_file(destination).await {
                        warn!(
                            destination = %destination.display(),
                            error = %rm,
                            "failed to remove partial download"
                        );
                    }
                }
            }
        }
        result
    }

    async fn download_into(
        &self,
        target: &str,
        destination: &Path,
        created: &mut bool,
    ) -> Result<u64, TransportError> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .await
            .map_err(TransportError::File)?;
        *created = true;

        let Exchange {
            response,
            connection,
        } = self.exchange(Method::GET, target, None).await?;

        let status = response.status();
        let mut body = response.into_body();
        if status != StatusCode::OK {
            let mut text = BytesMut::new();
            while let Some(chunk) = self.next_chunk(&mut body).await? {
                text.extend_from_slice(&chunk);
            }
            self.finish(connection).await;
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&text).into_owned(),
            });
        }

        let mut written = 0u64;
        while let Some(chunk) = self.next_chunk(&mut body).await? {
            file.write_all(&chunk).await.map_err(TransportError::File)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(TransportError::File)?;
        self.finish(connection).await;
        Ok(written)
    }

    /// POST `criteria` to the query path and decode the result list.
    pub async fn query(
        &self,
        criteria: &QueryCriteria,
    ) -> Result<Vec<QueryResult>, TransportError> {
        let body = serde_json::to_string(criteria)?;
        let response = self.request(Method::POST, QUERY_PATH, Some(body)).await?;
        if response.status != StatusCode::OK {
            return Err(TransportError::Status {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }
        let results: Vec<QueryResult> = serde_json::from_slice(&response.body)?;
        debug!(count = results.len(), "query answered");
        Ok(results)
    }

    async fn exchange(
        &self,
        method: Method,
        target: &str,
        body: Option<String>,
    ) -> Result<Exchange, TransportError> {
        let tcp = self.connect().await?;

        let tls = self
            .step("handshake", self.connector.connect(self.server_name.clone(), tcp))
            .await?
            .map_err(TransportError::Handshake)?;

        let (mut sender, conn) = http1::handshake(TokioIo::new(tls))
            .await
            .map_err(TransportError::Exchange)?;
        let connection = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "connection closed with error");
            }
        });

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(target)
            .header(HOST, self.authority())
            .header(CONNECTION, "close");
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let request = builder.body(body.unwrap_or_default())?;

        let response = self
            .step("request", sender.send_request(request))
            .await?
            .map_err(TransportError::Exchange)?;
        debug!(%target, status = response.status().as_u16(), "response received");

        Ok(Exchange {
            response,
            connection,
        })
    }

    /// `host:port` for the `Host` header, bracketing IPv6 literals.
    fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let addrs = self
            .step("resolve", tokio::net::lookup_host((self.host.as_str(), self.port)))
            .await?
            .map_err(|source| TransportError::Resolve {
                host: self.host.clone(),
                port: self.port,
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            match self.step("connect", TcpStream::connect(addr)).await? {
                Ok(tcp) => {
                    debug!(%addr, "connected");
                    return Ok(tcp);
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => TransportError::Connect(e),
            None => TransportError::NoAddress {
                host: self.host.clone(),
                port: self.port,
            },
        })
    }

    async fn next_chunk(&self, body: &mut Incoming) -> Result<Option<Bytes>, TransportError> {
        loop {
            let Some(frame) = self.step("read", body.frame()).await? else {
                return Ok(None);
            };
            if let Ok(data) = frame.map_err(TransportError::Body)?.into_data() {
                return Ok(Some(data));
            }
        }
    }

    /// Wait for the connection task to finish its shutdown.
    async fn finish(&self, connection: JoinHandle<()>) {
        if tokio::time::timeout(self.timeout, connection).await.is_err() {
            debug!("connection did not close before the deadline");
        }
    }

    async fn step<F: Future>(
        &self,
        name: &'static str,
        future: F,
    ) -> Result<F::Output, TransportError> {
        tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| TransportError::Timeout(name))
    }
}

fn download_target(remote_path: &str) -> String {
    format!("{DOWNLOAD_PREFIX}/{}", remote_path.trim_start_matches('/'))
}
