//! Synchronous facade over [`HttpsClient`].

use std::io;
use std::path::Path;

use common::{QueryCriteria, QueryResult};
use http::Method;
use tokio::runtime::{Builder, Runtime};

use crate::error::TransportError;
use crate::pipeline::{ClientResponse, HttpsClient};

/// Runs each call to completion on a private current-thread runtime.
///
/// Must not be used from inside another Tokio runtime.
pub struct BlockingClient {
    inner: HttpsClient,
    runtime: Runtime,
}

impl BlockingClient {
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be created.
    pub fn new(inner: HttpsClient) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn request(
        &self,
        method: Method,
        target: &str,
        body: Option<String>,
    ) -> Result<ClientResponse, TransportError> {
        self.runtime.block_on(self.inner.request(method, target, body))
    }

    pub fn download(&self, remote_path: &str, destination: &Path) -> Result<u64, TransportError> {
        self.runtime.block_on(self.inner.download(remote_path, destination))
    }

    pub fn query(&self, criteria: &QueryCriteria) -> Result<Vec<QueryResult>, TransportError> {
        self.runtime.block_on(self.inner.query(criteria))
    }
}
