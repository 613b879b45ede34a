//! Client-side TLS: trust anchors and rustls configuration.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rustls::{ClientConfig, RootCertStore};

/// Read a PEM file of root certificates into a [`RootCertStore`].
///
/// # Errors
///
/// Returns an error if the file cannot be read or holds no usable certificate.
pub fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let pem = std::fs::read(path)
        .with_context(|| format!("failed to read root certificate file {}", path.display()))?;
    root_store_from_pem(&pem)
        .with_context(|| format!("invalid root certificate file {}", path.display()))
}

/// Build a [`RootCertStore`] from PEM-encoded certificates.
///
/// # Errors
///
/// Returns an error if the PEM data cannot be parsed, or contains no
/// certificate rustls accepts as a trust anchor.
pub fn root_store_from_pem(pem: &[u8]) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut std::io::BufReader::new(pem)) {
        let cert = cert.context("failed to parse certificate PEM")?;
        roots
            .add(cert)
            .context("certificate rejected as trust anchor")?;
    }
    if roots.is_empty() {
        anyhow::bail!("no certificate found in PEM data");
    }
    Ok(roots)
}

/// rustls client configuration verifying servers against `roots`.
///
/// # Errors
///
/// Returns an error if the protocol versions cannot be selected.
pub fn client_config(roots: RootCertStore) -> Result<Arc<ClientConfig>> {
    let config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .context("failed to select TLS protocol versions")?
            .with_root_certificates(roots)
            .with_no_client_auth();
    Ok(Arc::new(config))
}
