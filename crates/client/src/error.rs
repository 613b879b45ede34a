//! Failures of a single client request.

use std::io;

use thiserror::Error;

/// The step of the request pipeline that failed, with the underlying cause.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("{host}:{port} resolved to no addresses")]
    NoAddress { host: String, port: u16 },

    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[error("request exchange failed: {0}")]
    Exchange(#[source] hyper::Error),

    #[error("failed to read response body: {0}")]
    Body(#[source] hyper::Error),

    #[error("{0} deadline elapsed")]
    Timeout(&'static str),

    #[error("server answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("destination file error: {0}")]
    File(#[source] io::Error),

    #[error("response is not a valid result list: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    /// HTTP status of a non-success response, if that is what failed.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
