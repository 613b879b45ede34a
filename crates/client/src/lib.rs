//! HTTPS client for the media server: file downloads and metadata queries,
//! one fresh TLS connection per call.

pub mod blocking;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod telemetry;
pub mod tls;

pub use blocking::BlockingClient;
pub use config::Config;
pub use error::TransportError;
pub use pipeline::{ClientResponse, HttpsClient};
