//! TLS-terminating HTTP/1.1 server for recordings: streams files under a
//! configured root and answers JSON metadata queries.

pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod http;
pub mod server;
pub mod telemetry;

pub use bootstrap::{start, BootstrapError, RunningServer};
pub use config::Config;
