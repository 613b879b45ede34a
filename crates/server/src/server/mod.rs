//! HTTPS server: listener, per-connection sessions, routing and responders.
//!
//! # Responsibilities
//! - Bind the TCP listener and accept connections until stopped.
//! - Terminate TLS (rustls) and drive each connection's session state machine.
//! - Route each parsed request to the file or query responder.
//!
//! # Module invariants
//! - Sessions share nothing mutable; the [`Router`] is read-only behind an `Arc`.
//! - Files are only ever opened from beneath the configured root.

pub mod files;
pub mod listener;
pub mod query;
pub mod router;
pub mod session;
pub mod tls;

pub use files::FileResponder;
pub use listener::{Listener, ListenerError, ListenerHandle};
pub use query::{QueryEngine, QueryError, QueryResponder};
pub use router::Router;
pub use session::SessionConfig;
