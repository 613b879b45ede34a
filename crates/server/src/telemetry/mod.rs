//! Structured logging and optional OpenTelemetry span export.
//!
//! # Telemetry invariants
//!
//! - Request bodies and file contents never appear in span attributes or log
//!   fields; only targets, statuses, sizes and error messages do.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden by
//!   `RUST_LOG` when set.

pub mod init;

pub use init::init_telemetry;
