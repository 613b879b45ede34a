//! Common types, route constants, and errors shared across the media gateway crates.

pub mod error;
pub mod protocol;

pub use error::RequestError;
pub use protocol::{QueryCriteria, QueryResult};
