//! Application-level request errors shared across crates.

use thiserror::Error;

/// Reasons a request is answered with an error response instead of content.
///
/// The [`Display`](std::fmt::Display) text is the reason string placed in the
/// response body (`An error occurred: '<reason>'`). Variants map to HTTP
/// status codes:
/// - [`RequestError::NotFound`] → 404
/// - [`RequestError::CannotOpen`] → 500
/// - [`RequestError::QueryFailed`] → 500
/// - everything else → 400
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The method is neither GET nor POST.
    #[error("Unknown HTTP-method")]
    UnknownMethod,

    /// The requested file does not exist or lies outside the served root.
    /// Carries the request target.
    #[error("{0}")]
    NotFound(String),

    /// The file exists but could not be opened for reading.
    #[error("Can't open file: '{0}'")]
    CannotOpen(String),

    /// The POST body could not be parsed as JSON.
    #[error("Body is not json")]
    NotJson,

    /// The POST body is valid JSON but not an object.
    #[error("Body is not a json object")]
    NotObject,

    /// The POST body is an empty JSON object.
    #[error("Empty json")]
    EmptyJson,

    /// A mandatory query key is absent.
    #[error("Without {0}")]
    MissingField(&'static str),

    /// A recognised key holds a value of the wrong JSON type.
    #[error("{field} - must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    /// The query engine failed to produce results.
    #[error("Query failed")]
    QueryFailed(String),
}

impl RequestError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            RequestError::NotFound(_) => 404,
            RequestError::CannotOpen(_) | RequestError::QueryFailed(_) => 500,
            _ => 400,
        }
    }
}
