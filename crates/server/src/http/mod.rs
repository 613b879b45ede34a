//! Minimal HTTP/1.1 message layer used by sessions.
//!
//! # Responsibilities
//!
//! - Split complete requests off the session receive buffer ([`RequestDecoder`]).
//! - Serialise responses, streaming file bodies straight from disk
//!   ([`write_response`]).
//!
//! Only `Content-Length` framing is understood; chunked request bodies are
//! rejected. Bytes past the end of a request stay in the buffer, so a
//! pipelined request is decoded and served after the current response.

pub mod request;
pub mod response;

pub use request::{ProtocolError, Request, RequestDecoder};
pub use response::{write_response, Body, FileBody, Response};
