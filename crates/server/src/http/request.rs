//! Incremental HTTP/1.1 request decoding.
//!
//! A [`RequestDecoder`] consumes bytes from the session's receive buffer and
//! yields one complete [`Request`] at a time. Bytes belonging to a following
//! message stay in the buffer.

use bytes::{Bytes, BytesMut};
use http::{Method, Version};
use thiserror::Error;

/// Maximum number of header lines parsed per request.
const MAX_HEADERS: usize = 64;

/// Largest accepted request head (request line plus headers), in bytes.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Framing violations. All of them end the session without a response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    HeadTooLarge,

    #[error("request body of {len} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { len: usize, limit: usize },

    #[error("invalid Content-Length header")]
    InvalidContentLength,

    #[error("unsupported HTTP version")]
    UnsupportedVersion,

    #[error("invalid method token")]
    InvalidMethod,

    #[error("Transfer-Encoding is not supported")]
    UnsupportedTransferEncoding,
}

/// One parsed HTTP request.
///
/// Only the headers the router consults are kept: `Host` and the
/// keep-alive decision derived from `Connection` and the protocol version.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub host: Option<String>,
    pub keep_alive: bool,
    pub body: Bytes,
}

impl Request {
    /// Target without query string or fragment.
    pub fn path(&self) -> &str {
        self.target
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
    }
}

/// Owned view of a parsed request head; decoupled from the buffer it was
/// parsed from so the buffer can be split afterwards.
struct Head {
    len: usize,
    method: Method,
    target: String,
    version: Version,
    host: Option<String>,
    connection: Option<String>,
    content_length: usize,
}

/// Splits complete requests off a receive buffer.
#[derive(Debug, Clone)]
pub struct RequestDecoder {
    max_body_bytes: usize,
}

impl RequestDecoder {
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    /// Try to decode one request from the front of `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed. On success the request's
    /// bytes are removed from `src`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the bytes cannot form a valid request.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>, ProtocolError> {
        let Some(head) = parse_head(src)? else {
            if src.len() > MAX_HEAD_BYTES {
                return Err(ProtocolError::HeadTooLarge);
            }
            return Ok(None);
        };

        if head.content_length > self.max_body_bytes {
            return Err(ProtocolError::BodyTooLarge {
                len: head.content_length,
                limit: self.max_body_bytes,
            });
        }
        if src.len() < head.len + head.content_length {
            return Ok(None);
        }

        let _ = src.split_to(head.len);
        let body = src.split_to(head.content_length).freeze();
        let keep_alive = keep_alive(head.version, head.connection.as_deref());

        Ok(Some(Request {
            method: head.method,
            target: head.target,
            version: head.version,
            host: head.host,
            keep_alive,
            body,
        }))
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

fn parse_head(src: &[u8]) -> Result<Option<Head>, ProtocolError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    let len = match req.parse(src)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };
    if len > MAX_HEAD_BYTES {
        return Err(ProtocolError::HeadTooLarge);
    }

    let method = req
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or(ProtocolError::InvalidMethod)?;
    let version = match req.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Err(ProtocolError::UnsupportedVersion),
    };
    let target = req.path.unwrap_or("/").to_owned();

    let mut host = None;
    let mut connection = None;
    let mut content_length: Option<usize> = None;
    for header in req.headers.iter() {
        let value = String::from_utf8_lossy(header.value).trim().to_owned();
        if header.name.eq_ignore_ascii_case("host") {
            host = Some(value);
        } else if header.name.eq_ignore_ascii_case("connection") {
            connection = Some(value);
        } else if header.name.eq_ignore_ascii_case("transfer-encoding") {
            return Err(ProtocolError::UnsupportedTransferEncoding);
        } else if header.name.eq_ignore_ascii_case("content-length") {
            let parsed: usize = value
                .parse()
                .map_err(|_| ProtocolError::InvalidContentLength)?;
            if content_length.is_some_and(|prev| prev != parsed) {
                return Err(ProtocolError::InvalidContentLength);
            }
            content_length = Some(parsed);
        }
    }

    Ok(Some(Head {
        len,
        method,
        target,
        version,
        host,
        connection,
        content_length: content_length.unwrap_or(0),
    }))
}

/// HTTP/1.1 defaults to persistent connections, HTTP/1.0 to closing them;
/// an explicit `Connection` token overrides either.
fn keep_alive(version: Version, connection: Option<&str>) -> bool {
    let tokens = connection.unwrap_or_default();
    let has = |token: &str| {
        tokens
            .split(',')
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    };
    if has("close") {
        false
    } else if has("keep-alive") {
        true
    } else {
        version == Version::HTTP_11
    }
}
