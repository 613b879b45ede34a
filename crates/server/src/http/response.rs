//! HTTP responses and their serialisation onto the stream.
//!
//! `Content-Length` is never stored separately: it is always derived from the
//! body, so the header cannot disagree with the bytes that follow it.

use std::io;

use http::{StatusCode, Version};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use common::RequestError;

/// Value of the `Server` header on every response.
pub const SERVER_NAME: &str = concat!("media-server/", env!("CARGO_PKG_VERSION"));

/// An open file and the number of bytes to stream from it.
#[derive(Debug)]
pub struct FileBody {
    file: std::fs::File,
    len: u64,
}

impl FileBody {
    /// Wrap an open file, taking its length from the file metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    pub fn new(file: std::fs::File) -> io::Result<Self> {
        let len = file.metadata()?.len();
        Ok(Self { file, len })
    }

    pub fn size(&self) -> u64 {
        self.len
    }
}

/// Response payload.
#[derive(Debug)]
pub enum Body {
    Text(String),
    File(FileBody),
}

/// An HTTP response ready to be written by the session.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub version: Version,
    pub content_type: &'static str,
    pub keep_alive: bool,
    pub body: Body,
}

impl Response {
    pub fn text(
        status: StatusCode,
        version: Version,
        content_type: &'static str,
        body: String,
        keep_alive: bool,
    ) -> Self {
        Self {
            status,
            version,
            content_type,
            keep_alive,
            body: Body::Text(body),
        }
    }

    pub fn file(
        version: Version,
        content_type: &'static str,
        body: FileBody,
        keep_alive: bool,
    ) -> Self {
        Self {
            status: StatusCode::OK,
            version,
            content_type,
            keep_alive,
            body: Body::File(body),
        }
    }

    /// Error response: HTML body `An error occurred: '<reason>'`, connection
    /// closed after the write.
    pub fn error(status: StatusCode, reason: &str, version: Version) -> Self {
        Self::text(
            status,
            version,
            "text/html",
            format!("An error occurred: '{reason}'"),
            false,
        )
    }

    /// Error response for a rejected request, status taken from the error kind.
    pub fn from_error(err: &RequestError, version: Version) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::error(status, &err.to_string(), version)
    }

    pub fn content_length(&self) -> u64 {
        match &self.body {
            Body::Text(text) => text.len() as u64,
            Body::File(file) => file.size(),
        }
    }

    /// Serialised status line and headers, including the terminating blank line.
    pub fn head(&self) -> String {
        let version = match self.version {
            Version::HTTP_10 => "HTTP/1.0",
            _ => "HTTP/1.1",
        };
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        format!(
            "{version} {} {}\r\n\
             Server: {SERVER_NAME}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Connection: {connection}\r\n\r\n",
            self.status.as_u16(),
            self.status.canonical_reason().unwrap_or_default(),
            self.content_type,
            self.content_length(),
        )
    }
}

/// Write `response` to `writer` and flush. Returns the number of body bytes sent.
///
/// File bodies are streamed; they are never read into memory as a whole.
///
/// # Errors
///
/// Returns an error on any write failure, or if a file yields fewer bytes than
/// the advertised `Content-Length`.
pub async fn write_response<W>(writer: &mut W, response: Response) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let expected = response.content_length();
    writer.write_all(response.head().as_bytes()).await?;

    let sent = match response.body {
        Body::Text(text) => {
            writer.write_all(text.as_bytes()).await?;
            expected
        }
        Body::File(FileBody { file, len }) => {
            let mut reader = tokio::fs::File::from_std(file).take(len);
            tokio::io::copy(&mut reader, writer).await?
        }
    };
    if sent != expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("file ended after {sent} of {expected} bytes"),
        ));
    }

    writer.flush().await?;
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, Write};

    #[test]
    fn error_body_and_headers() {
        let resp = Response::from_error(&RequestError::EmptyJson, Version::HTTP_11);
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert!(!resp.keep_alive);
        assert_eq!(resp.content_type, "text/html");
        match &resp.body {
            Body::Text(text) => assert_eq!(text, "An error occurred: 'Empty json'"),
            Body::File(_) => panic!("expected text body"),
        }
    }

    #[test]
    fn not_found_reason_is_target() {
        let target = "/v1/download/nope.mp4";
        let resp = Response::from_error(&RequestError::NotFound(target.into()), Version::HTTP_11);
        assert_eq!(resp.status, StatusCode::NOT_FOUND);
        let expected = format!("An error occurred: '{target}'");
        assert_eq!(resp.content_length(), expected.len() as u64);
    }

    #[test]
    fn head_reflects_version_and_keep_alive() {
        let resp = Response::text(
            StatusCode::OK,
            Version::HTTP_10,
            "application/json",
            "[]".into(),
            true,
        );
        let head = resp.head();
        assert!(head.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(head.contains("Connection: keep-alive\r\n"));
        assert!(head.contains("Content-Length: 2\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn writes_text_response() {
        let resp = Response::text(
            StatusCode::OK,
            Version::HTTP_11,
            "application/json",
            "[1]".into(),
            true,
        );
        let mut out = Vec::new();
        let sent = write_response(&mut out, resp).await.unwrap();
        assert_eq!(sent, 3);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\n[1]"));
    }

    #[tokio::test]
    async fn streams_file_body() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"0123456789").unwrap();
        file.rewind().unwrap();

        let body = FileBody::new(file).unwrap();
        assert_eq!(body.size(), 10);
        let resp = Response::file(Version::HTTP_11, "video/mp4", body, true);

        let mut out = Vec::new();
        let sent = write_response(&mut out, resp).await.unwrap();
        assert_eq!(sent, 10);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Type: video/mp4\r\n"));
        assert!(text.contains("Content-Length: 10\r\n"));
        assert!(text.ends_with("\r\n\r\n0123456789"));
    }
}
