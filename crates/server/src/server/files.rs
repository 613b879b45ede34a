//! `GET <prefix>/<name>`: stream a file from the served root.

use std::io;
use std::path::{Path, PathBuf};

use common::RequestError;
use tracing::{debug, warn};

use crate::http::{FileBody, Request, Response};

/// Content type for a served file, chosen by extension (case-insensitive).
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        _ => "application/text",
    }
}

/// Resolves download targets against a fixed root directory.
///
/// Every resolved path is canonicalised and must stay under the canonical
/// root; targets escaping it via `..` or symlinks are reported as not found.
#[derive(Debug, Clone)]
pub struct FileResponder {
    root: PathBuf,
    prefix: String,
}

impl FileResponder {
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or is not a directory.
    pub fn new(root: impl AsRef<Path>, prefix: impl Into<String>) -> io::Result<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }
        Ok(Self {
            root,
            prefix: prefix.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn serve(&self, req: &Request) -> Response {
        match self.open(req.path()) {
            Ok((body, content_type)) => {
                debug!(target = %req.target, bytes = body.size(), "serving file");
                Response::file(req.version, content_type, body, req.keep_alive)
            }
            Err(err) => {
                warn!(target = %req.target, error = %err, "file request rejected");
                Response::from_error(&err, req.version)
            }
        }
    }

    fn open(&self, path: &str) -> Result<(FileBody, &'static str), RequestError> {
        let not_found = || RequestError::NotFound(path.to_owned());

        let resolved = self.resolve(path).ok_or_else(not_found)?;
        let name = resolved
            .strip_prefix(&self.root)
            .unwrap_or(&resolved)
            .display()
            .to_string();
        let file = std::fs::File::open(&resolved)
            .and_then(FileBody::new)
            .map_err(|_| RequestError::CannotOpen(name))?;

        Ok((file, content_type_for(&resolved)))
    }

    /// Canonical path of an existing regular file under the root, if `path`
    /// names one.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let rest = path.strip_prefix(&self.prefix)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        let relative = rest.trim_start_matches('/');
        if relative.is_empty() {
            return None;
        }

        let canonical = std::fs::canonicalize(self.root.join(relative)).ok()?;
        (canonical.starts_with(&self.root) && canonical.is_file()).then_some(canonical)
    }
}
