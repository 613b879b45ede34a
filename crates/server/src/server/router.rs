//! Method dispatch for parsed requests.

use common::RequestError;
use http::Method;
use tracing::{info, warn};

use super::files::FileResponder;
use super::query::QueryResponder;
use crate::http::{Request, Response};

/// Routes a request to the responder for its method.
///
/// | method | responder |
/// |---|---|
/// | `GET` | [`FileResponder`] |
/// | `POST` | [`QueryResponder`], any target |
/// | other | 400 `Unknown HTTP-method` |
///
/// Routing never touches session state; one `Router` is shared by every
/// session behind an `Arc`.
#[derive(Clone)]
pub struct Router {
    files: FileResponder,
    queries: QueryResponder,
}

impl Router {
    pub fn new(files: FileResponder, queries: QueryResponder) -> Self {
        Self { files, queries }
    }

    pub fn route(&self, req: &Request) -> Response {
        let response = match req.method {
            Method::GET => self.files.serve(req),
            Method::POST => self.queries.handle(req),
            _ => {
                warn!(method = %req.method, target = %req.target, "unsupported method");
                Response::from_error(&RequestError::UnknownMethod, req.version)
            }
        };
        info!(
            method = %req.method,
            target = %req.target,
            status = response.status.as_u16(),
            bytes = response.content_length(),
            "request routed"
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Body;
    use crate::server::query::MockQueryEngine;
    use http::{StatusCode, Version};
    use std::sync::Arc;

    fn router(dir: &tempfile::TempDir) -> Router {
        std::fs::write(dir.path().join("clip.mp4"), b"clip").unwrap();
        let mut engine = MockQueryEngine::new();
        engine.expect_select().returning(|_| Ok(Vec::new()));
        Router::new(
            FileResponder::new(dir.path(), "/v1/download").unwrap(),
            QueryResponder::new(Arc::new(engine)),
        )
    }

    fn request(method: Method, target: &str, body: &str) -> Request {
        Request {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            keep_alive: true,
            body: body.to_owned().into(),
            ..Request::default()
        }
    }

    #[test]
    fn get_goes_to_files() {
        let dir = tempfile::tempdir().unwrap();
        let resp = router(&dir).route(&request(Method::GET, "/v1/download/clip.mp4", ""));
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.content_type, "video/mp4");
    }

    #[test]
    fn post_goes_to_query_on_any_target() {
        let dir = tempfile::tempdir().unwrap();
        let resp = router(&dir).route(&request(
            Method::POST,
            "/anything",
            r#"{"project_id":"1","date_from":"a","date_to":"b"}"#,
        ));
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.content_type, "application/json");
    }

    #[test]
    fn other_methods_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for method in [Method::PUT, Method::DELETE, Method::HEAD] {
            let resp = router(&dir).route(&request(method, "/v1/download/clip.mp4", ""));
            assert_eq!(resp.status, StatusCode::BAD_REQUEST);
            assert!(!resp.keep_alive);
            match resp.body {
                Body::Text(text) => assert_eq!(text, "An error occurred: 'Unknown HTTP-method'"),
                Body::File(_) => panic!("expected text body"),
            }
        }
    }
}
