//! `POST <any>`: validate a JSON query body and answer with matching records.

use std::sync::Arc;

use common::{QueryCriteria, QueryResult, RequestError};
use http::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::http::{Request, Response};

/// Failure inside a [`QueryEngine`].
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query backend unavailable: {0}")]
    Unavailable(String),
}

/// Turns validated criteria into result records.
#[cfg_attr(test, mockall::automock)]
pub trait QueryEngine: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the backend cannot answer.
    fn select(&self, criteria: &QueryCriteria) -> Result<Vec<QueryResult>, QueryError>;
}

const REQUIRED_KEYS: [&str; 3] = ["project_id", "date_from", "date_to"];

/// Validate a request body and build criteria from it.
///
/// Checks run in a fixed order so the first violation decides the message:
/// JSON syntax, object shape, emptiness, required keys, then value types.
/// Unknown keys are ignored.
///
/// # Errors
///
/// Returns the [`RequestError`] describing the first violation.
pub fn parse_criteria(body: &[u8]) -> Result<QueryCriteria, RequestError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| RequestError::NotJson)?;
    let Value::Object(object) = value else {
        return Err(RequestError::NotObject);
    };
    if object.is_empty() {
        return Err(RequestError::EmptyJson);
    }
    if let Some(missing) = REQUIRED_KEYS.into_iter().find(|k| !object.contains_key(*k)) {
        return Err(RequestError::MissingField(missing));
    }

    let date_from = required_string(&object, "date_from")?;
    let date_to = required_string(&object, "date_to")?;
    let theme = optional_string(&object, "theme")?;
    let pin = optional_string(&object, "pin")?;
    let project_id = required_string(&object, "project_id")?;
    let agent_id = string_array(&object, "agent_id")?;

    Ok(QueryCriteria {
        project_id,
        date_from,
        date_to,
        theme,
        pin,
        agent_id,
    })
}

fn required_string(object: &Map<String, Value>, key: &'static str) -> Result<String, RequestError> {
    optional_string(object, key)?.ok_or(RequestError::MissingField(key))
}

fn optional_string(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, RequestError> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RequestError::WrongType {
            field: key,
            expected: "string",
        }),
    }
}

fn string_array(
    object: &Map<String, Value>,
    key: &'static str,
) -> Result<Vec<String>, RequestError> {
    let wrong_type = || RequestError::WrongType {
        field: key,
        expected: "array of strings",
    };
    match object.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or_else(wrong_type))
            .collect(),
        Some(_) => Err(wrong_type()),
    }
}

/// Answers metadata queries through a shared [`QueryEngine`].
#[derive(Clone)]
pub struct QueryResponder {
    engine: Arc<dyn QueryEngine>,
}

impl QueryResponder {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    pub fn handle(&self, req: &Request) -> Response {
        match self.answer(&req.body) {
            Ok(json) => Response::text(
                StatusCode::OK,
                req.version,
                "application/json",
                json,
                req.keep_alive,
            ),
            Err(err) => {
                warn!(target = %req.target, error = %err, "query rejected");
                Response::from_error(&err, req.version)
            }
        }
    }

    fn answer(&self, body: &[u8]) -> Result<String, RequestError> {
        let criteria = parse_criteria(body)?;
        let results = self.engine.select(&criteria).map_err(|e| {
            error!(error = %e, project_id = %criteria.project_id, "query engine failed");
            RequestError::QueryFailed(e.to_string())
        })?;
        debug!(project_id = %criteria.project_id, count = results.len(), "query answered");
        serde_json::to_string(&results).map_err(|e| RequestError::QueryFailed(e.to_string()))
    }
}
