//! Request and response types exchanged between the server and its clients.
//!
//! [`QueryCriteria`] is what a POST body turns into after validation and what
//! the client serialises when it issues a query. [`QueryResult`] is one
//! element of the JSON array the server answers with.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// Target prefix under which files are downloadable.
pub const DOWNLOAD_PREFIX: &str = "/v1/download";

/// Target the client posts metadata queries to. The server accepts any target
/// for POST.
pub const QUERY_PATH: &str = "/v1/unloading";

// ---------------------------------------------------------------------------
// Query request
// ---------------------------------------------------------------------------

/// Validated, typed form of a metadata query.
///
/// `project_id`, `date_from` and `date_to` are mandatory; a body without them
/// is rejected before a `QueryCriteria` is ever built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCriteria {
    pub project_id: String,
    pub date_from: String,
    pub date_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_id: Vec<String>,
}

impl QueryCriteria {
    /// Criteria with only the mandatory fields set.
    pub fn new(
        project_id: impl Into<String>,
        date_from: impl Into<String>,
        date_to: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            date_from: date_from.into(),
            date_to: date_to.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Query result
// ---------------------------------------------------------------------------

/// One recording record returned by a metadata query.
///
/// Every field is optional; only non-empty / non-default fields are written
/// when serialised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default, skip_serializing_if = "is_blank")]
    pub created_utc: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub created_gmt: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub pin: Option<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agent_id: Vec<String>,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub extension_number: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub display: bool,
    #[serde(default, skip_serializing_if = "is_blank")]
    pub absolute_filename: Option<String>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

fn is_false(value: &bool) -> bool {
    !*value
}
