//! In-memory snapshot of recording records.
//!
//! The snapshot sits behind `arc-swap` so queries never block and the refresh
//! task can swap in a complete replacement atomically.

use std::sync::Arc;

use arc_swap::ArcSwap;
use common::{QueryCriteria, QueryResult};

use crate::server::{QueryEngine, QueryError};

/// Shared, lock-free catalog of recording records.
#[derive(Clone, Debug)]
pub struct Catalog {
    inner: Arc<ArcSwap<Vec<QueryResult>>>,
}

impl Catalog {
    /// Create a new, empty [`Catalog`].
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(Arc::new(Vec::new()))),
        }
    }

    /// Return the number of records currently held.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Atomically replace every record.
    pub fn replace_all(&self, records: Vec<QueryResult>) {
        self.inner.store(Arc::new(records));
    }

    /// Records matching `criteria`, in catalog order.
    pub fn matching(&self, criteria: &QueryCriteria) -> Vec<QueryResult> {
        self.inner
            .load()
            .iter()
            .filter(|record| matches(record, criteria))
            .cloned()
            .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEngine for Catalog {
    fn select(&self, criteria: &QueryCriteria) -> Result<Vec<QueryResult>, QueryError> {
        Ok(self.matching(criteria))
    }
}

/// Selection rules:
/// - `project_id` must be equal;
/// - the creation timestamp (`created_utc`, else `created_gmt`) must lie in
///   `[date_from, date_to]`, compared as strings. The upper bound is compared
///   against the timestamp cut to the bound's length, so a date-only
///   `date_to` includes that whole day;
/// - `theme` and `pin` must be equal when the criteria set them;
/// - a non-empty `agent_id` list must share at least one id with the record.
fn matches(record: &QueryResult, criteria: &QueryCriteria) -> bool {
    if record.project_id.as_deref() != Some(criteria.project_id.as_str()) {
        return false;
    }

    let created = record
        .created_utc
        .as_deref()
        .filter(|s| !s.is_empty())
        .or(record.created_gmt.as_deref());
    let Some(created) = created else {
        return false;
    };
    let date_to = criteria.date_to.as_str();
    let created_upto = created.get(..date_to.len()).unwrap_or(created);
    if created < criteria.date_from.as_str() || created_upto > date_to {
        return false;
    }

    if criteria
        .theme
        .as_deref()
        .is_some_and(|theme| record.theme.as_deref() != Some(theme))
    {
        return false;
    }
    if criteria
        .pin
        .as_deref()
        .is_some_and(|pin| record.pin.as_deref() != Some(pin))
    {
        return false;
    }

    criteria.agent_id.is_empty()
        || record
            .agent_id
            .iter()
            .any(|agent| criteria.agent_id.contains(agent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(project: &str, created: &str, agents: &[&str]) -> QueryResult {
        QueryResult {
            project_id: Some(project.into()),
            created_utc: Some(created.into()),
            agent_id: agents.iter().map(|a| a.to_string()).collect(),
            ..QueryResult::default()
        }
    }

    fn seeded() -> Catalog {
        let catalog = Catalog::new();
        catalog.replace_all(vec![
            record("10", "2023-01-05T10:00:00Z", &["a1"]),
            record("10", "2023-03-01T00:00:00Z", &["a2"]),
            record("11", "2023-01-10T00:00:00Z", &["a1"]),
            QueryResult {
                theme: Some("sales".into()),
                pin: Some("42".into()),
                ..record("10", "2023-01-20T00:00:00Z", &["a3"])
            },
        ]);
        catalog
    }

    #[test]
    fn initially_empty() {
        let catalog = Catalog::new();
        assert!(catalog.is_empty());
        assert!(catalog
            .matching(&QueryCriteria::new("10", "2023-01-01", "2023-12-31"))
            .is_empty());
    }

    #[test]
    fn filters_by_project_and_date_range() {
        let hits = seeded().matching(&QueryCriteria::new("10", "2023-01-01", "2023-02-01"));
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|r| r.project_id.as_deref() == Some("10")));
    }

    #[test]
    fn date_to_includes_whole_last_day() {
        let catalog = Catalog::new();
        catalog.replace_all(vec![
            record("10", "2023-02-01T10:00:00Z", &[]),
            record("10", "2023-02-01T23:59:59Z", &[]),
            record("10", "2023-02-02T00:00:00Z", &[]),
        ]);
        let hits = catalog.matching(&QueryCriteria::new("10", "2023-01-01", "2023-02-01"));
        assert_eq!(hits.len(), 2);
        assert!(hits
            .iter()
            .all(|r| r.created_utc.as_deref().is_some_and(|c| c.starts_with("2023-02-01"))));
    }

    #[test]
    fn full_timestamp_bound_is_exact() {
        let catalog = Catalog::new();
        catalog.replace_all(vec![
            record("10", "2023-02-01T10:00:00Z", &[]),
            record("10", "2023-02-01T12:00:00Z", &[]),
        ]);
        let hits =
            catalog.matching(&QueryCriteria::new("10", "2023-01-01", "2023-02-01T10:00:00Z"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].created_utc.as_deref(), Some("2023-02-01T10:00:00Z"));
    }

    #[test]
    fn filters_by_theme_and_pin() {
        let criteria = QueryCriteria {
            theme: Some("sales".into()),
            pin: Some("42".into()),
            ..QueryCriteria::new("10", "2023-01-01", "2023-12-31")
        };
        let hits = seeded().matching(&criteria);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].agent_id, vec!["a3"]);
    }

    #[test]
    fn filters_by_agent_intersection() {
        let criteria = QueryCriteria {
            agent_id: vec!["a2".into(), "zz".into()],
            ..QueryCriteria::new("10", "2023-01-01", "2023-12-31")
        };
        let hits = seeded().matching(&criteria);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].created_utc.as_deref(), Some("2023-03-01T00:00:00Z"));
    }

    #[test]
    fn falls_back_to_created_gmt() {
        let catalog = Catalog::new();
        catalog.replace_all(vec![QueryResult {
            project_id: Some("10".into()),
            created_gmt: Some("2023-01-15".into()),
            ..QueryResult::default()
        }]);
        assert_eq!(
            catalog
                .matching(&QueryCriteria::new("10", "2023-01-01", "2023-02-01"))
                .len(),
            1
        );
    }

    #[test]
    fn replace_all_is_atomic() {
        let catalog = seeded();
        catalog.replace_all(vec![record("99", "2023-01-01", &[])]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog
            .select(&QueryCriteria::new("10", "2023-01-01", "2023-12-31"))
            .unwrap()
            .is_empty());
    }
}
