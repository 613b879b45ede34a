//! Recording catalog backing metadata queries.
//!
//! # Responsibilities
//!
//! - Load the catalog file (a YAML or JSON sequence of records) at startup.
//! - Reload it on a fixed interval, keeping the previous snapshot when a
//!   reload fails.
//! - Answer queries from the current snapshot via [`QueryEngine`](crate::server::QueryEngine).

pub mod store;

pub use store::Catalog;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use common::QueryResult;
use tokio::time;
use tracing::{info, warn};

/// Parse catalog text as YAML, falling back to JSON.
///
/// # Errors
///
/// Returns an error if the text is neither a YAML nor a JSON sequence of records.
pub fn parse(text: &str) -> Result<Vec<QueryResult>> {
    if let Ok(records) = serde_yaml::from_str(text) {
        Ok(records)
    } else if let Ok(records) = serde_json::from_str(text) {
        Ok(records)
    } else {
        anyhow::bail!("catalog is not a valid YAML or JSON list of records");
    }
}

/// Read the catalog file at `path` and atomically replace `catalog`'s contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed; `catalog` is left
/// unchanged in that case.
pub async fn load(path: &Path, catalog: &Catalog) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let records =
        parse(&text).with_context(|| format!("failed to parse catalog {}", path.display()))?;

    catalog.replace_all(records);
    info!(path = %path.display(), records = catalog.len(), "catalog loaded");
    Ok(())
}

/// Spawn a background task that periodically reloads the catalog.
///
/// On failure the previous snapshot is retained and a warning is emitted.
pub fn refresh_task(
    path: PathBuf,
    interval: Duration,
    catalog: Catalog,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        // First tick fires immediately; startup already loaded once.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = load(&path, &catalog).await {
                warn!(error = %e, "catalog refresh failed; retaining previous snapshot");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
- project_id: "10"
  created_utc: "2023-01-05T10:00:00Z"
  agent_id: [a1, a2]
  absolute_filename: /srv/recordings/2023/01/05/call.mp3
  display: true
- project_id: "11"
  created_gmt: "2023-01-06T10:00:00Z"
"#;

    #[test]
    fn parses_yaml() {
        let records = parse(YAML).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agent_id, vec!["a1", "a2"]);
        assert!(records[0].display);
        assert_eq!(records[1].created_gmt.as_deref(), Some("2023-01-06T10:00:00Z"));
    }

    #[test]
    fn parses_json() {
        let records = parse(r#"[{"project_id":"10","pin":"7"}]"#).unwrap();
        assert_eq!(records[0].pin.as_deref(), Some("7"));
    }

    #[test]
    fn rejects_non_sequence() {
        assert!(parse("project_id: 10").is_err());
    }

    #[tokio::test]
    async fn load_replaces_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, YAML).unwrap();

        let catalog = Catalog::new();
        load(&path, &catalog).await.unwrap();
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yaml");
        std::fs::write(&path, YAML).unwrap();

        let catalog = Catalog::new();
        load(&path, &catalog).await.unwrap();

        std::fs::write(&path, "{ not: [valid").unwrap();
        assert!(load(&path, &catalog).await.is_err());
        assert_eq!(catalog.len(), 2);

        assert!(load(&dir.path().join("missing.yaml"), &catalog).await.is_err());
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn refresh_task_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, "[]").unwrap();

        let catalog = Catalog::new();
        load(&path, &catalog).await.unwrap();
        assert!(catalog.is_empty());

        std::fs::write(&path, r#"[{"project_id":"1"}]"#).unwrap();
        let task = refresh_task(path, Duration::from_millis(20), catalog.clone());

        let mut waited = Duration::ZERO;
        while catalog.is_empty() && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(10)).await;
            waited += Duration::from_millis(10);
        }
        task.abort();
        assert_eq!(catalog.len(), 1);
    }
}
