//! Persisted longest busy duration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyRecord {
    pub busy_ms: u64,
    pub command: String,
    pub recorded_at: DateTime<Utc>,
}

impl BusyRecord {
    pub fn busy(&self) -> Duration {
        Duration::from_millis(self.busy_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordFile {
    #[serde(default)]
    longest: Option<BusyRecord>,
}

/// JSON-file store for the longest observed busy cycle.
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record. A missing file is not an error.
    pub fn load(&self) -> Result<Option<BusyRecord>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let file: RecordFile = serde_json::from_str(&contents)
                    .with_context(|| format!("Invalid record file {}", self.path.display()))?;
                Ok(file.longest)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read record file {}", self.path.display())),
        }
    }

    /// Persist `busy` as the new longest cycle.
    pub fn save(&self, busy: Duration, command: &str) -> Result<BusyRecord> {
        let record = BusyRecord {
            busy_ms: u64::try_from(busy.as_millis()).unwrap_or(u64::MAX),
            command: command.to_string(),
            recorded_at: Utc::now(),
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = RecordFile {
            longest: Some(record.clone()),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to encode record")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write record file {}", self.path.display()))?;

        debug!("Saved busy record {:?} to {}", busy, self.path.display());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> RecordStore {
        let dir = std::env::temp_dir().join(format!(
            "autoprompt-records-{}-{}",
            name,
            uuid::Uuid::new_v4()
        ));
        RecordStore::new(dir.join("records.json"))
    }

    #[test]
    fn test_load_missing_is_none() {
        let store = temp_store("missing");
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let store = temp_store("save");
        let saved = store.save(Duration::from_millis(4321), "claude").unwrap();

        let loaded = store.load().unwrap().expect("record present");
        assert_eq!(loaded, saved);
        assert_eq!(loaded.busy(), Duration::from_millis(4321));
        assert_eq!(loaded.command, "claude");

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let store = temp_store("corrupt");
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(format!("{err:#}").contains("Invalid record file"));

        let _ = std::fs::remove_dir_all(store.path().parent().unwrap());
    }
}
