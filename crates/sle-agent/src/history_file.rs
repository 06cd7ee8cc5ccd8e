//! JSON-file backing for the remediation history store.
//!
//! The file holds one object keyed by AP id. Every save rewrites the whole
//! document through a sibling temp file and a rename.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use incident_engine::history::HistoryPersistence;
use incident_engine::{HistoryError, RemediationHistory};

pub struct JsonFileHistory {
    path: PathBuf,
    records: Mutex<HashMap<String, RemediationHistory>>,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<HashMap<String, RemediationHistory>, HistoryError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no history file yet, starting empty");
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| HistoryError::Load(format!("{}: {e}", self.path.display())))?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| HistoryError::Load(format!("{}: {e}", self.path.display())))
    }

    fn write_file(&self, records: &HashMap<String, RemediationHistory>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }
}

impl HistoryPersistence for JsonFileHistory {
    fn load(&self) -> Result<HashMap<String, RemediationHistory>, HistoryError> {
        let loaded = self.read_file()?;
        *self.records.lock().unwrap_or_else(PoisonError::into_inner) = loaded.clone();
        Ok(loaded)
    }

    fn save(&self, ap_id: &str, history: &RemediationHistory) -> Result<(), HistoryError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(ap_id.to_string(), history.clone());
        self.write_file(&records).map_err(|e| HistoryError::Persist {
            ap_id: ap_id.to_string(),
            message: e.to_string(),
        })?;
        debug!(ap_id, path = %self.path.display(), "history persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let file = JsonFileHistory::new(dir.path().join("history.json"));
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn saved_records_survive_a_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("history.json");
        let at = Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap();

        let file = JsonFileHistory::new(&path);
        file.load().unwrap();
        let mut history = RemediationHistory::default();
        history.record_action(at);
        file.save("ap-1", &history).unwrap();
        file.save("ap-2", &RemediationHistory::with_last_action(at)).unwrap();

        let reloaded = JsonFileHistory::new(&path).load().unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded["ap-1"], history);
        assert_eq!(reloaded["ap-1"].daily_count_on(at.date_naive()), 1);
    }

    #[test]
    fn corrupt_file_is_a_load_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = JsonFileHistory::new(&path).load().unwrap_err();
        assert!(matches!(err, HistoryError::Load(_)));
    }
}
