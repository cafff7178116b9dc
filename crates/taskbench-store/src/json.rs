use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use taskbench_core::{
    BenchError, BenchResult, LedgerStore, ResultStore, Snapshot, WrongAnswersCollection,
};

pub const LEDGER_FILE: &str = "wrong-answers.json";

const MAX_NAME_ATTEMPTS: u32 = 100;

/// File-name-safe form of a dataset or scope name.
pub fn scope_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

fn ensure_dir(dir: &Path) -> BenchResult<()> {
    fs::create_dir_all(dir)
        .map_err(|e| BenchError::Storage(format!("cannot create {}: {e}", dir.display())))
}

fn read_optional(path: &Path) -> BenchResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BenchError::Storage(format!(
            "cannot read {}: {e}",
            path.display()
        ))),
    }
}

fn write_whole(path: &Path, contents: &str) -> BenchResult<()> {
    fs::write(path, contents)
        .map_err(|e| BenchError::Storage(format!("cannot write {}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Result snapshots
// ---------------------------------------------------------------------------

/// Snapshots for one scope (usually the dataset name) under `dir`:
/// `{scope}_latest.json` rewritten after every task, plus one
/// `{scope}_{timestamp}.json` per finished run.
pub struct JsonResultStore {
    dir: PathBuf,
    scope: String,
}

impl JsonResultStore {
    pub fn new(dir: impl Into<PathBuf>, scope: &str) -> Self {
        Self {
            dir: dir.into(),
            scope: scope_name(scope),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(format!("{}_latest.json", self.scope))
    }

    fn final_path(&self, stamp: &str, attempt: u32) -> PathBuf {
        if attempt == 0 {
            self.dir.join(format!("{}_{stamp}.json", self.scope))
        } else {
            self.dir.join(format!("{}_{stamp}-{attempt}.json", self.scope))
        }
    }
}

impl ResultStore for JsonResultStore {
    fn load_checkpoint(&self) -> BenchResult<Option<Snapshot>> {
        let path = self.latest_path();
        let Some(raw) = read_optional(&path)? else {
            return Ok(None);
        };
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        debug!(
            "checkpoint {} has {} results",
            path.display(),
            snapshot.results.len()
        );
        Ok(Some(snapshot))
    }

    fn save_incremental(&self, snapshot: &Snapshot) -> BenchResult<()> {
        ensure_dir(&self.dir)?;
        let json = serde_json::to_string_pretty(snapshot)?;
        write_whole(&self.latest_path(), &json)
    }

    fn save_final(&self, snapshot: &Snapshot) -> BenchResult<PathBuf> {
        ensure_dir(&self.dir)?;
        let json = serde_json::to_string_pretty(snapshot)?;
        let stamp = snapshot
            .metadata
            .timestamp
            .format("%Y-%m-%dT%H-%M-%S%.3fZ")
            .to_string();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.final_path(&stamp, attempt);
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(BenchError::Storage(format!(
                        "cannot create {}: {e}",
                        path.display()
                    )))
                }
            };
            file.write_all(json.as_bytes())
                .map_err(|e| BenchError::Storage(format!("cannot write {}: {e}", path.display())))?;
            return Ok(path);
        }
        Err(BenchError::Storage(format!(
            "no free snapshot name for {} at {stamp}",
            self.scope
        )))
    }
}

// ---------------------------------------------------------------------------
// Wrong-answers ledger
// ---------------------------------------------------------------------------

/// `wrong-answers.json` in the output directory, shared by every run there.
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(LEDGER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for JsonLedgerStore {
    fn load(&self) -> BenchResult<WrongAnswersCollection> {
        match read_optional(&self.path)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(WrongAnswersCollection::default()),
        }
    }

    fn save(&self, ledger: &WrongAnswersCollection) -> BenchResult<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let json = serde_json::to_string_pretty(ledger)?;
        write_whole(&self.path, &json)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::Utc;
    use taskbench_core::{merge_results, RunInfo, Task, TaskResult};

    use super::*;

    fn result(id: &str, correct: bool) -> TaskResult {
        TaskResult {
            task_id: id.into(),
            question: "capital of France".into(),
            level: 2,
            files_attached: Vec::new(),
            answer: if correct { "Paris" } else { "Lyon" }.into(),
            expected_answer: Some("Paris".into()),
            correct,
            duration_ms: 1200,
            steps: 2,
            step_details: Vec::new(),
            tools_used: vec!["web_search".into()],
            error: None,
            summary: None,
            metadata: None,
        }
    }

    fn snapshot(results: Vec<TaskResult>, incremental: bool) -> Snapshot {
        let run = RunInfo::new("gaia/validation", "agent", "model", "run");
        Snapshot::new(&run, results, incremental)
    }

    #[test]
    fn test_scope_name() {
        assert_eq!(scope_name("gaia/validation"), "gaia-validation");
        assert_eq!(scope_name("gaia_2023"), "gaia_2023");
        assert_eq!(scope_name(""), "default");
    }

    #[test]
    fn test_missing_checkpoint_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonResultStore::new(dir.path(), "gaia");
        assert!(store.load_checkpoint().unwrap().is_none());
    }

    #[test]
    fn test_incremental_overwrites_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonResultStore::new(dir.path().join("out"), "gaia");

        store
            .save_incremental(&snapshot(vec![result("a", true)], true))
            .unwrap();
        store
            .save_incremental(&snapshot(vec![result("a", true), result("b", false)], true))
            .unwrap();

        let loaded = store.load_checkpoint().unwrap().unwrap();
        assert_eq!(loaded.results.len(), 2);
        assert!(loaded.metadata.incremental);
        assert_eq!(loaded.metadata.total, 2);
        assert_eq!(loaded.metadata.correct, 1);
    }

    #[test]
    fn test_corrupt_checkpoint_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonResultStore::new(dir.path(), "gaia");
        fs::write(store.latest_path(), "{not json").unwrap();
        assert!(store.load_checkpoint().is_err());
    }

    #[test]
    fn test_final_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonResultStore::new(dir.path(), "gaia");
        let snap = snapshot(vec![result("a", true)], false);

        let first = store.save_final(&snap).unwrap();
        let second = store.save_final(&snap).unwrap();
        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
        let name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("gaia_"));
        assert!(!name.contains(':'));
    }

    #[test]
    fn test_ledger_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path());
        let task = Task::new("t2", 2, "capital of France").with_expected("Paris");
        let lookup = HashMap::from([("t2", &task)]);

        let mut ledger = store.load().unwrap();
        merge_results(&mut ledger, &[result("t2", false)], &lookup, Utc::now());
        store.save(&ledger).unwrap();

        let mut reloaded = store.load().unwrap();
        assert_eq!(reloaded.metadata.total_wrong, 1);
        assert_eq!(reloaded.tasks["t2"].attempt_count, 1);

        merge_results(&mut reloaded, &[result("t2", true)], &lookup, Utc::now());
        store.save(&reloaded).unwrap();
        let last = store.load().unwrap();
        assert!(last.tasks.is_empty());
        assert_eq!(last.metadata.total_wrong, 0);
    }

    #[test]
    fn test_malformed_ledger_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLedgerStore::new(dir.path());
        fs::write(store.path(), r#"{"tasks": []}"#).unwrap();
        assert!(store.load().is_err());
    }
}
