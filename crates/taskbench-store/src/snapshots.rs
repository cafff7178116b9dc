//! Reading back finished runs for `analyze` and `history`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use taskbench_core::{BenchError, BenchResult, Snapshot, SnapshotMetadata};

use crate::json::scope_name;

pub fn load_snapshot(path: &Path) -> BenchResult<Snapshot> {
    let raw = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BenchError::NotFound(path.display().to_string())
        } else {
            BenchError::Storage(format!("cannot read {}: {e}", path.display()))
        }
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Pretty-printed JSON, overwriting `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> BenchResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)
        .map_err(|e| BenchError::Storage(format!("cannot write {}: {e}", path.display())))
}

/// `<stem>_analysis.json` beside a snapshot file.
pub fn analysis_path_for(snapshot_path: &Path) -> PathBuf {
    let stem = snapshot_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "snapshot".to_string());
    snapshot_path.with_file_name(format!("{stem}_analysis.json"))
}

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub metadata: SnapshotMetadata,
}

fn is_snapshot_file(name: &str) -> bool {
    name.ends_with(".json")
        && !name.ends_with("_latest.json")
        && !name.ends_with("_analysis.json")
        && name != crate::json::LEDGER_FILE
}

/// Final snapshots in `dir`, oldest first. Limited to one scope when given.
/// Files that do not parse are skipped.
pub fn list_snapshots(dir: &Path, scope: Option<&str>) -> BenchResult<Vec<SnapshotEntry>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(BenchError::Storage(format!(
                "cannot list {}: {e}",
                dir.display()
            )))
        }
    };
    let prefix = scope.map(|s| format!("{}_", scope_name(s)));

    let mut found = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_snapshot_file(&name) {
            continue;
        }
        if prefix.as_ref().is_some_and(|p| !name.starts_with(p.as_str())) {
            continue;
        }
        let path = entry.path();
        match load_snapshot(&path) {
            Ok(snapshot) => found.push(SnapshotEntry {
                path,
                metadata: snapshot.metadata,
            }),
            Err(e) => debug!("skipping {}: {e}", path.display()),
        }
    }

    found.sort_by(|a, b| a.metadata.timestamp.cmp(&b.metadata.timestamp));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use taskbench_core::{ResultStore, RunInfo};

    use super::*;
    use crate::json::JsonResultStore;

    fn snapshot(dataset: &str) -> Snapshot {
        Snapshot::new(&RunInfo::new(dataset, "a", "m", "run"), Vec::new(), false)
    }

    #[test]
    fn test_analysis_path() {
        let p = analysis_path_for(Path::new("/out/gaia_2026-01-01T00-00-00.000Z.json"));
        assert_eq!(
            p,
            PathBuf::from("/out/gaia_2026-01-01T00-00-00.000Z_analysis.json")
        );
    }

    #[test]
    fn test_list_snapshots_filters_by_scope() {
        let dir = tempfile::tempdir().unwrap();
        let gaia = JsonResultStore::new(dir.path(), "gaia");
        let other = JsonResultStore::new(dir.path(), "other");

        let first = gaia.save_final(&snapshot("gaia")).unwrap();
        gaia.save_final(&snapshot("gaia")).unwrap();
        gaia.save_incremental(&snapshot("gaia")).unwrap();
        other.save_final(&snapshot("other")).unwrap();
        write_json(&analysis_path_for(&first), &serde_json::json!({"x": 1})).unwrap();
        fs::write(dir.path().join("junk.json"), "nope").unwrap();

        let all = list_snapshots(dir.path(), None).unwrap();
        assert_eq!(all.len(), 3);
        let gaia_only = list_snapshots(dir.path(), Some("gaia")).unwrap();
        assert_eq!(gaia_only.len(), 2);
        assert!(gaia_only.iter().all(|e| e.metadata.dataset == "gaia"));
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let listed = list_snapshots(&dir.path().join("nope"), None).unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_snapshot(&dir.path().join("x.json")).unwrap_err();
        assert!(matches!(err, BenchError::NotFound(_)));
    }
}
