//! Local dataset loader.
//!
//! A dataset named `gaia` is looked up under the dataset directory as, in order:
//! `gaia.jsonl`, `gaia.json`, `gaia/metadata.jsonl`. Records may use the
//! native field names (`id`, `level`, `question`, `expectedAnswer`, `files`)
//! or the GAIA export ones (`task_id`, `Level`, `Question`, `Final answer`,
//! `file_name`). Attachment paths are relative to the data file's directory.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use taskbench_core::task::LEVELS;
use taskbench_core::{BenchError, BenchResult, Task, TaskFile};

/// Text attachments up to this size are sent inline.
const INLINE_LIMIT: u64 = 64 * 1024;

#[derive(Debug, Deserialize)]
struct RawFile {
    name: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, rename = "mimeType")]
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(alias = "task_id")]
    id: String,
    #[serde(alias = "Question")]
    question: String,
    #[serde(alias = "Level")]
    level: Value,
    #[serde(
        default,
        rename = "expectedAnswer",
        alias = "Final answer",
        alias = "expected_answer"
    )]
    expected_answer: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    files: Vec<RawFile>,
    #[serde(default, alias = "Annotator Metadata")]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    List(Vec<RawTask>),
    Wrapped { tasks: Vec<RawTask> },
}

/// Resolve the data file for `name`, first match wins.
pub fn locate(dir: &Path, name: &str) -> BenchResult<PathBuf> {
    let candidates = [
        dir.join(format!("{name}.jsonl")),
        dir.join(format!("{name}.json")),
        dir.join(name).join("metadata.jsonl"),
    ];
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            BenchError::Dataset(format!(
                "dataset {name:?} not found in {} (tried {name}.jsonl, {name}.json, {name}/metadata.jsonl)",
                dir.display()
            ))
        })
}

pub fn load_dataset(dir: &Path, name: &str) -> BenchResult<Vec<Task>> {
    let path = locate(dir, name)?;
    let raw = fs::read_to_string(&path)
        .map_err(|e| BenchError::Dataset(format!("cannot read {}: {e}", path.display())))?;
    let base = path.parent().unwrap_or(Path::new("."));

    let records: Vec<(usize, RawTask)> = if path.extension().is_some_and(|e| e == "jsonl") {
        parse_jsonl(&raw, &path)?
    } else {
        let doc: JsonDocument = serde_json::from_str(&raw)
            .map_err(|e| BenchError::Dataset(format!("{}: {e}", path.display())))?;
        let list = match doc {
            JsonDocument::List(l) => l,
            JsonDocument::Wrapped { tasks } => tasks,
        };
        list.into_iter().enumerate().map(|(i, t)| (i + 1, t)).collect()
    };

    let mut seen = HashSet::new();
    let mut tasks = Vec::with_capacity(records.len());
    for (record, raw) in records {
        let task = convert(raw, base)
            .map_err(|e| BenchError::Dataset(format!("{} record {record}: {e}", path.display())))?;
        if !seen.insert(task.id.clone()) {
            return Err(BenchError::Dataset(format!(
                "{}: duplicate task id {}",
                path.display(),
                task.id
            )));
        }
        tasks.push(task);
    }

    debug!("loaded {} tasks from {}", tasks.len(), path.display());
    Ok(tasks)
}

fn parse_jsonl(raw: &str, path: &Path) -> BenchResult<Vec<(usize, RawTask)>> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .map(|t| (i + 1, t))
                .map_err(|e| BenchError::Dataset(format!("{} line {}: {e}", path.display(), i + 1)))
        })
        .collect()
}

fn parse_level(value: &Value) -> Result<u8, String> {
    let level = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    level
        .and_then(|l| u8::try_from(l).ok())
        .filter(|l| LEVELS.contains(l))
        .ok_or_else(|| format!("level must be 1, 2 or 3, got {value}"))
}

fn convert(raw: RawTask, base: &Path) -> Result<Task, String> {
    if raw.id.trim().is_empty() {
        return Err("empty task id".into());
    }
    let level = parse_level(&raw.level)?;

    let mut files: Vec<TaskFile> = raw
        .files
        .into_iter()
        .map(|f| {
            let path = f.path.unwrap_or_else(|| f.name.clone());
            attachment(&f.name, &path, f.mime_type, base)
        })
        .collect();
    if let Some(name) = raw.file_name.filter(|n| !n.trim().is_empty()) {
        files.push(attachment(&name, &name, None, base));
    }

    let mut metadata = BTreeMap::new();
    match raw.metadata {
        Some(Value::Object(map)) => metadata.extend(map),
        Some(Value::Null) | None => {}
        Some(other) => {
            metadata.insert("annotator".to_string(), other);
        }
    }

    Ok(Task {
        id: raw.id,
        level,
        question: raw.question,
        expected_answer: raw.expected_answer.filter(|a| !a.trim().is_empty()),
        files,
        metadata,
    })
}

fn is_text_like(mime: &str) -> bool {
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/json" | "application/xml" | "application/x-yaml" | "application/toml"
        )
}

fn attachment(name: &str, path: &str, mime: Option<String>, base: &Path) -> TaskFile {
    let full = base.join(path);
    let mime = mime.unwrap_or_else(|| {
        mime_guess::from_path(&full)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });
    let mut file = TaskFile::new(name, full.display().to_string(), mime);

    if is_text_like(&file.mime_type) {
        match fs::metadata(&full) {
            Ok(meta) if meta.len() <= INLINE_LIMIT => match fs::read_to_string(&full) {
                Ok(text) => file.inline_data = Some(text),
                Err(e) => warn!("cannot inline {}: {e}", full.display()),
            },
            Ok(_) => debug!("{} too large to inline", full.display()),
            Err(e) => warn!("attachment {} unavailable: {e}", full.display()),
        }
    }
    file
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_native_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("mini.jsonl"),
            concat!(
                r#"{"id":"t1","level":1,"question":"Calculate 2+2","expectedAnswer":"4"}"#,
                "\n\n",
                r#"{"id":"t2","level":2,"question":"Read it","files":[{"name":"notes.txt"}]}"#,
                "\n"
            ),
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let tasks = load_dataset(dir.path(), "mini").unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].expected_answer.as_deref(), Some("4"));
        let file = &tasks[1].files[0];
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(file.inline_data.as_deref(), Some("hello"));
    }

    #[test]
    fn test_load_gaia_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("gaia");
        fs::create_dir(&sub).unwrap();
        fs::write(
            sub.join("metadata.jsonl"),
            concat!(
                r#"{"task_id":"abc","Question":"What is in the sheet?","Level":"3","Final answer":"42","file_name":"data.xlsx","Annotator Metadata":{"Steps":"open"}}"#,
                "\n",
                r#"{"task_id":"def","Question":"Who?","Level":1,"Final answer":"me","file_name":""}"#,
            ),
        )
        .unwrap();

        let tasks = load_dataset(dir.path(), "gaia").unwrap();
        assert_eq!(tasks[0].id, "abc");
        assert_eq!(tasks[0].level, 3);
        assert_eq!(tasks[0].files.len(), 1);
        assert!(tasks[0].files[0].path.ends_with("data.xlsx"));
        assert_eq!(
            tasks[0].files[0].mime_type,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert!(tasks[0].files[0].inline_data.is_none());
        assert_eq!(tasks[0].metadata["Steps"], "open");
        assert!(tasks[1].files.is_empty());
    }

    #[test]
    fn test_load_json_array_and_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.json"),
            r#"[{"id":"x","level":1,"question":"q"}]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("b.json"),
            r#"{"tasks":[{"id":"y","level":2,"question":"q"}]}"#,
        )
        .unwrap();
        assert_eq!(load_dataset(dir.path(), "a").unwrap()[0].id, "x");
        assert_eq!(load_dataset(dir.path(), "b").unwrap()[0].level, 2);
    }

    #[test]
    fn test_rejects_bad_level() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bad.jsonl"),
            r#"{"id":"t","level":4,"question":"q"}"#,
        )
        .unwrap();
        let err = load_dataset(dir.path(), "bad").unwrap_err();
        assert!(err.to_string().contains("level must be"));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("dup.jsonl"),
            "{\"id\":\"t\",\"level\":1,\"question\":\"a\"}\n{\"id\":\"t\",\"level\":1,\"question\":\"b\"}\n",
        )
        .unwrap();
        assert!(load_dataset(dir.path(), "dup").is_err());
    }

    #[test]
    fn test_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dataset(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, BenchError::Dataset(_)));
    }
}
