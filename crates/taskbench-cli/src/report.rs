//! Console tables for finished runs, and the run-history documentation sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use taskbench_core::analytics::{AnalysisReport, LevelAccuracy};
use taskbench_core::evaluator::truncate;
use taskbench_core::store::DocumentationSink;
use taskbench_core::{BenchError, BenchResult, SnapshotMetadata, WrongAnswersCollection};
use taskbench_store::SnapshotEntry;

const TOOL_ROWS: usize = 10;

fn level_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.0}%"))
}

fn levels(l: &LevelAccuracy) -> String {
    format!(
        "{:>5} {:>5} {:>5}",
        level_cell(l.level1),
        level_cell(l.level2),
        level_cell(l.level3)
    )
}

pub fn print_report(report: &AnalysisReport) {
    let s = &report.summary;
    println!();
    println!("Tasks:      {}", s.total);
    println!("Correct:    {} ({:.1}%)", s.correct, s.accuracy);
    println!("Avg steps:  {:.1}", s.avg_steps);
    println!("Avg time:   {:.1}s", s.avg_duration_ms / 1000.0);

    if !report.category_performance.is_empty() {
        println!();
        println!(
            "{:<10} {:>5} {:>8} {:>6} {:>5} {:>5} {:>5}  Top tools",
            "Category", "Tasks", "Accuracy", "Steps", "L1", "L2", "L3"
        );
        for row in &report.category_performance {
            let tools: Vec<&str> = row.top_tools.iter().map(|t| t.tool.as_str()).collect();
            println!(
                "{:<10} {:>5} {:>7.1}% {:>6.1} {}  {}",
                row.category.to_string(),
                row.total,
                row.accuracy,
                row.avg_steps,
                levels(&row.level_accuracy),
                tools.join(", ")
            );
        }
    }

    if !report.weaknesses.is_empty() {
        println!();
        println!("Weaknesses:");
        for w in &report.weaknesses {
            println!(
                "  {:<10} {:>5.1}% ({}/{}) {}",
                w.category.to_string(),
                w.accuracy,
                w.correct,
                w.total,
                w.severity
            );
        }
    }

    if !report.tool_usage.is_empty() {
        println!();
        println!(
            "{:<24} {:>5} {:>8} {:>6}  With",
            "Tool", "Used", "Success", "Steps"
        );
        for t in report.tool_usage.iter().take(TOOL_ROWS) {
            let with: Vec<&str> = t.co_occurring.iter().map(|c| c.tool.as_str()).collect();
            println!(
                "{:<24} {:>5} {:>7.1}% {:>6.1}  {}",
                truncate(&t.tool, 24),
                t.usage_count,
                t.success_rate,
                t.avg_steps,
                with.join(", ")
            );
        }
    }

    if !report.failure_patterns.is_empty() {
        println!();
        println!("Failure patterns:");
        for p in &report.failure_patterns {
            println!("  {:<28} {:>4}  {}", p.pattern.to_string(), p.occurrences, p.description);
        }
    }

    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for (i, r) in report.recommendations.iter().enumerate() {
            println!("  {}. {r}", i + 1);
        }
    }
}

pub fn print_ledger(ledger: &WrongAnswersCollection, level: Option<u8>) {
    let entries: Vec<_> = ledger
        .tasks
        .values()
        .filter(|e| level.map_or(true, |l| e.level == l))
        .collect();
    if entries.is_empty() {
        println!("No wrong answers recorded.");
        return;
    }

    println!(
        "{:<38} {:>5} {:>8} {:<16} Answer / expected",
        "Task", "Level", "Attempts", "Last failed"
    );
    for e in &entries {
        let answer = match &e.error {
            Some(err) => format!("error: {}", truncate(err, 40)),
            None => truncate(&e.agent_answer, 40),
        };
        println!(
            "{:<38} {:>5} {:>8} {:<16} {} / {}",
            truncate(&e.task_id, 38),
            e.level,
            e.attempt_count,
            e.last_failed_at.format("%Y-%m-%d %H:%M"),
            answer,
            e.expected_answer.as_deref().unwrap_or("-")
        );
    }
    println!(
        "\n{} wrong (ledger updated {})",
        ledger.metadata.total_wrong,
        ledger.metadata.last_updated.format("%Y-%m-%d %H:%M")
    );
}

pub fn print_history(entries: &[SnapshotEntry]) {
    if entries.is_empty() {
        println!("No finished runs found.");
        return;
    }
    println!(
        "{:<17} {:<20} {:<7} {:>7} {:>8}  File",
        "When", "Dataset", "Command", "Tasks", "Accuracy"
    );
    for entry in entries {
        let m = &entry.metadata;
        let file = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        println!(
            "{:<17} {:<20} {:<7} {:>7} {:>7.1}%  {file}",
            m.timestamp.format("%Y-%m-%d %H:%M"),
            truncate(&m.dataset, 20),
            m.command.as_deref().unwrap_or("-"),
            format!("{}/{}", m.correct, m.total),
            m.accuracy
        );
    }
}

// ---------------------------------------------------------------------------
// Run history sink
// ---------------------------------------------------------------------------

pub const HISTORY_FILE: &str = "run-history.jsonl";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryLine<'a> {
    command: &'a str,
    run: &'a SnapshotMetadata,
    providers: &'a str,
    details: &'a str,
}

/// Appends one JSON line per finished run to `run-history.jsonl`.
pub struct RunHistorySink {
    path: PathBuf,
}

impl RunHistorySink {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(HISTORY_FILE),
        }
    }
}

impl DocumentationSink for RunHistorySink {
    fn record_run(
        &self,
        command: &str,
        metadata: &SnapshotMetadata,
        provider_summary: &str,
        details_link: &str,
    ) -> BenchResult<()> {
        let line = serde_json::to_string(&HistoryLine {
            command,
            run: metadata,
            providers: provider_summary,
            details: details_link,
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| BenchError::Storage(format!("cannot open {}: {e}", self.path.display())))?;
        writeln!(file, "{line}")
            .map_err(|e| BenchError::Storage(format!("cannot append to {}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use taskbench_core::{RunInfo, Snapshot};

    use super::*;

    #[test]
    fn test_history_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RunHistorySink::new(dir.path());
        let snapshot = Snapshot::new(&RunInfo::new("gaia", "a", "m", "run"), Vec::new(), false);

        sink.record_run("run", &snapshot.metadata, "search=exa", "/out/gaia_1.json")
            .unwrap();
        sink.record_run("retry", &snapshot.metadata, "default", "")
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join(HISTORY_FILE)).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["providers"], "search=exa");
        assert_eq!(lines[0]["run"]["dataset"], "gaia");
        assert_eq!(lines[1]["command"], "retry");
    }

    #[test]
    fn test_history_sink_missing_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RunHistorySink::new(&dir.path().join("missing"));
        let snapshot = Snapshot::new(&RunInfo::new("gaia", "a", "m", "run"), Vec::new(), false);
        assert!(sink.record_run("run", &snapshot.metadata, "", "").is_err());
    }

    #[test]
    fn test_level_cell() {
        assert_eq!(level_cell(None), "-");
        assert_eq!(level_cell(Some(66.66)), "67%");
    }
}
