use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// TaskResult
// ---------------------------------------------------------------------------

/// Recorded outcome of evaluating one task once. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub question: String,
    pub level: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_attached: Vec<String>,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    pub correct: bool,
    pub duration_ms: u64,
    pub steps: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub step_details: Vec<StepDetail>,
    /// Distinct tool names in order of first call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResultSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

impl TaskResult {
    /// Incorrect, but the agent finished without an explicit error.
    pub fn is_silent_failure(&self) -> bool {
        !self.correct && self.error.is_none()
    }

    /// Tool names with duplicates removed, first occurrence order.
    pub fn unique_tools(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for tool in &self.tools_used {
            if !seen.contains(&tool.as_str()) {
                seen.push(tool.as_str());
            }
        }
        seen
    }
}

/// One reasoning iteration, kept for tool-usage extraction and debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDetail {
    pub step_index: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallTrace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResultTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallTrace {
    pub tool_name: String,
    pub tool_call_id: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultTrace {
    pub tool_name: String,
    pub tool_call_id: String,
    pub result: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub total_tool_calls: usize,
    pub unique_tools: Vec<String>,
    /// At least one tool result reported an error.
    pub had_error: bool,
}

/// Extra data recorded by the reflective evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_reflection: Option<String>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Persisted result list plus run metadata, written after every task and at run end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub results: Vec<TaskResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub dataset: String,
    pub timestamp: DateTime<Utc>,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    #[serde(default)]
    pub agent: String,
    #[serde(default)]
    pub model: String,
    pub incremental: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Snapshot {
    /// Build a snapshot, recomputing totals from `results`.
    pub fn new(run: &RunInfo, results: Vec<TaskResult>, incremental: bool) -> Self {
        let total = results.len();
        let correct = results.iter().filter(|r| r.correct).count();
        Self {
            metadata: SnapshotMetadata {
                dataset: run.dataset.clone(),
                timestamp: Utc::now(),
                total,
                correct,
                accuracy: percentage(correct, total),
                agent: run.agent.clone(),
                model: run.model.clone(),
                incremental,
                run_id: Some(run.run_id.clone()),
                command: Some(run.command.clone()),
            },
            results,
        }
    }
}

/// Identity of one run, shared by every snapshot it writes.
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub run_id: String,
    pub dataset: String,
    pub agent: String,
    pub model: String,
    pub command: String,
}

impl RunInfo {
    pub fn new(
        dataset: impl Into<String>,
        agent: impl Into<String>,
        model: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            run_id: ulid::Ulid::new().to_string(),
            dataset: dataset.into(),
            agent: agent.into(),
            model: model.into(),
            command: command.into(),
        }
    }
}

/// `part / whole * 100`, or 0 for an empty whole.
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
