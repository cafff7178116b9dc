//! Cross-run ledger of tasks that are currently answered wrong.
//!
//! An entry appears on a task's first failure, is updated on each further
//! failure, and is deleted on the first success. The collection is loaded
//! and saved whole; see [`crate::store::LedgerStore`].

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::result::{ResultSummary, TaskResult};
use crate::task::Task;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrongAnswerEntry {
    pub task_id: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    pub agent_answer: String,
    pub level: u8,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools_used: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ResultSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerMetadata {
    pub total_wrong: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrongAnswersCollection {
    pub metadata: LedgerMetadata,
    pub tasks: BTreeMap<String, WrongAnswerEntry>,
}

impl Default for WrongAnswersCollection {
    fn default() -> Self {
        Self {
            metadata: LedgerMetadata {
                total_wrong: 0,
                last_updated: Utc::now(),
            },
            tasks: BTreeMap::new(),
        }
    }
}

impl WrongAnswersCollection {
    /// Recompute metadata from the entry map. Call before every save.
    pub fn refresh_metadata(&mut self, now: DateTime<Utc>) {
        self.metadata = LedgerMetadata {
            total_wrong: self.tasks.len(),
            last_updated: now,
        };
    }

    pub fn task_ids(&self) -> HashSet<&str> {
        self.tasks.keys().map(String::as_str).collect()
    }
}

/// What one merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

/// Fold a finished run's results into the ledger.
///
/// Results whose task is not in `tasks` are skipped. `firstFailedAt` is kept
/// from an existing entry; everything else is overwritten with the latest
/// values. Metadata is recomputed at the end.
pub fn merge_results(
    ledger: &mut WrongAnswersCollection,
    results: &[TaskResult],
    tasks: &HashMap<&str, &Task>,
    now: DateTime<Utc>,
) -> MergeSummary {
    let mut summary = MergeSummary::default();

    for result in results {
        let Some(task) = tasks.get(result.task_id.as_str()) else {
            continue;
        };

        if result.correct {
            if ledger.tasks.remove(&result.task_id).is_some() {
                info!("Removed {} from wrong answers", result.task_id);
                summary.removed.push(result.task_id.clone());
            }
            continue;
        }

        let previous = ledger.tasks.get(&result.task_id);
        let first_failed_at = previous.map(|p| p.first_failed_at).unwrap_or(now);
        let attempt_count = previous.map(|p| p.attempt_count + 1).unwrap_or(1);
        if previous.is_some() {
            summary.updated.push(result.task_id.clone());
        } else {
            summary.added.push(result.task_id.clone());
        }

        ledger.tasks.insert(
            result.task_id.clone(),
            WrongAnswerEntry {
                task_id: result.task_id.clone(),
                question: task.question.clone(),
                expected_answer: task.expected_answer.clone(),
                agent_answer: result.answer.clone(),
                level: task.level,
                first_failed_at,
                last_failed_at: now,
                attempt_count,
                error: result.error.clone(),
                steps: Some(result.steps),
                tools_used: result.tools_used.clone(),
                summary: result.summary.clone(),
            },
        );
    }

    ledger.refresh_metadata(now);
    summary
}

/// Tasks to re-run in "retry wrong answers" mode: ledger ∩ dataset, in
/// dataset order, optionally narrowed to one level and capped.
pub fn select_retry_tasks(
    ledger: &WrongAnswersCollection,
    dataset: &[Task],
    level: Option<u8>,
    limit: Option<usize>,
) -> Vec<Task> {
    let wrong = ledger.task_ids();
    dataset
        .iter()
        .filter(|t| wrong.contains(t.id.as_str()))
        .filter(|t| level.map_or(true, |l| t.level == l))
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}
