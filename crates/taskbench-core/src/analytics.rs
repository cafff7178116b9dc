//! Aggregations over a finished result set.
//!
//! Every function here is pure: results and tasks in, sorted report rows out.
//! A result counts toward every category its task falls in.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::categorize::{categorize, categorize_parts, Category};
use crate::result::{percentage, TaskResult};
use crate::task::Task;

/// Categories below this accuracy (percent) are reported as weaknesses.
pub const WEAKNESS_THRESHOLD: f64 = 60.0;
/// Failed results with more steps than this are "excessive".
pub const EXCESSIVE_STEPS: usize = 10;
/// Level-3 failures must exceed this count before the pattern is reported.
pub const LEVEL_3_FAILURE_THRESHOLD: usize = 5;
/// Tools below this success rate (percent) and above the usage floor get called out.
pub const UNRELIABLE_TOOL_RATE: f64 = 50.0;
pub const UNRELIABLE_TOOL_MIN_USES: usize = 3;

const TOP_N: usize = 3;

pub type TaskIndex<'a> = HashMap<&'a str, &'a Task>;

pub fn index_tasks(tasks: &[Task]) -> TaskIndex<'_> {
    tasks.iter().map(|t| (t.id.as_str(), t)).collect()
}

/// Categories for a result. Falls back to the result's own question and
/// attachment list when the task is not in the index.
fn categories_of(result: &TaskResult, tasks: &TaskIndex) -> Vec<Category> {
    match tasks.get(result.task_id.as_str()) {
        Some(task) => categorize(task),
        None => categorize_parts(&result.question, !result.files_attached.is_empty()),
    }
}

fn had_files(result: &TaskResult, tasks: &TaskIndex) -> bool {
    match tasks.get(result.task_id.as_str()) {
        Some(task) => task.has_files(),
        None => !result.files_attached.is_empty(),
    }
}

fn group_by_category<'r>(
    results: &'r [TaskResult],
    tasks: &TaskIndex,
) -> BTreeMap<Category, Vec<&'r TaskResult>> {
    let mut groups: BTreeMap<Category, Vec<&TaskResult>> = BTreeMap::new();
    for result in results {
        for category in categories_of(result, tasks) {
            groups.entry(category).or_default().push(result);
        }
    }
    groups
}

// ---------------------------------------------------------------------------
// Weaknesses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Moderate,
    Minor,
}

impl Severity {
    pub fn from_accuracy(accuracy: f64) -> Self {
        if accuracy < 30.0 {
            Self::Critical
        } else if accuracy < 50.0 {
            Self::Moderate
        } else {
            Self::Minor
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Minor => write!(f, "MINOR"),
        }
    }
}

fn category_advice(category: Category) -> &'static str {
    match category {
        Category::Files => {
            "Improve attachment handling: parse PDFs, spreadsheets and images with the right tool before reasoning about them"
        }
        Category::Code => {
            "Run calculations and data processing in the code sandbox instead of computing them in text"
        }
        Category::Search => {
            "Refine search queries and cross-check facts across more than one source"
        }
        Category::Browser => {
            "Verify page state after every navigation step and prefer direct URLs over multi-click paths"
        }
        Category::Reasoning => {
            "Break questions into explicit sub-steps and check each intermediate conclusion"
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Weakness {
    pub category: Category,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub severity: Severity,
    pub recommendation: String,
}

/// Categories with accuracy strictly below [`WEAKNESS_THRESHOLD`], worst first.
pub fn detect_weaknesses(results: &[TaskResult], tasks: &TaskIndex) -> Vec<Weakness> {
    let mut weaknesses: Vec<Weakness> = group_by_category(results, tasks)
        .into_iter()
        .filter_map(|(category, group)| {
            let total = group.len();
            let correct = group.iter().filter(|r| r.correct).count();
            let accuracy = percentage(correct, total);
            if accuracy >= WEAKNESS_THRESHOLD {
                return None;
            }
            let severity = Severity::from_accuracy(accuracy);
            Some(Weakness {
                category,
                total,
                correct,
                accuracy,
                severity,
                recommendation: format!("{severity}: {}", category_advice(category)),
            })
        })
        .collect();

    weaknesses.sort_by(|a, b| a.accuracy.total_cmp(&b.accuracy));
    weaknesses
}

// ---------------------------------------------------------------------------
// Tool usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCount {
    pub tool: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub tool: String,
    /// Results that used the tool at least once.
    pub usage_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub success_rate: f64,
    pub avg_steps: f64,
    pub co_occurring: Vec<ToolCount>,
}

#[derive(Default)]
struct ToolAccumulator {
    usage: usize,
    success: usize,
    steps: usize,
    co: HashMap<String, usize>,
}

/// Most frequent first, ties by name, at most `n`.
fn top_counts(counts: HashMap<String, usize>, n: usize) -> Vec<ToolCount> {
    let mut ranked: Vec<ToolCount> = counts
        .into_iter()
        .map(|(tool, count)| ToolCount { tool, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tool.cmp(&b.tool)));
    ranked.truncate(n);
    ranked
}

/// Per-tool usage, outcome, and co-occurrence, most used first.
pub fn analyze_tool_usage(results: &[TaskResult]) -> Vec<ToolStats> {
    let mut acc: HashMap<String, ToolAccumulator> = HashMap::new();

    for result in results {
        let tools = result.unique_tools();
        for &tool in &tools {
            let entry = acc.entry(tool.to_string()).or_default();
            entry.usage += 1;
            if result.correct {
                entry.success += 1;
            }
            entry.steps += result.steps;
            for &other in &tools {
                if other != tool {
                    *entry.co.entry(other.to_string()).or_default() += 1;
                }
            }
        }
    }

    let mut stats: Vec<ToolStats> = acc
        .into_iter()
        .map(|(tool, a)| ToolStats {
            tool,
            usage_count: a.usage,
            success_count: a.success,
            failure_count: a.usage - a.success,
            success_rate: percentage(a.success, a.usage),
            avg_steps: if a.usage == 0 {
                0.0
            } else {
                a.steps as f64 / a.usage as f64
            },
            co_occurring: top_counts(a.co, TOP_N),
        })
        .collect();

    stats.sort_by(|a, b| {
        b.usage_count
            .cmp(&a.usage_count)
            .then_with(|| a.tool.cmp(&b.tool))
    });
    stats
}

// ---------------------------------------------------------------------------
// Failure patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    NoToolsUsed,
    ExcessiveSteps,
    FileProcessingFailure,
    SearchWithoutVerification,
    #[serde(rename = "level_3_difficulty")]
    Level3Difficulty,
}

impl PatternKind {
    fn description(self) -> &'static str {
        match self {
            Self::NoToolsUsed => "Answered without calling any tool",
            Self::ExcessiveSteps => "Took more than 10 steps and still answered wrong",
            Self::FileProcessingFailure => "Task had attachments and the answer was wrong",
            Self::SearchWithoutVerification => {
                "Searched but never opened a source to verify the result"
            }
            Self::Level3Difficulty => "Repeated failures on level 3 tasks",
        }
    }

    fn suggested_fix(self) -> &'static str {
        match self {
            Self::NoToolsUsed => {
                "Require at least one lookup or computation before committing to a factual answer"
            }
            Self::ExcessiveSteps => {
                "Set a step budget and re-plan from a written summary when it is exceeded"
            }
            Self::FileProcessingFailure => {
                "Check that each attachment is opened with a tool that understands its format"
            }
            Self::SearchWithoutVerification => {
                "Fetch and read the top search results instead of answering from snippets"
            }
            Self::Level3Difficulty => {
                "Decompose level 3 tasks into sub-goals and verify each intermediate result"
            }
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoToolsUsed => write!(f, "no_tools_used"),
            Self::ExcessiveSteps => write!(f, "excessive_steps"),
            Self::FileProcessingFailure => write!(f, "file_processing_failure"),
            Self::SearchWithoutVerification => write!(f, "search_without_verification"),
            Self::Level3Difficulty => write!(f, "level_3_difficulty"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePattern {
    pub pattern: PatternKind,
    pub description: String,
    pub occurrences: usize,
    pub affected_tasks: Vec<String>,
    pub suggested_fix: String,
}

const DEEP_RETRIEVAL_MARKERS: &[&str] = &[
    "fetch", "extract", "scrape", "crawl", "browse", "browser", "navigate", "read_url",
];

fn is_search_tool(tool: &str) -> bool {
    tool.to_lowercase().contains("search")
}

fn is_deep_retrieval_tool(tool: &str) -> bool {
    let lower = tool.to_lowercase();
    DEEP_RETRIEVAL_MARKERS.iter().any(|m| lower.contains(m))
}

fn matching(silent: &[&TaskResult], pred: impl Fn(&TaskResult) -> bool) -> Vec<String> {
    silent
        .iter()
        .filter(|r| pred(r))
        .map(|r| r.task_id.clone())
        .collect()
}

/// Heuristic patterns over results that are wrong without an explicit error.
/// Patterns are non-exclusive; one result may match several.
pub fn recognize_failure_patterns(
    results: &[TaskResult],
    tasks: &TaskIndex,
) -> Vec<FailurePattern> {
    let silent: Vec<&TaskResult> = results.iter().filter(|r| r.is_silent_failure()).collect();

    let mut candidates = vec![
        (PatternKind::NoToolsUsed, matching(&silent, |r| r.tools_used.is_empty())),
        (
            PatternKind::ExcessiveSteps,
            matching(&silent, |r| r.steps > EXCESSIVE_STEPS),
        ),
        (
            PatternKind::FileProcessingFailure,
            matching(&silent, |r| had_files(r, tasks)),
        ),
        (
            PatternKind::SearchWithoutVerification,
            matching(&silent, |r| {
                r.tools_used.iter().any(|t| is_search_tool(t))
                    && !r.tools_used.iter().any(|t| is_deep_retrieval_tool(t))
            }),
        ),
    ];

    let level_3 = matching(&silent, |r| r.level == 3);
    if level_3.len() > LEVEL_3_FAILURE_THRESHOLD {
        candidates.push((PatternKind::Level3Difficulty, level_3));
    }

    let mut patterns: Vec<FailurePattern> = candidates
        .into_iter()
        .filter(|(_, affected)| !affected.is_empty())
        .map(|(kind, affected)| FailurePattern {
            pattern: kind,
            description: kind.description().to_string(),
            occurrences: affected.len(),
            affected_tasks: affected,
            suggested_fix: kind.suggested_fix().to_string(),
        })
        .collect();

    patterns.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    patterns
}

// ---------------------------------------------------------------------------
// Category performance
// ---------------------------------------------------------------------------

/// Accuracy per difficulty level; a level with no results is omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelAccuracy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level3: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPerformance {
    pub category: Category,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub avg_steps: f64,
    pub avg_duration_ms: f64,
    pub top_tools: Vec<ToolCount>,
    pub level_accuracy: LevelAccuracy,
}

fn level_accuracy(group: &[&TaskResult], level: u8) -> Option<f64> {
    let at_level: Vec<_> = group.iter().filter(|r| r.level == level).collect();
    if at_level.is_empty() {
        return None;
    }
    let correct = at_level.iter().filter(|r| r.correct).count();
    Some(percentage(correct, at_level.len()))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Per-category rollup, largest category first.
pub fn analyze_category_performance(
    results: &[TaskResult],
    tasks: &TaskIndex,
) -> Vec<CategoryPerformance> {
    let mut rows: Vec<CategoryPerformance> = group_by_category(results, tasks)
        .into_iter()
        .map(|(category, group)| {
            let total = group.len();
            let correct = group.iter().filter(|r| r.correct).count();

            let mut tool_counts: HashMap<String, usize> = HashMap::new();
            for result in &group {
                for tool in result.unique_tools() {
                    *tool_counts.entry(tool.to_string()).or_default() += 1;
                }
            }

            CategoryPerformance {
                category,
                total,
                correct,
                accuracy: percentage(correct, total),
                avg_steps: mean(group.iter().map(|r| r.steps as f64)),
                avg_duration_ms: mean(group.iter().map(|r| r.duration_ms as f64)),
                top_tools: top_counts(tool_counts, TOP_N),
                level_accuracy: LevelAccuracy {
                    level1: level_accuracy(&group, 1),
                    level2: level_accuracy(&group, 2),
                    level3: level_accuracy(&group, 3),
                },
            }
        })
        .collect();

    rows.sort_by(|a, b| b.total.cmp(&a.total));
    rows
}

// ---------------------------------------------------------------------------
// Combined report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummary {
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub avg_steps: f64,
    pub avg_duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub summary: OverallSummary,
    pub weaknesses: Vec<Weakness>,
    pub tool_usage: Vec<ToolStats>,
    pub failure_patterns: Vec<FailurePattern>,
    pub category_performance: Vec<CategoryPerformance>,
    pub recommendations: Vec<String>,
}

const LOW_ACCURACY_ADVICE: &str =
    "Overall accuracy is below 50%: fix the weakest categories before tuning prompts";
const MEDIUM_ACCURACY_ADVICE: &str =
    "Overall accuracy is below 70%: retry the wrong-answers ledger and look for recurring mistakes";

pub fn generate_analysis_report(results: &[TaskResult], tasks: &TaskIndex) -> AnalysisReport {
    let total = results.len();
    let correct = results.iter().filter(|r| r.correct).count();
    let summary = OverallSummary {
        total,
        correct,
        accuracy: percentage(correct, total),
        avg_steps: mean(results.iter().map(|r| r.steps as f64)),
        avg_duration_ms: mean(results.iter().map(|r| r.duration_ms as f64)),
    };

    let weaknesses = detect_weaknesses(results, tasks);
    let tool_usage = analyze_tool_usage(results);
    let failure_patterns = recognize_failure_patterns(results, tasks);
    let category_performance = analyze_category_performance(results, tasks);

    let mut recommendations = Vec::new();
    if summary.accuracy < 50.0 {
        recommendations.push(LOW_ACCURACY_ADVICE.to_string());
    }
    if summary.accuracy < 70.0 {
        recommendations.push(MEDIUM_ACCURACY_ADVICE.to_string());
    }
    recommendations.extend(weaknesses.iter().take(3).map(|w| w.recommendation.clone()));
    recommendations.extend(
        failure_patterns
            .iter()
            .take(2)
            .map(|p| format!("{}: {}", p.pattern, p.suggested_fix)),
    );

    let unreliable: Vec<&str> = tool_usage
        .iter()
        .filter(|t| {
            t.success_rate < UNRELIABLE_TOOL_RATE && t.usage_count > UNRELIABLE_TOOL_MIN_USES
        })
        .map(|t| t.tool.as_str())
        .collect();
    if !unreliable.is_empty() {
        recommendations.push(format!(
            "Low success rate (<50%) when using: {}. Review these tools' reliability",
            unreliable.join(", ")
        ));
    }

    AnalysisReport {
        summary,
        weaknesses,
        tool_usage,
        failure_patterns,
        category_performance,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskFile;

    fn result(id: &str, level: u8, correct: bool, steps: usize, tools: &[&str]) -> TaskResult {
        TaskResult {
            task_id: id.into(),
            question: "What is the capital of France?".into(),
            level,
            files_attached: Vec::new(),
            answer: "x".into(),
            expected_answer: Some("y".into()),
            correct,
            duration_ms: 1000,
            steps,
            step_details: Vec::new(),
            tools_used: tools.iter().map(|t| t.to_string()).collect(),
            error: None,
            summary: None,
            metadata: None,
        }
    }

    fn file_task(id: &str) -> Task {
        Task::new(id, 1, "Summarize the attachment")
            .with_file(TaskFile::new("a.pdf", "/tmp/a.pdf", "application/pdf"))
    }

    #[test]
    fn test_files_category_critical() {
        let tasks: Vec<Task> = (0..10).map(|i| file_task(&format!("f{i}"))).collect();
        let index = index_tasks(&tasks);
        let results: Vec<TaskResult> = (0..10)
            .map(|i| result(&format!("f{i}"), 1, i < 2, 3, &["read_file"]))
            .collect();

        let weaknesses = detect_weaknesses(&results, &index);
        let files = weaknesses
            .iter()
            .find(|w| w.category == Category::Files)
            .unwrap();
        assert_eq!(files.accuracy, 20.0);
        assert_eq!(files.severity, Severity::Critical);
        assert!(files.recommendation.starts_with("CRITICAL: "));
    }

    #[test]
    fn test_weaknesses_threshold_and_order() {
        let tasks = vec![
            Task::new("c1", 1, "Calculate 3*3"),
            Task::new("c2", 1, "Calculate 4*4"),
            Task::new("s1", 1, "Search the website"),
            Task::new("s2", 1, "Search the journal"),
            Task::new("s3", 1, "Search arxiv"),
            Task::new("r1", 1, "Who wrote Hamlet?"),
            Task::new("r2", 1, "Who painted it?"),
            Task::new("r3", 1, "Who said it?"),
            Task::new("r4", 1, "Who is he?"),
            Task::new("r5", 1, "Who is she?"),
        ];
        let index = index_tasks(&tasks);
        let results = vec![
            // code: 0/2 -> 0%
            result("c1", 1, false, 1, &[]),
            result("c2", 1, false, 1, &[]),
            // search: 1/3 -> 33%
            result("s1", 1, true, 1, &[]),
            result("s2", 1, false, 1, &[]),
            result("s3", 1, false, 1, &[]),
            // reasoning: 3/5 -> 60%, not a weakness
            result("r1", 1, true, 1, &[]),
            result("r2", 1, true, 1, &[]),
            result("r3", 1, true, 1, &[]),
            result("r4", 1, false, 1, &[]),
            result("r5", 1, false, 1, &[]),
        ];

        let weaknesses = detect_weaknesses(&results, &index);
        assert_eq!(weaknesses.len(), 2);
        assert_eq!(weaknesses[0].category, Category::Code);
        assert_eq!(weaknesses[1].category, Category::Search);
        assert_eq!(weaknesses[1].severity, Severity::Moderate);
        assert!(weaknesses.iter().all(|w| w.accuracy < WEAKNESS_THRESHOLD));
    }

    #[test]
    fn test_excessive_steps_counts_exactly() {
        let index = TaskIndex::new();
        let results: Vec<TaskResult> = (0..6)
            .map(|i| result(&format!("t{i}"), 1, false, 12, &["web_search", "web_fetch"]))
            .collect();

        let patterns = recognize_failure_patterns(&results, &index);
        let excessive = patterns
            .iter()
            .find(|p| p.pattern == PatternKind::ExcessiveSteps)
            .unwrap();
        assert_eq!(excessive.occurrences, 6);
        assert!(patterns
            .iter()
            .all(|p| p.pattern != PatternKind::SearchWithoutVerification));
    }

    #[test]
    fn test_patterns_ignore_errors_and_successes() {
        let index = TaskIndex::new();
        let mut errored = result("e", 1, false, 11, &[]);
        errored.error = Some("boom".into());
        let results = vec![errored, result("ok", 1, true, 20, &[])];
        assert!(recognize_failure_patterns(&results, &index).is_empty());
    }

    #[test]
    fn test_steps_at_limit_not_excessive() {
        let index = TaskIndex::new();
        let results = vec![result("t", 1, false, 10, &["calc"])];
        let patterns = recognize_failure_patterns(&results, &index);
        assert!(patterns.iter().all(|p| p.pattern != PatternKind::ExcessiveSteps));
    }

    #[test]
    fn test_search_without_verification_and_no_tools() {
        let index = TaskIndex::new();
        let results = vec![
            result("a", 1, false, 2, &["web_search"]),
            result("b", 1, false, 2, &["web_search", "web_fetch"]),
            result("c", 1, false, 1, &[]),
        ];
        let patterns = recognize_failure_patterns(&results, &index);
        let search = patterns
            .iter()
            .find(|p| p.pattern == PatternKind::SearchWithoutVerification)
            .unwrap();
        assert_eq!(search.affected_tasks, vec!["a"]);
        let none = patterns
            .iter()
            .find(|p| p.pattern == PatternKind::NoToolsUsed)
            .unwrap();
        assert_eq!(none.affected_tasks, vec!["c"]);
    }

    #[test]
    fn test_level_3_needs_more_than_five() {
        let index = TaskIndex::new();
        let five: Vec<TaskResult> = (0..5)
            .map(|i| result(&format!("t{i}"), 3, false, 2, &["calc"]))
            .collect();
        let patterns = recognize_failure_patterns(&five, &index);
        assert!(patterns.iter().all(|p| p.pattern != PatternKind::Level3Difficulty));

        let six: Vec<TaskResult> = (0..6)
            .map(|i| result(&format!("t{i}"), 3, false, 2, &["calc"]))
            .collect();
        let patterns = recognize_failure_patterns(&six, &index);
        let level3 = patterns
            .iter()
            .find(|p| p.pattern == PatternKind::Level3Difficulty)
            .unwrap();
        assert_eq!(level3.occurrences, 6);
    }

    #[test]
    fn test_file_processing_failure_from_result_when_task_unknown() {
        let index = TaskIndex::new();
        let mut r = result("t", 1, false, 2, &["read_file"]);
        r.files_attached = vec!["a.xlsx".into()];
        let patterns = recognize_failure_patterns(&[r], &index);
        assert!(patterns
            .iter()
            .any(|p| p.pattern == PatternKind::FileProcessingFailure));
    }

    #[test]
    fn test_tool_usage_counts_once_per_result() {
        let results = vec![
            result("a", 1, true, 4, &["search", "search", "fetch"]),
            result("b", 1, false, 2, &["search", "python"]),
            result("c", 1, false, 6, &["search", "fetch"]),
        ];
        let stats = analyze_tool_usage(&results);

        assert_eq!(stats[0].tool, "search");
        assert_eq!(stats[0].usage_count, 3);
        assert_eq!(stats[0].success_count, 1);
        assert_eq!(stats[0].failure_count, 2);
        assert_eq!(stats[0].avg_steps, 4.0);
        assert_eq!(
            stats[0].co_occurring,
            vec![
                ToolCount {
                    tool: "fetch".into(),
                    count: 2
                },
                ToolCount {
                    tool: "python".into(),
                    count: 1
                },
            ]
        );
        assert_eq!(stats[1].tool, "fetch");
        assert_eq!(stats[1].usage_count, 2);
    }

    #[test]
    fn test_category_performance_levels() {
        let tasks = vec![
            Task::new("a", 1, "Calculate 1+1"),
            Task::new("b", 3, "Calculate 2+2"),
            Task::new("c", 1, "Who?"),
        ];
        let index = index_tasks(&tasks);
        let results = vec![
            result("a", 1, true, 2, &["python"]),
            result("b", 3, false, 4, &["python", "search"]),
            result("c", 1, true, 1, &[]),
        ];

        let rows = analyze_category_performance(&results, &index);
        assert_eq!(rows[0].category, Category::Code);
        assert_eq!(rows[0].total, 2);
        assert_eq!(rows[0].avg_steps, 3.0);
        assert_eq!(rows[0].top_tools[0].tool, "python");
        assert_eq!(rows[0].level_accuracy.level1, Some(100.0));
        assert_eq!(rows[0].level_accuracy.level2, None);
        assert_eq!(rows[0].level_accuracy.level3, Some(0.0));

        let json = serde_json::to_value(&rows[0].level_accuracy).unwrap();
        assert!(json.get("level2").is_none());
    }

    #[test]
    fn test_report_recommendations() {
        let results: Vec<TaskResult> = (0..5)
            .map(|i| result(&format!("t{i}"), 1, false, 12, &["flaky_search"]))
            .collect();
        let report = generate_analysis_report(&results, &TaskIndex::new());

        assert_eq!(report.summary.total, 5);
        assert_eq!(report.summary.accuracy, 0.0);
        assert_eq!(report.summary.avg_steps, 12.0);
        assert_eq!(report.recommendations[0], LOW_ACCURACY_ADVICE);
        assert_eq!(report.recommendations[1], MEDIUM_ACCURACY_ADVICE);
        assert!(report
            .recommendations
            .iter()
            .any(|r| r.starts_with("CRITICAL: ")));
        assert!(report
            .recommendations
            .last()
            .unwrap()
            .contains("flaky_search"));
    }

    #[test]
    fn test_report_on_empty_results() {
        let report = generate_analysis_report(&[], &TaskIndex::new());
        assert_eq!(report.summary.total, 0);
        assert_eq!(report.summary.avg_duration_ms, 0.0);
        assert!(report.weaknesses.is_empty());
        assert!(report.tool_usage.is_empty());
    }

    #[test]
    fn test_pattern_kind_serializes_snake_case() {
        let v = serde_json::to_value(PatternKind::Level3Difficulty).unwrap();
        assert_eq!(v, "level_3_difficulty");
        let v = serde_json::to_value(PatternKind::SearchWithoutVerification).unwrap();
        assert_eq!(v, "search_without_verification");
    }
}
