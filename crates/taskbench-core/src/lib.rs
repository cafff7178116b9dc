pub mod agent;
pub mod analytics;
pub mod answer;
pub mod categorize;
pub mod checkpoint;
pub mod error;
pub mod evaluator;
pub mod ledger;
pub mod provider;
pub mod reflect;
pub mod result;
pub mod runner;
pub mod store;
pub mod task;

pub use agent::{Agent, AgentStream, Generation, Message, StepRecord, ToolCall, ToolOutput};
pub use analytics::{generate_analysis_report, index_tasks, AnalysisReport};
pub use answer::{extract_confidence, extract_final_answer, is_correct, normalize};
pub use categorize::{categorize, Category};
pub use checkpoint::{ResumePlan, TaskFilter};
pub use error::{BenchError, BenchResult};
pub use evaluator::{evaluate, EvalOptions};
pub use ledger::{merge_results, MergeSummary, WrongAnswerEntry, WrongAnswersCollection};
pub use provider::{ProviderSelection, ProviderSlot};
pub use reflect::{evaluate_with_reflection, ReflectionOptions};
pub use result::{RunInfo, Snapshot, SnapshotMetadata, TaskResult};
pub use runner::{RunConfig, RunOutcome, Runner};
pub use store::{DocumentationSink, LedgerStore, ResultStore};
pub use task::{Task, TaskFile};
