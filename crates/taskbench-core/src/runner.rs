//! Sequential benchmark run: select, resume, evaluate, persist, merge, report.
//!
//! Only agent errors reach individual results. Storage problems are logged
//! and the run carries on; the benchmark data already on disk stays valid.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::agent::Agent;
use crate::analytics::{generate_analysis_report, index_tasks, AnalysisReport};
use crate::checkpoint::{ResumePlan, TaskFilter};
use crate::evaluator::{evaluate, truncate, EvalOptions};
use crate::ledger::{merge_results, select_retry_tasks, MergeSummary, WrongAnswersCollection};
use crate::reflect::{evaluate_with_reflection, ReflectionOptions};
use crate::result::{RunInfo, Snapshot, TaskResult};
use crate::store::{DocumentationSink, LedgerStore, ResultStore};
use crate::task::Task;

pub const DEFAULT_TASK_DELAY: Duration = Duration::from_millis(1000);

/// Everything a run needs besides its collaborators. Plain data.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub dataset: String,
    pub filter: TaskFilter,
    pub resume: bool,
    pub eval: EvalOptions,
    /// Use the reflective evaluator when set.
    pub reflection: Option<ReflectionOptions>,
    /// Pause between consecutive tasks.
    pub task_delay: Duration,
    /// Label recorded in snapshots and the documentation sink (`run`, `retry`).
    pub command: String,
    pub provider_summary: String,
}

impl RunConfig {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            filter: TaskFilter::default(),
            resume: false,
            eval: EvalOptions::default(),
            reflection: None,
            task_delay: DEFAULT_TASK_DELAY,
            command: "run".to_string(),
            provider_summary: "default".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    /// Final snapshot: checkpoint carry-over followed by this run's results.
    pub snapshot: Snapshot,
    /// `None` when the final snapshot could not be written.
    pub snapshot_path: Option<PathBuf>,
    pub merge: MergeSummary,
    pub report: AnalysisReport,
}

pub struct Runner<'a> {
    agent: &'a dyn Agent,
    results: &'a dyn ResultStore,
    ledger: &'a dyn LedgerStore,
    docs: Option<&'a dyn DocumentationSink>,
    config: RunConfig,
}

impl<'a> Runner<'a> {
    pub fn new(
        agent: &'a dyn Agent,
        results: &'a dyn ResultStore,
        ledger: &'a dyn LedgerStore,
        config: RunConfig,
    ) -> Self {
        Self {
            agent,
            results,
            ledger,
            docs: None,
            config,
        }
    }

    pub fn with_docs(mut self, docs: &'a dyn DocumentationSink) -> Self {
        self.docs = Some(docs);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run the filtered dataset, skipping tasks a checkpoint already covers
    /// when resuming.
    pub fn run(&self, dataset: &[Task]) -> RunOutcome {
        let selected = self.config.filter.apply(dataset);
        self.execute(dataset, selected)
    }

    /// Re-run only the tasks the ledger lists as wrong, narrowed by the
    /// filter's level and limit.
    pub fn retry(&self, dataset: &[Task]) -> RunOutcome {
        let ledger = self.load_ledger();
        let selected = select_retry_tasks(
            &ledger,
            dataset,
            self.config.filter.level,
            self.config.filter.limit,
        );
        info!(
            "{} of {} ledger entries are in the dataset",
            selected.len(),
            ledger.tasks.len()
        );
        self.execute(dataset, selected)
    }

    fn plan(&self, selected: Vec<Task>) -> ResumePlan {
        if !self.config.resume {
            return ResumePlan::fresh(selected);
        }
        let checkpoint = match self.results.load_checkpoint() {
            Ok(c) => c,
            Err(e) => {
                warn!("ignoring unreadable checkpoint: {e}");
                None
            }
        };
        let plan = ResumePlan::from_checkpoint(selected, checkpoint);
        if plan.is_resuming() {
            println!(
                "Resuming: {} completed, {} remaining",
                plan.carried.len(),
                plan.remaining.len()
            );
        }
        plan
    }

    fn evaluate_one(&self, task: &Task) -> TaskResult {
        match &self.config.reflection {
            Some(reflection) => {
                evaluate_with_reflection(task, self.agent, &self.config.eval, reflection)
            }
            None => evaluate(task, self.agent, &self.config.eval),
        }
    }

    fn execute(&self, dataset: &[Task], selected: Vec<Task>) -> RunOutcome {
        let run = RunInfo::new(
            self.config.dataset.as_str(),
            self.agent.name(),
            self.agent.model(),
            self.config.command.as_str(),
        );
        let plan = self.plan(selected);
        let mut results = plan.carried.clone();

        for (index, task) in plan.remaining.iter().enumerate() {
            let (done, total) = plan.progress(index);
            println!("[{done}/{total}] {} (level {})", task.id, task.level);

            let result = self.evaluate_one(task);
            print_outcome(&result);
            results.push(result);

            let snapshot = Snapshot::new(&run, results.clone(), true);
            if let Err(e) = self.results.save_incremental(&snapshot) {
                warn!("incremental save failed after {}: {e}", task.id);
            }

            if index + 1 < plan.remaining.len() && !self.config.task_delay.is_zero() {
                thread::sleep(self.config.task_delay);
            }
        }

        self.complete(&run, dataset, results)
    }

    fn complete(&self, run: &RunInfo, dataset: &[Task], results: Vec<TaskResult>) -> RunOutcome {
        let snapshot = Snapshot::new(run, results, false);
        let snapshot_path = match self.results.save_final(&snapshot) {
            Ok(path) => {
                info!("saved final snapshot to {}", path.display());
                Some(path)
            }
            Err(e) => {
                error!("final snapshot not saved: {e}");
                None
            }
        };

        let index = index_tasks(dataset);
        let mut ledger = self.load_ledger();
        let merge = merge_results(&mut ledger, &snapshot.results, &index, Utc::now());
        for id in &merge.removed {
            println!("Removed {id} from wrong answers");
        }
        if let Err(e) = self.ledger.save(&ledger) {
            error!("wrong-answers ledger not saved: {e}");
        }

        if let Some(docs) = self.docs {
            let link = snapshot_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            if let Err(e) = docs.record_run(
                &self.config.command,
                &snapshot.metadata,
                &self.config.provider_summary,
                &link,
            ) {
                warn!("documentation update failed: {e}");
            }
        }

        let report = generate_analysis_report(&snapshot.results, &index);
        RunOutcome {
            snapshot,
            snapshot_path,
            merge,
            report,
        }
    }

    fn load_ledger(&self) -> WrongAnswersCollection {
        self.ledger.load().unwrap_or_else(|e| {
            warn!("starting from an empty wrong-answers ledger: {e}");
            WrongAnswersCollection::default()
        })
    }
}

fn print_outcome(result: &TaskResult) {
    let secs = result.duration_ms as f64 / 1000.0;
    if let Some(err) = &result.error {
        println!("  ERROR {err} ({secs:.1}s)");
        return;
    }
    let mark = if result.correct { "PASS" } else { "FAIL" };
    println!(
        "  {mark} {:?} (expected {:?}) {secs:.1}s, {} steps",
        truncate(&result.answer, 80),
        result.expected_answer.as_deref().unwrap_or("-"),
        result.steps
    );
}
