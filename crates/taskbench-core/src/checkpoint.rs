//! Task selection and resume planning for one dataset-scoped run.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::categorize::{categorize, Category};
use crate::result::{Snapshot, TaskResult};
use crate::task::Task;

/// Narrowing applied to the dataset before a run.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub level: Option<u8>,
    pub category: Option<Category>,
    pub limit: Option<usize>,
    /// Shuffle before the limit applies.
    pub random: bool,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if self.level.is_some_and(|l| task.level != l) {
            return false;
        }
        match self.category {
            Some(c) => categorize(task).contains(&c),
            None => true,
        }
    }

    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        self.apply_with_rng(tasks, &mut rand::thread_rng())
    }

    pub fn apply_with_rng<R: Rng + ?Sized>(&self, tasks: &[Task], rng: &mut R) -> Vec<Task> {
        let mut selected: Vec<Task> = tasks.iter().filter(|t| self.matches(t)).cloned().collect();
        if self.random {
            selected.shuffle(rng);
        }
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }
}

/// Which tasks still need running, and what a previous attempt left behind.
#[derive(Debug, Clone)]
pub struct ResumePlan {
    /// Results carried over from the checkpoint, in their original order.
    pub carried: Vec<TaskResult>,
    /// Tasks not yet completed, in selection order.
    pub remaining: Vec<Task>,
}

impl ResumePlan {
    pub fn fresh(tasks: Vec<Task>) -> Self {
        Self {
            carried: Vec::new(),
            remaining: tasks,
        }
    }

    /// Skip every task the checkpoint already has a result for. A task that
    /// errored still counts as completed.
    pub fn from_checkpoint(tasks: Vec<Task>, checkpoint: Option<Snapshot>) -> Self {
        let Some(checkpoint) = checkpoint else {
            return Self::fresh(tasks);
        };
        let completed: HashSet<&str> = checkpoint
            .results
            .iter()
            .map(|r| r.task_id.as_str())
            .collect();
        let remaining = tasks
            .into_iter()
            .filter(|t| !completed.contains(t.id.as_str()))
            .collect();
        Self {
            carried: checkpoint.results,
            remaining,
        }
    }

    pub fn is_resuming(&self) -> bool {
        !self.carried.is_empty()
    }

    pub fn total(&self) -> usize {
        self.carried.len() + self.remaining.len()
    }

    /// `(completed_so_far, total)` once the task at `index` in `remaining` finishes.
    pub fn progress(&self, index: usize) -> (usize, usize) {
        (self.carried.len() + index + 1, self.total())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::result::RunInfo;
    use crate::task::TaskFile;

    fn dataset(n: usize) -> Vec<Task> {
        (0..n)
            .map(|i| Task::new(format!("t{i}"), (i % 3 + 1) as u8, format!("question {i}")))
            .collect()
    }

    fn done(id: &str) -> TaskResult {
        TaskResult {
            task_id: id.into(),
            question: "q".into(),
            level: 1,
            files_attached: Vec::new(),
            answer: String::new(),
            expected_answer: None,
            correct: false,
            duration_ms: 0,
            steps: 0,
            step_details: Vec::new(),
            tools_used: Vec::new(),
            error: Some("timed out".into()),
            summary: None,
            metadata: None,
        }
    }

    #[test]
    fn test_resume_skips_completed() {
        let tasks = dataset(10);
        let run = RunInfo::new("gaia", "a", "m", "run");
        let checkpoint = Snapshot::new(&run, vec![done("t0"), done("t3"), done("t7")], true);

        let plan = ResumePlan::from_checkpoint(tasks, Some(checkpoint));
        assert!(plan.is_resuming());
        assert_eq!(plan.remaining.len(), 7);
        assert_eq!(plan.total(), 10);
        assert!(plan.remaining.iter().all(|t| !["t0", "t3", "t7"].contains(&t.id.as_str())));
        assert_eq!(plan.progress(0), (4, 10));
        assert_eq!(plan.progress(6), (10, 10));
    }

    #[test]
    fn test_no_checkpoint_is_fresh() {
        let plan = ResumePlan::from_checkpoint(dataset(4), None);
        assert!(!plan.is_resuming());
        assert_eq!(plan.total(), 4);
        assert_eq!(plan.progress(0), (1, 4));
    }

    #[test]
    fn test_filter_by_level_and_limit() {
        let filter = TaskFilter {
            level: Some(2),
            limit: Some(2),
            ..TaskFilter::default()
        };
        let picked = filter.apply(&dataset(9));
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|t| t.level == 2));
        assert_eq!(picked[0].id, "t1");
    }

    #[test]
    fn test_filter_by_category() {
        let tasks = vec![
            Task::new("a", 1, "Calculate 2+2"),
            Task::new("b", 1, "Who is the king?"),
            Task::new("c", 1, "Describe it").with_file(TaskFile::new("x.png", "/x.png", "image/png")),
        ];
        let filter = TaskFilter {
            category: Some(Category::Files),
            ..TaskFilter::default()
        };
        let picked = filter.apply(&tasks);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, "c");
    }

    #[test]
    fn test_random_shuffles_before_limit() {
        let tasks = dataset(20);
        let filter = TaskFilter {
            random: true,
            limit: Some(20),
            ..TaskFilter::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        let shuffled = filter.apply_with_rng(&tasks, &mut rng);
        assert_eq!(shuffled.len(), 20);
        let mut ids: Vec<_> = shuffled.iter().map(|t| t.id.clone()).collect();
        let original: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
        assert_ne!(ids, original);
        ids.sort();
        let mut sorted = original;
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
