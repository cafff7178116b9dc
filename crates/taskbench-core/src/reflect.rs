//! Reflective evaluation: answer, self-review, and retry while the agent's
//! own confidence stays low.
//!
//! Extraction of the final answer and confidence is regex-based and
//! best-effort. Correctness is still decided by [`crate::answer::is_correct`]
//! on whatever answer comes out.

use std::time::Instant;

use tracing::{debug, warn};

use crate::agent::{Agent, Message, StepRecord};
use crate::answer::{extract_confidence, extract_final_answer, is_correct};
use crate::evaluator::{build_messages, error_result, extract_trace, EvalOptions};
use crate::result::{ResultMetadata, TaskResult};
use crate::task::Task;

const REFLECTION_PROMPT: &str = "\
Review your previous answer critically. Check the reasoning, the sources you used, \
and whether the answer matches exactly what the question asks for.\n\
Reply with two lines at the end:\n\
CONFIDENCE: <0-100>\n\
FINAL ANSWER: <the answer only, no explanation>";

#[derive(Debug, Clone)]
pub struct ReflectionOptions {
    /// Upper bound on answer attempts, including the first one.
    pub max_attempts: u32,
    /// Stop once the reflection reports at least this confidence.
    pub confidence_threshold: u8,
}

impl Default for ReflectionOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            confidence_threshold: 80,
        }
    }
}

/// Evaluate with self-reflection. Buffered generation only. Like
/// [`crate::evaluator::evaluate`], never fails.
pub fn evaluate_with_reflection(
    task: &Task,
    agent: &dyn Agent,
    options: &EvalOptions,
    reflection: &ReflectionOptions,
) -> TaskResult {
    let start = Instant::now();
    let base = build_messages(task, options.instructions.as_deref());

    let mut all_steps: Vec<StepRecord> = Vec::new();
    let mut attempts = 0u32;
    let mut best: Option<String> = None;
    let mut confidence: Option<u8> = None;
    let mut final_reflection: Option<String> = None;
    let mut feedback: Option<(String, String)> = None;

    while attempts < reflection.max_attempts.max(1) {
        attempts += 1;

        let mut messages = base.clone();
        if let Some((previous, critique)) = &feedback {
            messages.push(Message::assistant(previous.clone()));
            messages.push(Message::user(format!(
                "Your self-review was not confident in that answer:\n{critique}\n\n\
                 Solve the original question again and give a corrected answer."
            )));
        }

        let generation = match agent.generate(&messages) {
            Ok(g) => g,
            Err(e) if best.is_none() => {
                warn!("task {} failed on attempt {attempts}: {e}", task.id);
                let mut result =
                    error_result(task, e.to_string(), start.elapsed().as_millis() as u64);
                result.metadata = Some(ResultMetadata {
                    attempts: Some(attempts),
                    ..ResultMetadata::default()
                });
                return result;
            }
            Err(e) => {
                warn!("task {} attempt {attempts} failed, keeping earlier answer: {e}", task.id);
                break;
            }
        };
        all_steps.extend(generation.steps);
        let answer_text = generation.text.trim().to_string();
        let candidate = extract_final_answer(&answer_text).unwrap_or_else(|| answer_text.clone());
        best = Some(candidate.clone());

        messages.push(Message::assistant(answer_text.clone()));
        messages.push(Message::user(REFLECTION_PROMPT));
        let review = match agent.generate(&messages) {
            Ok(r) => r,
            Err(e) => {
                warn!("reflection for task {} failed: {e}", task.id);
                break;
            }
        };
        all_steps.extend(review.steps);

        confidence = extract_confidence(&review.text);
        if let Some(revised) = extract_final_answer(&review.text) {
            best = Some(revised);
        }
        debug!(
            "task {} attempt {attempts}: confidence {:?}",
            task.id, confidence
        );
        final_reflection = Some(review.text.clone());

        if confidence.unwrap_or(0) >= reflection.confidence_threshold {
            break;
        }
        feedback = Some((answer_text, review.text));
    }

    let answer = best.unwrap_or_default();
    let trace = extract_trace(&all_steps);
    TaskResult {
        task_id: task.id.clone(),
        question: task.question.clone(),
        level: task.level,
        files_attached: task.files.iter().map(|f| f.name.clone()).collect(),
        correct: is_correct(&answer, task.expected_answer.as_deref()),
        answer,
        expected_answer: task.expected_answer.clone(),
        duration_ms: start.elapsed().as_millis() as u64,
        steps: all_steps.len(),
        step_details: trace.step_details,
        tools_used: trace.tools_used,
        error: None,
        summary: Some(trace.summary),
        metadata: Some(ResultMetadata {
            attempts: Some(attempts),
            confidence,
            final_reflection,
        }),
    }
}
