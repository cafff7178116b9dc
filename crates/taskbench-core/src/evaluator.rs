//! Drives one task through the agent and turns the outcome into a [`TaskResult`].

use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::{
    Agent, AgentStream, ContentPart, Generation, Message, MessageContent, Role, StepRecord,
};
use crate::answer::is_correct;
use crate::error::BenchResult;
use crate::result::{ResultSummary, StepDetail, TaskResult, ToolCallTrace, ToolResultTrace};
use crate::task::Task;

/// Keys providers attach to tool-call arguments for their own bookkeeping.
const INTERNAL_ARG_KEYS: &[&str] = &[
    "providerOptions",
    "providerMetadata",
    "experimental_providerMetadata",
];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct EvalOptions {
    pub verbose: bool,
    pub stream: bool,
    /// How often the streaming poller samples the step list.
    pub poll_interval: Duration,
    /// Sent as a system message ahead of every task when set.
    pub instructions: Option<String>,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            stream: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            instructions: None,
        }
    }
}

/// Build the message payload for a task: plain text without attachments,
/// otherwise the question plus one part per file.
pub fn build_messages(task: &Task, instructions: Option<&str>) -> Vec<Message> {
    let mut messages = Vec::new();
    if let Some(instructions) = instructions {
        messages.push(Message::system(instructions));
    }

    if !task.has_files() {
        messages.push(Message::user(task.question.clone()));
        return messages;
    }

    let mut parts = vec![ContentPart::Text {
        text: task.question.clone(),
    }];
    for file in &task.files {
        if file.is_image() {
            parts.push(ContentPart::Image {
                image: file.path.clone(),
                mime_type: file.mime_type.clone(),
            });
        } else {
            let mut text = format!(
                "[Attached file: {} ({}) at {}]",
                file.name, file.mime_type, file.path
            );
            if let Some(data) = &file.inline_data {
                text.push('\n');
                text.push_str(data);
            }
            parts.push(ContentPart::Text { text });
        }
    }
    messages.push(Message {
        role: Role::User,
        content: MessageContent::Parts(parts),
    });
    messages
}

/// Evaluate one task. Never fails: agent errors become an incorrect result
/// carrying `error`, and no retry happens here.
pub fn evaluate(task: &Task, agent: &dyn Agent, options: &EvalOptions) -> TaskResult {
    let messages = build_messages(task, options.instructions.as_deref());
    let start = Instant::now();

    let outcome = if options.stream {
        run_streaming(agent, &messages, options)
    } else {
        agent.generate(&messages)
    };
    let duration_ms = start.elapsed().as_millis() as u64;

    match outcome {
        Ok(generation) => {
            let result = result_from_generation(task, generation, duration_ms);
            if options.verbose {
                print_step_details(&result.step_details);
            }
            result
        }
        Err(e) => {
            warn!("task {} failed: {e}", task.id);
            error_result(task, e.to_string(), duration_ms)
        }
    }
}

/// Consume the text stream while a cooperative poller samples the step list
/// at a fixed interval. Both are drained before returning.
fn run_streaming(
    agent: &dyn Agent,
    messages: &[Message],
    options: &EvalOptions,
) -> BenchResult<Generation> {
    let stream = agent.stream(messages)?;
    poll_stream(stream, options.poll_interval, print_new_steps)
}

/// Drain `stream`, handing steps that appeared since the previous sample to
/// `on_new_steps` at most once per `poll_interval`, and once more at the end.
fn poll_stream(
    mut stream: Box<dyn AgentStream + '_>,
    poll_interval: Duration,
    mut on_new_steps: impl FnMut(&[StepRecord]),
) -> BenchResult<Generation> {
    let mut text = String::new();
    let mut seen_steps = 0;
    let mut last_poll = Instant::now();

    while let Some(chunk) = stream.next_chunk() {
        text.push_str(&chunk?);
        if last_poll.elapsed() >= poll_interval {
            seen_steps = sample_steps(stream.steps_so_far(), seen_steps, &mut on_new_steps);
            last_poll = Instant::now();
        }
    }
    sample_steps(stream.steps_so_far(), seen_steps, &mut on_new_steps);

    let steps = stream.finish()?;
    debug!("stream finished: {} chars, {} steps", text.len(), steps.len());
    Ok(Generation { text, steps })
}

fn sample_steps(
    steps: &[StepRecord],
    seen: usize,
    on_new_steps: &mut impl FnMut(&[StepRecord]),
) -> usize {
    if steps.len() > seen {
        on_new_steps(&steps[seen..]);
    }
    steps.len().max(seen)
}

fn print_new_steps(steps: &[StepRecord]) {
    for step in steps {
        for call in &step.tool_calls {
            eprintln!("    -> {}", call.tool_name);
        }
        for output in &step.tool_results {
            let status = if output.is_error() { "error" } else { "done" };
            eprintln!("    <- {} ({status})", output.tool_name);
        }
    }
}

pub(crate) fn result_from_generation(
    task: &Task,
    generation: Generation,
    duration_ms: u64,
) -> TaskResult {
    let trace = extract_trace(&generation.steps);
    let answer = generation.text.trim().to_string();
    let correct = is_correct(&answer, task.expected_answer.as_deref());

    TaskResult {
        task_id: task.id.clone(),
        question: task.question.clone(),
        level: task.level,
        files_attached: task.files.iter().map(|f| f.name.clone()).collect(),
        answer,
        expected_answer: task.expected_answer.clone(),
        correct,
        duration_ms,
        steps: generation.steps.len(),
        step_details: trace.step_details,
        tools_used: trace.tools_used,
        error: None,
        summary: Some(trace.summary),
        metadata: None,
    }
}

pub(crate) fn error_result(task: &Task, error: String, duration_ms: u64) -> TaskResult {
    TaskResult {
        task_id: task.id.clone(),
        question: task.question.clone(),
        level: task.level,
        files_attached: task.files.iter().map(|f| f.name.clone()).collect(),
        answer: String::new(),
        expected_answer: task.expected_answer.clone(),
        correct: false,
        duration_ms,
        steps: 0,
        step_details: Vec::new(),
        tools_used: Vec::new(),
        error: Some(error),
        summary: None,
        metadata: None,
    }
}

/// Tool usage and per-step transcript pulled from raw step records.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub step_details: Vec<StepDetail>,
    pub tools_used: Vec<String>,
    pub summary: ResultSummary,
}

pub fn extract_trace(steps: &[StepRecord]) -> Trace {
    let mut step_details = Vec::with_capacity(steps.len());
    let mut tools_used: Vec<String> = Vec::new();
    let mut total_tool_calls = 0;
    let mut had_error = false;

    for (step_index, step) in steps.iter().enumerate() {
        let tool_calls: Vec<ToolCallTrace> = step
            .tool_calls
            .iter()
            .map(|call| ToolCallTrace {
                tool_name: call.tool_name.clone(),
                tool_call_id: call.tool_call_id.clone(),
                args: strip_internal_keys(&call.args),
            })
            .collect();
        total_tool_calls += tool_calls.len();
        for call in &tool_calls {
            if !tools_used.contains(&call.tool_name) {
                tools_used.push(call.tool_name.clone());
            }
        }

        let tool_results: Vec<ToolResultTrace> = step
            .tool_results
            .iter()
            .map(|output| {
                had_error |= output.is_error();
                ToolResultTrace {
                    tool_name: output.tool_name.clone(),
                    tool_call_id: output.tool_call_id.clone(),
                    result: output.result.clone(),
                }
            })
            .collect();

        step_details.push(StepDetail {
            step_index,
            tool_calls,
            tool_results,
            text: step.text.clone().filter(|t| !t.trim().is_empty()),
        });
    }

    Trace {
        summary: ResultSummary {
            total_tool_calls,
            unique_tools: tools_used.clone(),
            had_error,
        },
        step_details,
        tools_used,
    }
}

fn strip_internal_keys(args: &Value) -> Value {
    match args {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !INTERNAL_ARG_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn print_step_details(details: &[StepDetail]) {
    for step in details {
        eprintln!("  step {}", step.step_index + 1);
        for call in &step.tool_calls {
            eprintln!("    call {} {}", call.tool_name, truncate(&call.args.to_string(), 120));
        }
        for output in &step.tool_results {
            eprintln!(
                "    result {} {}",
                output.tool_name,
                truncate(&output.result.to_string(), 120)
            );
        }
        if let Some(text) = &step.text {
            eprintln!("    text {}", truncate(text, 120));
        }
    }
}

/// Cut to `max` characters, appending `...` when shortened.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}
