//! Agent adapter that drives an external process over stdio.
//!
//! The child receives one JSON request `{"messages": [...], "stream": bool}`
//! on stdin. Buffered mode expects a single `{"text", "steps"}` object on
//! stdout. Streaming mode expects JSON lines tagged by `type`: `text`
//! (`delta`), `step` (`step`), `error` (`message`) and finally `done`.

use std::io::{BufRead, BufReader, Lines, Read, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use taskbench_core::{
    Agent, AgentStream, BenchError, BenchResult, Generation, Message, ProviderSelection,
    StepRecord,
};

const WAIT_TICK: Duration = Duration::from_millis(50);
const STDERR_EXCERPT: usize = 500;

#[derive(Serialize)]
struct Request<'a> {
    messages: &'a [Message],
    stream: bool,
}

pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    name: String,
    model: String,
    timeout: Option<Duration>,
    env: Vec<(String, String)>,
}

impl CommandAgent {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            name: program.clone(),
            program,
            args,
            model: "unknown".into(),
            timeout: None,
            env: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Bound on buffered calls. Streaming calls are not bounded.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_providers(mut self, providers: &ProviderSelection) -> Self {
        self.env.extend(
            providers
                .env_vars()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        );
        self
    }

    fn spawn(&self, messages: &[Message], stream: bool) -> BenchResult<Child> {
        let request = serde_json::to_vec(&Request { messages, stream })?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("TASKBENCH_MODEL", &self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BenchError::Agent(format!("failed to spawn '{}': {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            thread::spawn(move || {
                if let Err(e) = stdin.write_all(&request) {
                    debug!("agent closed stdin early: {e}");
                }
            });
        }
        Ok(child)
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut out = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut out);
        }
        out
    })
}

fn join_output(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn excerpt(s: &str) -> String {
    s.trim().chars().take(STDERR_EXCERPT).collect()
}

impl Agent for CommandAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, messages: &[Message]) -> BenchResult<Generation> {
        let start = Instant::now();
        let mut child = self.spawn(messages, false)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if self.timeout.is_some_and(|t| start.elapsed() > t) {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(BenchError::Agent(format!(
                            "'{}' timed out after {}s",
                            self.program,
                            start.elapsed().as_secs()
                        )));
                    }
                    thread::sleep(WAIT_TICK);
                }
                Err(e) => {
                    return Err(BenchError::Agent(format!(
                        "error waiting for '{}': {e}",
                        self.program
                    )))
                }
            }
        };

        let stdout = join_output(stdout);
        let stderr = join_output(stderr);
        if !status.success() {
            return Err(BenchError::Agent(format!(
                "'{}' exited with {status}: {}",
                self.program,
                excerpt(&stderr)
            )));
        }

        serde_json::from_str(stdout.trim()).map_err(|e| {
            BenchError::Agent(format!(
                "unparseable agent output ({e}): {}",
                excerpt(&stdout)
            ))
        })
    }

    fn stream<'a>(&'a self, messages: &[Message]) -> BenchResult<Box<dyn AgentStream + 'a>> {
        let mut child = self.spawn(messages, true)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BenchError::Agent("agent stdout unavailable".into()))?;
        let stderr = drain(child.stderr.take());
        Ok(Box::new(CommandStream {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr: Some(stderr),
            steps: Vec::new(),
            done: false,
            reaped: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamEvent {
    Text { delta: String },
    Step { step: StepRecord },
    Error { message: String },
    Done,
}

struct CommandStream {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    steps: Vec<StepRecord>,
    done: bool,
    /// Set once `finish` has waited on the child.
    reaped: bool,
}

impl CommandStream {
    fn next_event(&mut self) -> Option<BenchResult<StreamEvent>> {
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(e) => return Some(Err(BenchError::Agent(format!("agent stream: {e}")))),
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|e| {
                BenchError::Agent(format!("bad stream event ({e}): {}", excerpt(&line)))
            }));
        }
    }
}

impl AgentStream for CommandStream {
    fn next_chunk(&mut self) -> Option<BenchResult<String>> {
        while !self.done {
            match self.next_event()? {
                Ok(StreamEvent::Text { delta }) => return Some(Ok(delta)),
                Ok(StreamEvent::Step { step }) => self.steps.push(step),
                Ok(StreamEvent::Error { message }) => {
                    self.done = true;
                    return Some(Err(BenchError::Agent(message)));
                }
                Ok(StreamEvent::Done) => self.done = true,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn steps_so_far(&self) -> &[StepRecord] {
        &self.steps
    }

    fn finish(mut self: Box<Self>) -> BenchResult<Vec<StepRecord>> {
        // Steps may still follow the last text chunk.
        while !self.done {
            match self.next_event() {
                Some(Ok(StreamEvent::Step { step })) => self.steps.push(step),
                Some(Ok(StreamEvent::Done)) | None => break,
                Some(Ok(StreamEvent::Text { .. })) => {}
                Some(Ok(StreamEvent::Error { message })) => {
                    return Err(BenchError::Agent(message));
                }
                Some(Err(e)) => warn!("ignoring trailing stream output: {e}"),
            }
        }

        let status = self
            .child
            .wait()
            .map_err(|e| BenchError::Agent(format!("error waiting for agent: {e}")))?;
        self.reaped = true;
        let stderr = self.stderr.take().map(join_output).unwrap_or_default();
        if !status.success() {
            return Err(BenchError::Agent(format!(
                "agent exited with {status}: {}",
                excerpt(&stderr)
            )));
        }
        Ok(std::mem::take(&mut self.steps))
    }
}

impl Drop for CommandStream {
    // A stream abandoned mid-way (error event, unreadable line) must not
    // leave the agent running unsupervised.
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.kill() {
            debug!("agent already exited: {e}");
        }
        let _ = self.child.wait();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use taskbench_core::{evaluate, EvalOptions, Task};

    use super::*;

    fn sh(script: &str) -> CommandAgent {
        CommandAgent::new("sh", vec!["-c".into(), script.into()])
    }

    #[test]
    fn test_generate_parses_output() {
        let agent = sh(
            r#"cat > /dev/null; echo '{"text":"Paris","steps":[{"toolCalls":[{"toolName":"web_search","toolCallId":"1","args":{"q":"capital"}}]}]}'"#,
        );
        let generation = agent.generate(&[Message::user("capital of France")]).unwrap();
        assert_eq!(generation.text, "Paris");
        assert_eq!(generation.steps.len(), 1);
        assert_eq!(generation.steps[0].tool_calls[0].tool_name, "web_search");
    }

    #[test]
    fn test_generate_sees_request_and_providers() {
        let providers = ProviderSelection::from_pairs([("search", "exa")]).unwrap();
        let agent = sh(
            r#"req=$(cat); case "$req" in *'"stream":false'*) ok=yes;; *) ok=no;; esac; echo "{\"text\":\"$TASKBENCH_SEARCH_PROVIDER $ok\"}""#,
        )
        .with_providers(&providers);
        let generation = agent.generate(&[Message::user("q")]).unwrap();
        assert_eq!(generation.text, "exa yes");
    }

    #[test]
    fn test_generate_timeout_kills_child() {
        let agent = sh("sleep 5").with_timeout(Some(Duration::from_millis(200)));
        let start = Instant::now();
        let err = agent.generate(&[Message::user("q")]).unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_generate_nonzero_exit() {
        let agent = sh("cat > /dev/null; echo boom >&2; exit 3");
        let err = agent.generate(&[Message::user("q")]).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_stream_events() {
        let agent = sh(concat!(
            "cat > /dev/null; ",
            r#"echo '{"type":"step","step":{"toolCalls":[{"toolName":"calc","toolCallId":"1"}]}}'; "#,
            r#"echo '{"type":"text","delta":"The answer "}'; "#,
            r#"echo '{"type":"text","delta":"is 4."}'; "#,
            r#"echo '{"type":"step","step":{"text":"done"}}'; "#,
            r#"echo '{"type":"done"}'"#
        ));
        let mut stream = agent.stream(&[Message::user("q")]).unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next_chunk() {
            text.push_str(&chunk.unwrap());
            assert!(!stream.steps_so_far().is_empty());
        }
        let steps = stream.finish().unwrap();
        assert_eq!(text, "The answer is 4.");
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_abandoned_stream_kills_agent() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("still-running");
        let agent = sh(&format!(
            r#"cat > /dev/null; echo '{{"type":"error","message":"boom"}}'; sleep 2; touch {}"#,
            marker.display()
        ));
        let task = Task::new("t1", 1, "q").with_expected("4");
        let options = EvalOptions {
            stream: true,
            ..EvalOptions::default()
        };

        let result = evaluate(&task, &agent, &options);
        assert!(result.error.unwrap().contains("boom"));

        thread::sleep(Duration::from_secs(3));
        assert!(!marker.exists(), "agent kept running after the task failed");
    }

    #[test]
    fn test_stream_error_event() {
        let agent = sh(r#"cat > /dev/null; echo '{"type":"error","message":"rate limited"}'"#);
        let mut stream = agent.stream(&[Message::user("q")]).unwrap();
        let err = stream.next_chunk().unwrap().unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }
}
