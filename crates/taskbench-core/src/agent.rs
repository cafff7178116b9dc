//! The external reasoning agent, as seen by the harness.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BenchResult;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Either plain text or a list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Image passed by reference (a path or URL), never inlined.
    Image {
        image: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

// ---------------------------------------------------------------------------
// Step records
// ---------------------------------------------------------------------------

/// One reasoning iteration reported by the agent. Every field is optional on
/// the wire; an absent list is the same as an empty one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub tool_results: Vec<ToolOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_name: String,
    #[serde(default)]
    pub tool_call_id: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub tool_name: String,
    #[serde(default)]
    pub tool_call_id: String,
    #[serde(default)]
    pub result: Value,
}

impl ToolOutput {
    /// Whether the tool reported failure (`isError: true` or an `error` field).
    pub fn is_error(&self) -> bool {
        match &self.result {
            Value::Object(map) => {
                map.get("isError").and_then(Value::as_bool).unwrap_or(false)
                    || map.get("error").is_some_and(|e| !e.is_null())
            }
            _ => false,
        }
    }
}

/// Buffered agent output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

pub trait Agent {
    /// Label recorded in snapshot metadata.
    fn name(&self) -> &str;
    fn model(&self) -> &str;

    fn generate(&self, messages: &[Message]) -> BenchResult<Generation>;
    fn stream<'a>(&'a self, messages: &[Message]) -> BenchResult<Box<dyn AgentStream + 'a>>;
}

/// Incremental agent output: a text chunk sequence plus a step list that
/// resolves once the agent is done.
pub trait AgentStream {
    /// Next text chunk, or `None` once the text sequence is exhausted.
    fn next_chunk(&mut self) -> Option<BenchResult<String>>;

    /// Steps reported so far. Used for progress display only.
    fn steps_so_far(&self) -> &[StepRecord];

    /// Drain whatever is left and return the complete step list.
    fn finish(self: Box<Self>) -> BenchResult<Vec<StepRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_record_missing_fields_default() {
        let step: StepRecord = serde_json::from_value(json!({ "text": "thinking" })).unwrap();
        assert!(step.tool_calls.is_empty());
        assert!(step.tool_results.is_empty());
        assert_eq!(step.text.as_deref(), Some("thinking"));
    }

    #[test]
    fn test_tool_output_error_detection() {
        let ok = ToolOutput {
            tool_name: "search".into(),
            tool_call_id: "1".into(),
            result: json!({ "items": [] }),
        };
        let flagged = ToolOutput {
            result: json!({ "isError": true }),
            ..ok.clone()
        };
        let errored = ToolOutput {
            result: json!({ "error": "timeout" }),
            ..ok.clone()
        };
        assert!(!ok.is_error());
        assert!(flagged.is_error());
        assert!(errored.is_error());
    }

    #[test]
    fn test_message_parts_serialize_tagged() {
        let msg = Message {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: "hi".into() },
                ContentPart::Image {
                    image: "/tmp/a.png".into(),
                    mime_type: "image/png".into(),
                },
            ]),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][1]["type"], "image");
        assert_eq!(v["content"][1]["mimeType"], "image/png");
    }
}
