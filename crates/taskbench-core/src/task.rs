use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Difficulty levels a task may carry.
pub const LEVELS: [u8; 3] = [1, 2, 3];

/// One benchmark question. Read-only input supplied by the dataset loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub level: u8,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<TaskFile>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, level: u8, question: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level,
            question: question.into(),
            expected_answer: None,
            files: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_answer = Some(expected.into());
        self
    }

    pub fn with_file(mut self, file: TaskFile) -> Self {
        self.files.push(file);
        self
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }
}

/// An attachment referenced by a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFile {
    pub name: String,
    pub path: String,
    pub mime_type: String,
    /// Text content for small text-like attachments, sent inline to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<String>,
}

impl TaskFile {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mime_type: mime_type.into(),
            inline_data: None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(
            self.mime_type.as_str(),
            "image/png" | "image/jpeg" | "image/jpg" | "image/gif" | "image/webp"
        )
    }
}
