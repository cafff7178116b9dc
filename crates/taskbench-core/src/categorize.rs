//! Heuristic capability labels for tasks.
//!
//! Keyword matching is case-insensitive substring search. A label says what a
//! task probably needs, not which tools the agent must use.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Files,
    Code,
    Search,
    Browser,
    Reasoning,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Self::Files,
        Self::Code,
        Self::Search,
        Self::Browser,
        Self::Reasoning,
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Files => write!(f, "files"),
            Self::Code => write!(f, "code"),
            Self::Search => write!(f, "search"),
            Self::Browser => write!(f, "browser"),
            Self::Reasoning => write!(f, "reasoning"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "files" => Ok(Self::Files),
            "code" => Ok(Self::Code),
            "search" => Ok(Self::Search),
            "browser" => Ok(Self::Browser),
            "reasoning" => Ok(Self::Reasoning),
            _ => Err(format!("invalid category: {s}")),
        }
    }
}

const CODE_KEYWORDS: &[&str] = &[
    "calculate",
    "compute",
    "code",
    "program",
    "equation",
    "formula",
    "algorithm",
];

const SEARCH_KEYWORDS: &[&str] = &[
    "search",
    "find",
    "article",
    "website",
    "url",
    "arxiv",
    "wikipedia",
    "published",
    "journal",
];

const BROWSER_KEYWORDS: &[&str] = &[
    "browser",
    "navigate",
    "click",
    "screenshot",
    "webpage",
    "web page",
];

static ARITHMETIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d\s*[-+*/]\s*\d").expect("invalid arithmetic regex"));

/// Classify a task. Never empty: `Reasoning` is the fallback and only appears alone.
pub fn categorize(task: &Task) -> Vec<Category> {
    categorize_parts(&task.question, task.has_files())
}

/// Same rules as [`categorize`], for callers that only kept the question text
/// and whether anything was attached (e.g. a stored result).
pub fn categorize_parts(question: &str, has_files: bool) -> Vec<Category> {
    let lower = question.to_lowercase();
    let mut categories = Vec::new();

    if has_files {
        categories.push(Category::Files);
    }
    if contains_any(&lower, CODE_KEYWORDS) || ARITHMETIC_RE.is_match(&lower) {
        categories.push(Category::Code);
    }
    if contains_any(&lower, SEARCH_KEYWORDS) {
        categories.push(Category::Search);
    }
    if contains_any(&lower, BROWSER_KEYWORDS) {
        categories.push(Category::Browser);
    }
    if categories.is_empty() {
        categories.push(Category::Reasoning);
    }

    categories
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| haystack.contains(kw))
}
