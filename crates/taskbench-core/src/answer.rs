//! Answer normalization, the correctness check, and best-effort extraction
//! of structured fields from free-form agent text.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s]").expect("invalid non-word regex"));

static WHITESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

/// Lower-case, strip punctuation, collapse whitespace runs, trim.
///
/// Punctuation goes before whitespace collapsing so the result is a fixed point.
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let stripped = NON_WORD_RE.replace_all(&lower, "");
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

/// Bidirectional containment over normalized text.
///
/// Short expected answers produce false positives ("1" matches "10"), and an
/// answer that normalizes to nothing is contained in every expected answer.
/// Both are known weaknesses of the heuristic, not a grading oracle.
pub fn is_correct(answer: &str, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    let expected = normalize(expected);
    if expected.is_empty() {
        return false;
    }
    let answer = normalize(answer);
    answer.contains(&expected) || expected.contains(&answer)
}

// ---------------------------------------------------------------------------
// Heuristic extraction (reflection variants only)
// ---------------------------------------------------------------------------

static FINAL_ANSWER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)final\s+answer\s*(?:is)?\s*[:：]?\s*(.+?)\s*$")
        .expect("invalid final answer regex")
});

static ANSWER_IS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)\bthe\s+answer\s+is\s*:?\s*(.+?)\s*$").expect("invalid answer-is regex")
});

static CONFIDENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)confidence\s*(?:level|score)?\s*[:=]?\s*(\d{1,3})\s*%?")
        .expect("invalid confidence regex")
});

/// Pull the final answer out of free text. Prefers the last `FINAL ANSWER:`
/// line, then the last "the answer is ..." phrase.
pub fn extract_final_answer(text: &str) -> Option<String> {
    let captured = FINAL_ANSWER_RE
        .captures_iter(text)
        .last()
        .or_else(|| ANSWER_IS_RE.captures_iter(text).last())?;
    let raw = captured.get(1)?.as_str();
    let cleaned = raw
        .trim_matches(|c: char| c == '*' || c == '"' || c == '\'' || c == '`')
        .trim_end_matches('.')
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Parse a `CONFIDENCE: NN` marker, clamped to 0..=100.
pub fn extract_confidence(text: &str) -> Option<u8> {
    let caps = CONFIDENCE_RE.captures_iter(text).last()?;
    let value: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some(value.min(100) as u8)
}
