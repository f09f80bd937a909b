//! Sentence splitting for source uploads
//!
//! Long attributes are uploaded as lists of sentences so the TMS can reuse
//! translations of identical sentences across entities. The heuristic is
//! deliberately crude: a sentence ends at `.`, `?` or `!` followed by a space.
//! Line breaks never split a sentence.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.?!] ").expect("sentence boundary pattern is valid"));

/// Split text into sentence fragments
///
/// Punctuation stays on the fragment it ends, and one trailing space is
/// dropped from every fragment.
///
/// # Example
///
/// ```
/// use tms_sync::sentences::split;
///
/// assert_eq!(split("One. Two? Three!"), vec!["One.", "Two?", "Three!"]);
/// assert_eq!(split("a\nb"), vec!["a\nb"]);
/// ```
pub fn split(text: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut start = 0;

    for boundary in SENTENCE_END.find_iter(text) {
        fragments.push(trim_one_space(&text[start..boundary.end()]));
        start = boundary.end();
    }
    if start < text.len() {
        fragments.push(trim_one_space(&text[start..]));
    }

    fragments
}

fn trim_one_space(fragment: &str) -> String {
    fragment.strip_suffix(' ').unwrap_or(fragment).to_string()
}

/// Join sentence fragments back into one string
///
/// Fragments are separated by a single space. A fragment that is only a line
/// break is appended directly, so `["a", "\n", "b"]` becomes `"a\n b"`.
pub fn join<S: AsRef<str>>(fragments: &[S]) -> String {
    let mut joined = String::new();
    for (i, fragment) in fragments.iter().enumerate() {
        let fragment = fragment.as_ref();
        if i > 0 && !is_line_break(fragment) {
            joined.push(' ');
        }
        joined.push_str(fragment);
    }
    joined
}

fn is_line_break(fragment: &str) -> bool {
    fragment == "\n" || fragment == "\r\n"
}

/// Turn an exported attribute value into a single string
///
/// Strings pass through, arrays of strings are joined. Anything else (null,
/// numbers, objects) has no translation and yields `None`.
pub fn join_value(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Array(items) => {
            let fragments: Option<Vec<&str>> = items.iter().map(Value::as_str).collect();
            fragments.map(|f| join(&f))
        }
        _ => None,
    }
}

/// Split the given attributes into sentence arrays
pub fn split_attributes(attributes: &BTreeMap<String, String>) -> BTreeMap<String, Vec<String>> {
    attributes
        .iter()
        .map(|(name, text)| (name.clone(), split(text)))
        .collect()
}
