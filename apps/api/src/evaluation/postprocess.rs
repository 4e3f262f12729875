//! Post-processing of evaluation text: denylist filtering, keyword parsing,
//! keyword highlighting and chunking for the toxicity classifier.

use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_PLACEHOLDER: &str = "[inappropriate word]";
pub const DEFAULT_DENYLIST: &[&str] = &["terrible", "awful", "horrible", "stupid", "idiot"];

/// Emphasis marker wrapped around highlighted keywords (markdown bold).
pub const EMPHASIS: &str = "**";

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("placeholder '{placeholder}' contains denylisted word '{word}'")]
    PlaceholderContainsWord { placeholder: String, word: String },

    #[error("denylist contains an empty word")]
    EmptyWord,
}

/// Case-sensitive literal replacement of denylisted words.
#[derive(Debug, Clone)]
pub struct ToxicWordFilter {
    denylist: Vec<String>,
    placeholder: String,
}

impl ToxicWordFilter {
    /// Rejects placeholders that would themselves be filtered, so a second pass is a no-op.
    pub fn new(denylist: Vec<String>, placeholder: String) -> Result<Self, FilterError> {
        for word in &denylist {
            if word.is_empty() {
                return Err(FilterError::EmptyWord);
            }
            if placeholder.contains(word.as_str()) {
                return Err(FilterError::PlaceholderContainsWord {
                    placeholder,
                    word: word.clone(),
                });
            }
        }
        Ok(Self {
            denylist,
            placeholder,
        })
    }

    pub fn filter(&self, text: &str) -> String {
        self.denylist
            .iter()
            .fold(text.to_string(), |acc, word| acc.replace(word.as_str(), &self.placeholder))
    }

    /// The built-in denylist and placeholder.
    pub fn standard() -> Result<Self, FilterError> {
        Self::new(
            DEFAULT_DENYLIST.iter().map(|w| w.to_string()).collect(),
            DEFAULT_PLACEHOLDER.to_string(),
        )
    }
}

/// Reads a "Matching Keywords" field: a JSON array of strings, or a comma-separated
/// string, optionally bracketed and quoted (`"[Rust, 'SQL', \"AWS\"]"`).
pub fn matching_keywords(value: &Value) -> Vec<String> {
    let items: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .split(',')
            .map(str::to_string)
            .collect(),
        _ => vec![],
    };

    let mut keywords: Vec<String> = Vec::new();
    for item in items {
        let kw = item.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
        if !kw.is_empty() && !keywords.iter().any(|k| k.eq_ignore_ascii_case(kw)) {
            keywords.push(kw.to_string());
        }
    }
    keywords
}

/// Fallback keyword set: every distinct word token containing a letter,
/// lowercased, in first-seen order.
pub fn heuristic_keywords(text: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        if !token.chars().any(char::is_alphabetic) {
            continue;
        }
        let token = token.to_lowercase();
        if !seen.contains(&token) {
            seen.push(token);
        }
    }
    seen
}

/// Wraps each case-insensitive occurrence of each keyword in `**`.
///
/// At any position the longest matching keyword wins, and text already inside a
/// `**…**` span is left alone, so applying this twice changes nothing. Keywords
/// containing `*` are ignored.
pub fn highlight_keywords(text: &str, keywords: &[String]) -> String {
    let mut needles: Vec<Vec<char>> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty() && !k.contains('*'))
        .map(|k| k.chars().map(fold_char).collect())
        .collect();
    needles.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    needles.dedup();

    if needles.is_empty() {
        return text.to_string();
    }

    let once = highlight_pass(text, &needles);
    // A stray marker ahead of a match can pair with the inserted one on a later
    // pass; such text is returned untouched.
    if highlight_pass(&once, &needles) == once {
        once
    } else {
        text.to_string()
    }
}

const MARKER: [char; 2] = ['*', '*'];

fn highlight_pass(text: &str, needles: &[Vec<char>]) -> String {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let folded: Vec<char> = chars.iter().map(|(_, c)| fold_char(*c)).collect();
    let byte_at = |i: usize| chars.get(i).map_or(text.len(), |(b, _)| *b);

    let mut out = String::with_capacity(text.len());
    let mut copied_to = 0;
    let mut i = 0;
    while i < chars.len() {
        if let Some(len) = emphasis_span_len(&folded[i..]) {
            // Copied verbatim with the next plain run.
            i += len;
            continue;
        }
        match needles
            .iter()
            .find(|n| folded[i..].starts_with(n.as_slice()))
        {
            Some(needle) => {
                let (start, end) = (byte_at(i), byte_at(i + needle.len()));
                out.push_str(&text[copied_to..start]);
                out.push_str(EMPHASIS);
                out.push_str(&text[start..end]);
                out.push_str(EMPHASIS);
                copied_to = end;
                i += needle.len();
            }
            None => i += 1,
        }
    }
    out.push_str(&text[copied_to..]);
    out
}

/// Length in chars of a `**…**` span opening at `chars[0]`. The content must be
/// non-empty, free of `*`, and not start or end with whitespace.
fn emphasis_span_len(chars: &[char]) -> Option<usize> {
    let inner = chars.strip_prefix(&MARKER[..])?;
    let len = inner.iter().position(|c| *c == '*')?;
    let content = &inner[..len];
    if content.first()?.is_whitespace() || content.last()?.is_whitespace() {
        return None;
    }
    inner[len..]
        .starts_with(&MARKER)
        .then_some(len + 2 * MARKER.len())
}

/// One-to-one case folding so folded text keeps the original char positions.
fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Splits `text` into chunks of at most `max_chars` characters, on char boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<&str> {
    if max_chars == 0 {
        return vec![];
    }
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in text.char_indices() {
        if count == max_chars {
            chunks.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}
