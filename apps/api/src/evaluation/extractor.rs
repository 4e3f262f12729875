//! Score Extractor: pulls category scores out of raw model output.
//!
//! The caller picks the strategy through `ResponseShape`; the response is never
//! probed to guess its shape. Nothing here checks ranges.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm_client::strip_json_fences;

/// Terminal score marker expected in a free-text report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMarker {
    /// `65/100`, usually written as `Score: 65/100`.
    OutOfHundred,
    /// `Score: 65` with no denominator.
    ScoreLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Structured,
    FreeText { marker: ScoreMarker },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),

    #[error("response JSON is not an object")]
    NotAnObject,
}

/// Output of one extraction, tagged by the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedResponse {
    /// Every key of the JSON object, known categories or not.
    Structured(Map<String, Value>),
    FreeText { score: f64 },
}

static OUT_OF_HUNDRED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*/\s*100\b").expect("out-of-hundred pattern is valid")
});

static SCORE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Score:\s*(?:\*\*)?\s*(\d+(?:\.\d+)?)").expect("score label pattern is valid")
});

pub fn extract(raw: &str, shape: ResponseShape) -> Result<ExtractedResponse, ParseError> {
    match shape {
        ResponseShape::Structured => parse_structured(raw).map(ExtractedResponse::Structured),
        ResponseShape::FreeText { marker } => Ok(ExtractedResponse::FreeText {
            score: free_text_score(raw, marker),
        }),
    }
}

/// Parses the response as a JSON object, tolerating markdown code fences.
pub fn parse_structured(raw: &str) -> Result<Map<String, Value>, ParseError> {
    match serde_json::from_str::<Value>(strip_json_fences(raw))? {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAnObject),
    }
}

/// Returns the value of the last score marker in `raw`, or 0 when there is none.
///
/// Rubrics put the overall score last, so later matches win.
pub fn free_text_score(raw: &str, marker: ScoreMarker) -> f64 {
    let re = match marker {
        ScoreMarker::OutOfHundred => &*OUT_OF_HUNDRED_RE,
        ScoreMarker::ScoreLabel => &*SCORE_LABEL_RE,
    };
    re.captures_iter(raw)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Reads a category score leniently: a number, a numeric string, or a
/// one-element array of either (the rubric example shows `[score]`).
/// `NaN` and infinities are unreadable.
pub fn category_value(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim().trim_start_matches('[').trim_end_matches(']').trim();
            s.parse::<f64>().ok()
        }
        Value::Array(items) if items.len() == 1 => category_value(&items[0]),
        _ => None,
    };
    score.filter(|v| v.is_finite())
}
