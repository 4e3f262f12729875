//! Score Validator / Aggregator.
//!
//! Two modes behind one `Aggregator`:
//! - clamp-and-resum for the single-call JSON rubric (category points out of a table),
//! - weighted average for the multi-call rubric (five 0–100 section scores).
//!
//! Out-of-range values are clamped, never rejected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::evaluation::categories::{CategoryTable, Section, SectionWeights};
use crate::evaluation::extractor::category_value;

pub const TOTAL_SCORE_KEY: &str = "Total Score";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub score: f64,
    pub max: u32,
}

/// Validated category scores. `total` is always the sum of `categories`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub categories: Vec<CategoryScore>,
    pub total: f64,
}

impl ScoreSet {
    pub fn empty() -> Self {
        Self {
            categories: vec![],
            total: 0.0,
        }
    }
}

#[cfg(test)]
impl ScoreSet {
    pub fn get(&self, category: &str) -> Option<f64> {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.score)
    }
}

/// Traffic-light bucket for a 0–100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Strong,
    Moderate,
    Weak,
}

impl ScoreBand {
    pub fn for_score(score: f64) -> Self {
        if score >= 75.0 {
            ScoreBand::Strong
        } else if score >= 60.0 {
            ScoreBand::Moderate
        } else {
            ScoreBand::Weak
        }
    }
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    table: CategoryTable,
    weights: SectionWeights,
}

impl Aggregator {
    pub fn new(table: CategoryTable, weights: SectionWeights) -> Self {
        Self { table, weights }
    }

    pub fn table(&self) -> &CategoryTable {
        &self.table
    }

    /// Clamps every table category present in `mapping` to its maximum and sums them.
    ///
    /// Categories missing from the mapping are left out of both the set and the total.
    /// A present but unreadable value counts as 0. Negative values pass through.
    pub fn clamp_and_resum(&self, mapping: &Map<String, Value>) -> ScoreSet {
        let mut categories = Vec::new();

        for category in self.table.categories() {
            let Some(raw) = mapping.get(&category.name) else {
                continue;
            };
            let value = category_value(raw).unwrap_or_else(|| {
                debug!("Unreadable score for '{}': {raw}", category.name);
                0.0
            });
            let max = f64::from(category.max);
            categories.push(CategoryScore {
                category: category.name.clone(),
                score: if value > max { max } else { value },
                max: category.max,
            });
        }

        let total = categories.iter().map(|c| c.score).sum();
        ScoreSet { categories, total }
    }

    /// Writes validated scores and the recomputed total back into the raw mapping.
    pub fn apply_to_mapping(&self, mapping: &mut Map<String, Value>, scores: &ScoreSet) {
        for c in &scores.categories {
            mapping.insert(c.category.clone(), score_json(c.score));
        }
        mapping.insert(TOTAL_SCORE_KEY.to_string(), score_json(scores.total));
    }

    /// `round(Σ clamp(score, 0, 100) × weight, 2)`.
    pub fn weighted_average(&self, scores: &[(Section, f64)]) -> f64 {
        let sum: f64 = scores
            .iter()
            .map(|(section, score)| score.clamp(0.0, 100.0) * self.weights.weight(*section))
            .sum();
        round2(sum)
    }

    pub fn weight(&self, section: Section) -> f64 {
        self.weights.weight(section)
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whole numbers serialize as integers so `18` does not come back as `18.0`.
fn score_json(score: f64) -> Value {
    if score.fract() == 0.0 && score.abs() < i64::MAX as f64 {
        Value::from(score as i64)
    } else {
        Value::from(score)
    }
}
