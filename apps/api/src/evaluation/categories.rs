//! Scoring dimensions: the four-category point table of the single-call rubric
//! and the five weighted sections of the multi-call rubric.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sum that every category table must reach.
pub const TABLE_TOTAL: u32 = 100;

/// A named scoring dimension with a fixed maximum point value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub max: u32,
}

impl Category {
    pub fn new(name: impl Into<String>, max: u32) -> Self {
        Self {
            name: name.into(),
            max,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CategoryTableError {
    #[error("category table is empty")]
    Empty,

    #[error("category '{0}' appears more than once")]
    Duplicate(String),

    #[error("category maxima sum to {0}, expected 100")]
    BadTotal(u32),
}

/// Ordered set of categories whose maxima sum to 100.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTable {
    categories: Vec<Category>,
}

impl CategoryTable {
    pub fn new(categories: Vec<Category>) -> Result<Self, CategoryTableError> {
        if categories.is_empty() {
            return Err(CategoryTableError::Empty);
        }
        for (i, c) in categories.iter().enumerate() {
            if categories[..i].iter().any(|prev| prev.name == c.name) {
                return Err(CategoryTableError::Duplicate(c.name.clone()));
            }
        }
        let total: u32 = categories.iter().map(|c| c.max).sum();
        if total != TABLE_TOTAL {
            return Err(CategoryTableError::BadTotal(total));
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn total(&self) -> u32 {
        self.categories.iter().map(|c| c.max).sum()
    }

    /// The single-call rubric's four categories.
    pub fn standard() -> Result<Self, CategoryTableError> {
        Self::new(vec![
            Category::new("Structure and Formatting", 20),
            Category::new("Content Quality", 10),
            Category::new("ATS Compatibility", 15),
            Category::new("Match with Job Role", 55),
        ])
    }
}

/// One of the five independently prompted dimensions of the multi-call rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Structure,
    ActionVerbs,
    Content,
    Ats,
    JobRole,
}

impl Section {
    /// Evaluation order, which is also the order of the weight vector.
    pub const ALL: [Section; 5] = [
        Section::Structure,
        Section::ActionVerbs,
        Section::Content,
        Section::Ats,
        Section::JobRole,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Section::Structure => "Structure & Formatting",
            Section::ActionVerbs => "Action Verbs",
            Section::Content => "Content Quality",
            Section::Ats => "ATS Compatibility",
            Section::JobRole => "Job Role Match",
        }
    }

    fn index(self) -> usize {
        match self {
            Section::Structure => 0,
            Section::ActionVerbs => 1,
            Section::Content => 2,
            Section::Ats => 3,
            Section::JobRole => 4,
        }
    }
}

/// Per-section weights for the weighted-average overall score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionWeights([f64; 5]);

impl SectionWeights {
    pub fn new(weights: [f64; 5]) -> Self {
        Self(weights)
    }

    pub fn weight(&self, section: Section) -> f64 {
        self.0[section.index()]
    }
}

impl Default for SectionWeights {
    /// Job-role match dominates; the other four share the remainder evenly.
    fn default() -> Self {
        Self::new([0.1, 0.1, 0.1, 0.1, 0.6])
    }
}
