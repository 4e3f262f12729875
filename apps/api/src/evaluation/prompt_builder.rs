//! Prompt Builder: renders rubric templates into request strings.
//!
//! Substitution is a single pass over the template. Inserted text is never
//! re-scanned, so resume text containing `{job_description}` stays literal.

use std::collections::HashMap;

use thiserror::Error;

use crate::evaluation::categories::Section;
use crate::evaluation::extractor::{ResponseShape, ScoreMarker};
use crate::evaluation::prompts::{
    ACTION_VERBS_RUBRIC, ATS_RUBRIC, CONTENT_RUBRIC, DRAFT_RUBRIC, JOB_ROLE_RUBRIC,
    STRUCTURED_RUBRIC, STRUCTURE_RUBRIC,
};
use crate::llm_client::prompts::{JSON_ONLY_INSTRUCTION, SCORE_LINE_INSTRUCTION};

pub const CV_CONTENT: &str = "cv_content";
pub const JOB_DESCRIPTION: &str = "job_description";

#[derive(Debug, Clone, PartialEq)]
pub struct RubricTemplate {
    template: String,
}

impl RubricTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Renders the template with the resume and job description.
    pub fn render(&self, cv_content: &str, job_description: &str) -> String {
        self.render_with(&[(CV_CONTENT, cv_content), (JOB_DESCRIPTION, job_description)])
    }

    /// Replaces every `{name}` whose name is in `vars`. Unknown `{...}` groups and
    /// unbalanced braces are copied through unchanged.
    pub fn render_with(&self, vars: &[(&str, &str)]) -> String {
        let template = self.template.as_str();
        let extra: usize = vars.iter().map(|(_, v)| v.len()).sum();
        let mut out = String::with_capacity(template.len() + extra);
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let name_end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            let name = &after[..name_end];
            let closed = after[name_end..].starts_with('}');

            match vars.iter().find(|(k, _)| *k == name) {
                Some((_, value)) if closed && !name.is_empty() => {
                    out.push_str(value);
                    rest = &after[name_end + 1..];
                }
                _ => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// A rubric plus the response shape its output is parsed with.
#[derive(Debug, Clone)]
pub struct Rubric {
    pub name: String,
    pub template: RubricTemplate,
    pub shape: ResponseShape,
}

impl Rubric {
    pub fn new(name: impl Into<String>, template: impl Into<String>, shape: ResponseShape) -> Self {
        Self {
            name: name.into(),
            template: RubricTemplate::new(template),
            shape,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RubricSetError {
    #[error("no rubric for section '{0}'")]
    MissingSection(&'static str),
}

/// Every rubric the pipeline can send, built once at startup.
#[derive(Debug, Clone)]
pub struct RubricSet {
    pub structured: Rubric,
    sections: HashMap<Section, Rubric>,
    pub draft: RubricTemplate,
}

impl RubricSet {
    pub fn new(
        structured: Rubric,
        sections: HashMap<Section, Rubric>,
        draft: RubricTemplate,
    ) -> Result<Self, RubricSetError> {
        if let Some(missing) = Section::ALL.iter().find(|s| !sections.contains_key(s)) {
            return Err(RubricSetError::MissingSection(missing.label()));
        }
        Ok(Self {
            structured,
            sections,
            draft,
        })
    }

    pub fn section(&self, section: Section) -> &Rubric {
        // Presence of every section is checked in `new`.
        &self.sections[&section]
    }

    /// Built-in rubrics: JSON for the single call, `n/100` lines for sections.
    pub fn standard() -> Result<Self, RubricSetError> {
        let free_text = ResponseShape::FreeText {
            marker: ScoreMarker::OutOfHundred,
        };
        let section = |name: &str, body: &str| {
            Rubric::new(
                name,
                format!("{body}\n\n{SCORE_LINE_INSTRUCTION}"),
                free_text,
            )
        };

        let sections = HashMap::from([
            (Section::Structure, section("structure", STRUCTURE_RUBRIC)),
            (Section::ActionVerbs, section("action_verbs", ACTION_VERBS_RUBRIC)),
            (Section::Content, section("content", CONTENT_RUBRIC)),
            (Section::Ats, section("ats", ATS_RUBRIC)),
            (Section::JobRole, section("job_role", JOB_ROLE_RUBRIC)),
        ]);

        Self::new(
            Rubric::new(
                "structured",
                format!("{STRUCTURED_RUBRIC}\n\n{JSON_ONLY_INSTRUCTION}"),
                ResponseShape::Structured,
            ),
            sections,
            RubricTemplate::new(DRAFT_RUBRIC),
        )
    }
}
