//! Evaluation pipeline: orchestrates one evaluation request end to end.
//!
//! Flow: input checks → rubric render → LLM call(s) → extraction →
//!       aggregation → denylist filter → keyword highlight → toxicity → report.
//!
//! A section or category that fails to parse degrades to 0; only transport
//! errors and bad input abort the request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::evaluation::aggregator::{Aggregator, ScoreBand, ScoreSet, TOTAL_SCORE_KEY};
use crate::evaluation::categories::Section;
use crate::evaluation::extractor::{category_value, extract, parse_structured, ExtractedResponse};
use crate::evaluation::postprocess::{
    heuristic_keywords, highlight_keywords, matching_keywords, ToxicWordFilter,
};
use crate::evaluation::prompt_builder::{RubricSet, CV_CONTENT, JOB_DESCRIPTION};
use crate::evaluation::resume_text::require_text;
use crate::evaluation::toxicity::{document_toxicity, ToxicityClassifier};
use crate::llm_client::LanguageModel;

pub const SUGGESTIONS_KEY: &str = "Suggestions";
pub const MATCHING_KEYWORDS_KEY: &str = "Matching Keywords";

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

/// Which rubric family to run: one JSON call, or five free-text section calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    Structured,
    Sectioned,
}

#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub resume_text: String,
    pub job_description: String,
    pub mode: EvaluationMode,
    /// Sectioned mode only: ask for a revised CV built from the section reports.
    pub draft: bool,
}

/// Whether the structured response parsed, or the report fell back to raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseOutcome {
    Parsed,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredEvaluation {
    pub scores: ScoreSet,
    pub suggestions: String,
    pub matching_keywords: Vec<String>,
    /// Keys of the response object that are neither categories nor known fields.
    pub additional_fields: Map<String, Value>,
    pub parse_outcome: ParseOutcome,
    pub highlighted_resume: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionScore {
    pub section: Section,
    pub label: &'static str,
    pub score: f64,
    pub weight: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionedEvaluation {
    pub sections: Vec<SectionScore>,
    pub draft_cv: Option<String>,
    /// Taken heuristically from the section feedback; there is no keyword field.
    pub matching_keywords: Vec<String>,
    pub highlighted_resume: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EvaluationOutcome {
    Structured(StructuredEvaluation),
    Sectioned(SectionedEvaluation),
}

/// One finished evaluation. Built once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub evaluation_id: Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub overall_score: f64,
    pub band: ScoreBand,
    #[serde(flatten)]
    pub outcome: EvaluationOutcome,
    /// Filtered result text; also the body of the `evaluation_result.txt` download.
    pub result_text: String,
    pub toxicity: Option<f32>,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Owns the collaborators and configuration for evaluations. Holds no
/// per-request state, so one instance serves concurrent requests.
#[derive(Clone)]
pub struct Evaluator {
    llm: Arc<dyn LanguageModel>,
    toxicity: Option<Arc<dyn ToxicityClassifier>>,
    rubrics: RubricSet,
    aggregator: Aggregator,
    filter: ToxicWordFilter,
}

impl Evaluator {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        toxicity: Option<Arc<dyn ToxicityClassifier>>,
        rubrics: RubricSet,
        aggregator: Aggregator,
        filter: ToxicWordFilter,
    ) -> Self {
        Self {
            llm,
            toxicity,
            rubrics,
            aggregator,
            filter,
        }
    }

    /// Runs one evaluation. Input problems are reported before any model call.
    pub async fn evaluate(&self, request: EvaluationRequest) -> Result<EvaluationReport, AppError> {
        if request.job_description.trim().is_empty() {
            return Err(AppError::Validation(
                "job_description cannot be empty".to_string(),
            ));
        }
        let resume_text = require_text(request.resume_text)?;
        let job_description = request.job_description;

        let evaluation_id = Uuid::new_v4();
        info!(
            "Evaluation {evaluation_id} started: mode={:?}, resume_chars={}",
            request.mode,
            resume_text.chars().count()
        );

        let (outcome, overall_score, result_text) = match request.mode {
            EvaluationMode::Structured => {
                let (evaluation, text) =
                    self.evaluate_structured(&resume_text, &job_description).await?;
                let total = evaluation.scores.total;
                (EvaluationOutcome::Structured(evaluation), total, text)
            }
            EvaluationMode::Sectioned => {
                let (evaluation, overall, text) = self
                    .evaluate_sectioned(&resume_text, &job_description, request.draft)
                    .await?;
                (EvaluationOutcome::Sectioned(evaluation), overall, text)
            }
        };

        let toxicity = self.score_toxicity(&result_text).await;

        info!("Evaluation {evaluation_id} finished: overall={overall_score}");

        Ok(EvaluationReport {
            evaluation_id,
            evaluated_at: Utc::now(),
            overall_score,
            band: ScoreBand::for_score(overall_score),
            outcome,
            result_text,
            toxicity,
        })
    }

    /// Single JSON call. An unparseable reply falls back to zero scores, the raw
    /// text as suggestions, and heuristic keywords.
    async fn evaluate_structured(
        &self,
        resume_text: &str,
        job_description: &str,
    ) -> Result<(StructuredEvaluation, String), AppError> {
        let prompt = self
            .rubrics
            .structured
            .template
            .render(resume_text, job_description);
        let raw = self.llm.invoke(&prompt).await?;

        let (mut evaluation, text) = match parse_structured(&raw) {
            Ok(mut mapping) => {
                let scores = self.aggregator.clamp_and_resum(&mapping);
                self.aggregator.apply_to_mapping(&mut mapping, &scores);

                let suggestions = match mapping.get(SUGGESTIONS_KEY) {
                    Some(Value::String(s)) => self.filter.filter(s),
                    Some(other) => self.filter.filter(&other.to_string()),
                    None => String::new(),
                };
                let matching_keywords = mapping
                    .get(MATCHING_KEYWORDS_KEY)
                    .map(matching_keywords)
                    .unwrap_or_default();
                let additional_fields = mapping
                    .iter()
                    .filter(|(k, _)| !self.is_known_field(k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();

                let text = serde_json::to_string_pretty(&mapping)
                    .map_err(|e| AppError::Internal(e.into()))?;

                (
                    StructuredEvaluation {
                        scores,
                        suggestions,
                        matching_keywords,
                        additional_fields,
                        parse_outcome: ParseOutcome::Parsed,
                        highlighted_resume: String::new(),
                    },
                    self.filter.filter(&text),
                )
            }
            Err(e) => {
                warn!("Structured response did not parse ({e}); falling back to raw text");
                let text = self.filter.filter(&raw);
                (
                    StructuredEvaluation {
                        scores: ScoreSet::empty(),
                        suggestions: text.clone(),
                        matching_keywords: heuristic_keywords(&text),
                        additional_fields: Map::new(),
                        parse_outcome: ParseOutcome::Fallback,
                        highlighted_resume: String::new(),
                    },
                    text,
                )
            }
        };

        evaluation.highlighted_resume =
            highlight_keywords(resume_text, &evaluation.matching_keywords);
        Ok((evaluation, text))
    }

    /// Five sequential free-text calls, weighted into one overall score, plus an
    /// optional draft call.
    async fn evaluate_sectioned(
        &self,
        resume_text: &str,
        job_description: &str,
        draft: bool,
    ) -> Result<(SectionedEvaluation, f64, String), AppError> {
        let mut sections = Vec::with_capacity(Section::ALL.len());

        for section in Section::ALL {
            let rubric = self.rubrics.section(section);
            let prompt = rubric.template.render(resume_text, job_description);
            let raw = self.llm.invoke(&prompt).await?;

            let score = match extract(&raw, rubric.shape) {
                Ok(ExtractedResponse::FreeText { score }) => score,
                Ok(ExtractedResponse::Structured(mapping)) => mapping
                    .get("Score")
                    .and_then(category_value)
                    .unwrap_or(0.0),
                Err(e) => {
                    warn!("Section '{}' did not parse ({e}); scoring 0", rubric.name);
                    0.0
                }
            };
            info!("Section '{}' scored {score}", rubric.name);

            sections.push(SectionScore {
                section,
                label: section.label(),
                score,
                weight: self.aggregator.weight(section),
                feedback: self.filter.filter(&raw),
            });
        }

        let pairs: Vec<(Section, f64)> = sections.iter().map(|s| (s.section, s.score)).collect();
        let overall = self.aggregator.weighted_average(&pairs);

        let draft_cv = if draft {
            let raw = self
                .llm
                .invoke(&self.render_draft(resume_text, job_description, &sections))
                .await?;
            Some(self.filter.filter(&raw))
        } else {
            None
        };

        let mut evaluation = SectionedEvaluation {
            sections,
            draft_cv,
            matching_keywords: vec![],
            highlighted_resume: String::new(),
        };
        let text = render_sectioned_text(&evaluation, overall);
        evaluation.matching_keywords = heuristic_keywords(&text);
        evaluation.highlighted_resume =
            highlight_keywords(resume_text, &evaluation.matching_keywords);
        Ok((evaluation, overall, text))
    }

    fn render_draft(
        &self,
        resume_text: &str,
        job_description: &str,
        sections: &[SectionScore],
    ) -> String {
        let report = |section: Section| {
            sections
                .iter()
                .find(|s| s.section == section)
                .map(|s| s.feedback.as_str())
                .unwrap_or("")
        };
        self.rubrics.draft.render_with(&[
            (CV_CONTENT, resume_text),
            (JOB_DESCRIPTION, job_description),
            ("structure_report", report(Section::Structure)),
            ("verbs_report", report(Section::ActionVerbs)),
            ("content_report", report(Section::Content)),
            ("ats_report", report(Section::Ats)),
            ("role_report", report(Section::JobRole)),
        ])
    }

    async fn score_toxicity(&self, text: &str) -> Option<f32> {
        let classifier = self.toxicity.as_ref()?;
        match document_toxicity(&**classifier, text).await {
            Ok(score) => Some(score),
            Err(e) => {
                warn!("Toxicity scoring failed: {e}");
                None
            }
        }
    }

    fn is_known_field(&self, key: &str) -> bool {
        key == TOTAL_SCORE_KEY
            || key == SUGGESTIONS_KEY
            || key == MATCHING_KEYWORDS_KEY
            || self.aggregator.table().get(key).is_some()
    }
}

/// Plain-text rendering of a sectioned evaluation for download.
fn render_sectioned_text(evaluation: &SectionedEvaluation, overall: f64) -> String {
    let mut text = format!("Overall Score: {overall}/100\n");
    for (i, s) in evaluation.sections.iter().enumerate() {
        text.push_str(&format!(
            "\n{}. {} ({}/100, weight {})\n{}\n",
            i + 1,
            s.label,
            s.score,
            s.weight,
            s.feedback.trim()
        ));
    }
    if let Some(draft) = &evaluation.draft_cv {
        text.push_str(&format!("\nNew Draft CV:\n{}\n", draft.trim()));
    }
    text
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::evaluation::categories::{CategoryTable, SectionWeights};
    use crate::llm_client::LlmError;

    /// Returns canned responses in order and records every prompt.
    pub(crate) struct ScriptedModel {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        pub(crate) fn new(responses: Vec<&str>) -> Self {
            Self::with_results(responses.into_iter().map(|r| Ok(r.to_string())).collect())
        }

        pub(crate) fn with_results(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(vec![]),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn invoke(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::EmptyContent);
            }
            responses.remove(0)
        }
    }

    struct FixedToxicity(f32);

    #[async_trait]
    impl ToxicityClassifier for FixedToxicity {
        async fn score(&self, _chunk: &str) -> Result<f32, LlmError> {
            Ok(self.0)
        }
    }

    pub(crate) fn evaluator(model: Arc<ScriptedModel>) -> Evaluator {
        Evaluator::new(
            model,
            None,
            RubricSet::standard().unwrap(),
            Aggregator::new(CategoryTable::standard().unwrap(), SectionWeights::default()),
            ToxicWordFilter::standard().unwrap(),
        )
    }

    fn request(mode: EvaluationMode) -> EvaluationRequest {
        EvaluationRequest {
            resume_text: "Jane Doe. Built Rust services on PostgreSQL and Kubernetes.".to_string(),
            job_description: "Backend engineer: Rust, PostgreSQL, Kubernetes.".to_string(),
            mode,
            draft: false,
        }
    }

    const STRUCTURED_REPLY: &str = r#"{
        "Structure and Formatting": 24,
        "Content Quality": 8,
        "ATS Compatibility": 12,
        "Match with Job Role": 44,
        "Total Score": 88,
        "Suggestions": "The summary is terrible; lead with impact.",
        "Matching Keywords": ["Rust", "PostgreSQL", "Kubernetes"],
        "Confidence": "high"
    }"#;

    #[tokio::test]
    async fn test_structured_clamps_and_recomputes_total() {
        let model = Arc::new(ScriptedModel::new(vec![STRUCTURED_REPLY]));
        let report = evaluator(model.clone())
            .evaluate(request(EvaluationMode::Structured))
            .await
            .unwrap();

        let EvaluationOutcome::Structured(eval) = &report.outcome else {
            panic!("expected structured outcome");
        };
        assert_eq!(eval.parse_outcome, ParseOutcome::Parsed);
        assert_eq!(eval.scores.get("Structure and Formatting"), Some(20.0));
        assert_eq!(eval.scores.total, 84.0);
        assert_eq!(report.overall_score, 84.0);
        assert_eq!(report.band, ScoreBand::Strong);
        assert_eq!(model.calls(), 1);
        assert!(report.result_text.contains("\"Total Score\": 84"));
    }

    #[tokio::test]
    async fn test_structured_filters_and_highlights() {
        let model = Arc::new(ScriptedModel::new(vec![STRUCTURED_REPLY]));
        let report = evaluator(model)
            .evaluate(request(EvaluationMode::Structured))
            .await
            .unwrap();

        let EvaluationOutcome::Structured(eval) = &report.outcome else {
            panic!("expected structured outcome");
        };
        assert_eq!(
            eval.suggestions,
            "The summary is [inappropriate word]; lead with impact."
        );
        assert!(!report.result_text.contains("terrible"));
        assert_eq!(eval.matching_keywords, vec!["Rust", "PostgreSQL", "Kubernetes"]);
        assert!(eval.highlighted_resume.contains("**Rust**"));
        assert!(eval.highlighted_resume.contains("**PostgreSQL**"));
        assert_eq!(eval.additional_fields.get("Confidence"), Some(&Value::from("high")));
        assert!(!eval.additional_fields.contains_key("Total Score"));
    }

    #[tokio::test]
    async fn test_structured_result_text_keeps_response_key_order() {
        let model = Arc::new(ScriptedModel::new(vec![STRUCTURED_REPLY]));
        let report = evaluator(model)
            .evaluate(request(EvaluationMode::Structured))
            .await
            .unwrap();

        let text = &report.result_text;
        let position = |key: &str| text.find(key).unwrap();
        assert!(position("Structure and Formatting") < position("Content Quality"));
        assert!(position("Match with Job Role") < position("Total Score"));
        assert!(position("Suggestions") < position("Matching Keywords"));
    }

    #[tokio::test]
    async fn test_structured_prompt_embeds_inputs() {
        let model = Arc::new(ScriptedModel::new(vec![STRUCTURED_REPLY]));
        evaluator(model.clone())
            .evaluate(request(EvaluationMode::Structured))
            .await
            .unwrap();
        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Jane Doe. Built Rust services"));
        assert!(prompts[0].contains("Backend engineer: Rust"));
    }

    #[tokio::test]
    async fn test_structured_malformed_json_falls_back() {
        let model = Arc::new(ScriptedModel::new(vec![
            r#"{"Content Quality": 7, "Suggestions": "Add Rust metrics",}"#,
        ]));
        let report = evaluator(model)
            .evaluate(request(EvaluationMode::Structured))
            .await
            .unwrap();

        let EvaluationOutcome::Structured(eval) = &report.outcome else {
            panic!("expected structured outcome");
        };
        assert_eq!(eval.parse_outcome, ParseOutcome::Fallback);
        assert!(eval.scores.categories.is_empty());
        assert_eq!(report.overall_score, 0.0);
        assert!(eval.matching_keywords.contains(&"rust".to_string()));
        assert!(eval.suggestions.contains("Add Rust metrics"));
    }

    #[tokio::test]
    async fn test_sectioned_weights_last_score_of_each_section() {
        let model = Arc::new(ScriptedModel::new(vec![
            "Headings fine. Score: 70/100",
            "Draft Score: 10/100 ... final Score: 65/100",
            "Score: 80/100",
            "Score: 75/100",
            "Rust and Kubernetes matched. Score: 61/100",
        ]));
        let report = evaluator(model.clone())
            .evaluate(request(EvaluationMode::Sectioned))
            .await
            .unwrap();

        let EvaluationOutcome::Sectioned(eval) = &report.outcome else {
            panic!("expected sectioned outcome");
        };
        assert_eq!(eval.sections.len(), 5);
        assert_eq!(eval.sections[1].score, 65.0);
        assert_eq!(report.overall_score, 65.6);
        assert_eq!(report.band, ScoreBand::Moderate);
        assert!(eval.draft_cv.is_none());
        assert_eq!(model.calls(), 5);
        assert!(report.result_text.starts_with("Overall Score: 65.6/100"));
        assert!(eval.matching_keywords.contains(&"kubernetes".to_string()));
        assert_eq!(
            eval.highlighted_resume,
            "Jane Doe. Built **Rust** services on PostgreSQL **and** **Kubernetes**."
        );
    }

    #[tokio::test]
    async fn test_sectioned_unparseable_section_scores_zero() {
        let model = Arc::new(ScriptedModel::new(vec![
            "no score at all",
            "Score: 100/100",
            "Score: 100/100",
            "Score: 100/100",
            "Score: 100/100",
        ]));
        let report = evaluator(model)
            .evaluate(request(EvaluationMode::Sectioned))
            .await
            .unwrap();
        assert_eq!(report.overall_score, 90.0);
    }

    #[tokio::test]
    async fn test_sectioned_draft_uses_section_reports() {
        let model = Arc::new(ScriptedModel::new(vec![
            "S report Score: 50/100",
            "V report Score: 50/100",
            "C report Score: 50/100",
            "A report Score: 50/100",
            "R report Score: 50/100",
            "Jane Doe — revised CV",
        ]));
        let mut req = request(EvaluationMode::Sectioned);
        req.draft = true;
        let report = evaluator(model.clone()).evaluate(req).await.unwrap();

        let EvaluationOutcome::Sectioned(eval) = &report.outcome else {
            panic!("expected sectioned outcome");
        };
        assert_eq!(eval.draft_cv.as_deref(), Some("Jane Doe — revised CV"));
        let prompts = model.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 6);
        assert!(prompts[5].contains("R report Score: 50/100"));
        assert!(report.result_text.contains("New Draft CV:"));
    }

    #[tokio::test]
    async fn test_empty_resume_rejected_before_any_call() {
        let model = Arc::new(ScriptedModel::new(vec![STRUCTURED_REPLY]));
        let mut req = request(EvaluationMode::Structured);
        req.resume_text = "   ".to_string();
        let err = evaluator(model.clone()).evaluate(req).await.unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_job_description_rejected() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let mut req = request(EvaluationMode::Sectioned);
        req.job_description = "\n".to_string();
        let err = evaluator(model.clone()).evaluate(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_propagates_with_wait_time() {
        let model = Arc::new(ScriptedModel::with_results(vec![Err(LlmError::RateLimited {
            retries: 3,
            message: "rate_limit_exceeded. Please try again in 1m2.5s".to_string(),
        })]));
        let err = evaluator(model)
            .evaluate(request(EvaluationMode::Structured))
            .await
            .unwrap_err();
        match err {
            AppError::RateLimited { retry_after } => {
                assert_eq!(retry_after.as_deref(), Some("1m2.5s"))
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_toxicity_score_attached_when_classifier_configured() {
        let model = Arc::new(ScriptedModel::new(vec![STRUCTURED_REPLY]));
        let evaluator = Evaluator::new(
            model,
            Some(Arc::new(FixedToxicity(0.25))),
            RubricSet::standard().unwrap(),
            Aggregator::new(CategoryTable::standard().unwrap(), SectionWeights::default()),
            ToxicWordFilter::standard().unwrap(),
        );
        let report = evaluator
            .evaluate(request(EvaluationMode::Structured))
            .await
            .unwrap();
        assert_eq!(report.toxicity, Some(0.25));
    }

    #[tokio::test]
    async fn test_report_serializes_mode_tag() {
        let model = Arc::new(ScriptedModel::new(vec![STRUCTURED_REPLY]));
        let report = evaluator(model)
            .evaluate(request(EvaluationMode::Structured))
            .await
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "structured");
        assert_eq!(json["band"], "strong");
        assert!(json["scores"]["categories"].is_array());
    }
}
