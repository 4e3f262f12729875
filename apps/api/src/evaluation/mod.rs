// CV evaluation engine.
// Implements: rubric rendering, score extraction, clamping/weighting,
// denylist filtering, keyword highlighting, toxicity scoring.
// All model calls go through llm_client via the LanguageModel trait.

pub mod aggregator;
pub mod categories;
pub mod extractor;
pub mod handlers;
pub mod pipeline;
pub mod postprocess;
pub mod prompt_builder;
pub mod prompts;
pub mod resume_text;
pub mod toxicity;
