use crate::config::Config;
use crate::evaluation::pipeline::Evaluator;

/// Shared application state injected into all route handlers via Axum extractors.
/// Immutable after startup; every request gets its own pipeline run.
#[derive(Clone)]
pub struct AppState {
    pub evaluator: Evaluator,
    pub config: Config,
}
