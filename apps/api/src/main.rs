mod config;
mod errors;
mod evaluation;
mod llm_client;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::evaluation::aggregator::Aggregator;
use crate::evaluation::categories::{CategoryTable, SectionWeights};
use crate::evaluation::pipeline::Evaluator;
use crate::evaluation::postprocess::ToxicWordFilter;
use crate::evaluation::prompt_builder::RubricSet;
use crate::evaluation::toxicity::{HfToxicityClient, ToxicityClassifier};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV Insight API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(
        config.anthropic_api_key.clone(),
        config.llm_model.clone(),
        config.llm_timeout_secs,
    )?;
    info!("LLM client initialized (model: {})", llm.model());

    // Toxicity scoring is optional and needs a Hugging Face token
    let toxicity: Option<Arc<dyn ToxicityClassifier>> = match &config.hf_api_token {
        Some(token) => {
            let client = HfToxicityClient::new(
                token.clone(),
                config.toxicity_model.clone(),
                config.llm_timeout_secs,
            )?;
            info!("Toxicity classifier initialized (model: {})", config.toxicity_model);
            Some(Arc::new(client))
        }
        None => {
            info!("HF_API_TOKEN not set; toxicity scoring disabled");
            None
        }
    };

    let evaluator = Evaluator::new(
        Arc::new(llm),
        toxicity,
        RubricSet::standard()?,
        Aggregator::new(CategoryTable::standard()?, SectionWeights::default()),
        ToxicWordFilter::standard()?,
    );
    info!(
        "Evaluator ready: default mode {:?}, upload limit {} bytes",
        config.default_mode, config.max_upload_bytes
    );

    let state = AppState {
        evaluator,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
