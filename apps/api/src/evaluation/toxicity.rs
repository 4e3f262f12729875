//! Toxicity scoring of the evaluation text through a hosted classifier.
//!
//! The classifier accepts at most `MAX_CHUNK_CHARS` characters per call, so
//! documents are chunked and the chunk scores averaged.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::evaluation::postprocess::chunk_text;
use crate::llm_client::LlmError;

const HF_INFERENCE_URL: &str = "https://api-inference.huggingface.co/models";
pub const MAX_CHUNK_CHARS: usize = 512;

/// Text chunk in, probability of harmful language out.
#[async_trait]
pub trait ToxicityClassifier: Send + Sync {
    async fn score(&self, chunk: &str) -> Result<f32, LlmError>;
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

/// The inference API nests results one level deeper for batched inputs.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassificationOutput {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl ClassificationOutput {
    /// Score of the `toxic` label, or the highest label score for models
    /// that name their labels differently.
    fn toxicity(self) -> Option<f32> {
        let labels = match self {
            ClassificationOutput::Nested(mut outer) => {
                if outer.is_empty() {
                    return None;
                }
                outer.swap_remove(0)
            }
            ClassificationOutput::Flat(labels) => labels,
        };
        labels
            .iter()
            .find(|l| l.label.eq_ignore_ascii_case("toxic"))
            .map(|l| l.score)
            .or_else(|| labels.iter().map(|l| l.score).reduce(f32::max))
    }
}

/// Hugging Face inference API client for a text-classification model.
#[derive(Clone)]
pub struct HfToxicityClient {
    client: Client,
    token: String,
    model: String,
}

impl HfToxicityClient {
    pub fn new(token: String, model: String, timeout_secs: u64) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()?,
            token,
            model,
        })
    }
}

#[async_trait]
impl ToxicityClassifier for HfToxicityClient {
    async fn score(&self, chunk: &str) -> Result<f32, LlmError> {
        let response = self
            .client
            .post(format!("{HF_INFERENCE_URL}/{}", self.model))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "inputs": chunk }))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(LlmError::RateLimited {
                retries: 0,
                message: response.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let output: ClassificationOutput = response.json().await?;
        output.toxicity().ok_or(LlmError::EmptyContent)
    }
}

/// Mean toxicity over `MAX_CHUNK_CHARS` chunks. Empty text scores 0.
pub async fn document_toxicity(
    classifier: &dyn ToxicityClassifier,
    text: &str,
) -> Result<f32, LlmError> {
    let chunks = chunk_text(text, MAX_CHUNK_CHARS);
    if chunks.is_empty() {
        return Ok(0.0);
    }

    let mut sum = 0.0_f32;
    for chunk in &chunks {
        sum += classifier.score(chunk).await?.clamp(0.0, 1.0);
    }
    let mean = sum / chunks.len() as f32;
    debug!("Toxicity over {} chunks: {mean:.3}", chunks.len());
    Ok(mean)
}
