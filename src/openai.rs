//! OpenAI-compatible HTTP provider
//!
//! One blocking client implements both external capabilities: `Embedder`
//! via the embeddings endpoint and `Answerer` via chat completions. Works
//! against api.openai.com or any server speaking the same API shape.

use anyhow::{Context, Result, bail};
use serde::{Serialize, Deserialize};
use std::time::Duration;

use crate::config::Config;
use crate::provider::{Answerer, Embedder};
use crate::CacheError;

const TIMEOUT_SECONDS: u64 = 60;

const SYSTEM_PROMPT: &str =
    "You are an expert assistant in the field of machine learning. Give clear and simple answers.";

#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    embedding_model: String,
    completion_model: String,
    dimension: usize,
    agent: ureq::Agent,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

impl OpenAiClient {
    pub fn new(config: &Config) -> std::result::Result<OpenAiClient, CacheError> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| CacheError::Config("OPENAI_API_KEY is not set".to_string()))?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(OpenAiClient {
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: config.embedding_model.clone(),
            completion_model: config.completion_model.clone(),
            dimension: config.embedding_dim,
            agent,
        })
    }

    fn post_json(&self, path: &str, body: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        self.agent
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .with_context(|| format!("request to {} failed", url))
    }
}

impl Embedder for OpenAiClient {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingsRequest { model: &self.embedding_model, input: text };
        let body = serde_json::to_string(&request).context("failed to serialize embeddings request")?;

        let response_text = self.post_json("/embeddings", &body)?;
        let response: EmbeddingsResponse =
            serde_json::from_str(&response_text).context("failed to parse embeddings response")?;

        let Some(row) = response.data.into_iter().next() else {
            bail!("embeddings response contained no vectors");
        };
        if row.embedding.len() != self.dimension {
            bail!(
                "model returned a {}-dimensional embedding, configured for {}",
                row.embedding.len(),
                self.dimension
            );
        }

        Ok(row.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Answerer for OpenAiClient {
    fn complete(&self, question: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.completion_model,
            messages: vec![
                ChatMessage { role: "system", content: SYSTEM_PROMPT },
                ChatMessage { role: "user", content: question },
            ],
        };
        let body = serde_json::to_string(&request).context("failed to serialize chat request")?;

        let response_text = self.post_json("/chat/completions", &body)?;
        let response: ChatResponse =
            serde_json::from_str(&response_text).context("failed to parse chat response")?;

        let Some(choice) = response.choices.into_iter().next() else {
            bail!("chat response contained no choices");
        };

        Ok(choice.message.content.trim().to_string())
    }
}
