//! Embedding Client: a pure adapter around a remote embedding service.
//!
//! Contract (core spec §4.3): `embed(texts) → vectors` of fixed dimension
//! `D=1536`, same order as input, batched internally at ≤100 texts per
//! upstream call, each input truncated to ≤30 000 characters.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::errors::{CoreError, CoreResult};

/// Fixed embedding dimensionality (core spec §4.3, §6).
pub const EMBEDDING_DIMS: usize = 1536;
/// Maximum texts per upstream batch call.
pub const MAX_BATCH_SIZE: usize = 100;
/// Maximum input length before truncation (approx. upstream token limit).
pub const MAX_INPUT_CHARS: usize = 30_000;

/// Truncates `text` to `MAX_INPUT_CHARS`, appending an ellipsis when cut.
pub fn truncate_input(text: &str) -> String {
    if text.chars().count() <= MAX_INPUT_CHARS {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(MAX_INPUT_CHARS).collect();
        truncated.push('\u{2026}');
        truncated
    }
}

/// Capability interface for the embedding leaf component (core spec §9:
/// remote-service adapters as interfaces).
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;
    /// Vector dimensionality this client produces.
    fn dims(&self) -> usize;
    /// Whether an upstream LLM is also configured for topic-fallback use.
    fn llm_configured(&self) -> bool;

    /// Embeds an ordered list of texts, batching internally at
    /// `MAX_BATCH_SIZE` and truncating each input at `MAX_INPUT_CHARS`.
    /// Output length and order match the input.
    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>>;

    /// Embeds a single query string.
    async fn embed_query(&self, text: &str) -> CoreResult<Vec<f32>> {
        let mut out = self.embed(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| CoreError::EmbeddingProtocolError("empty embedding response".into()))
    }
}

/// No-op adapter used when no upstream is configured. The retrieval engine
/// degrades to full-text search when this is in effect.
pub struct DisabledEmbeddingClient;

#[async_trait]
impl EmbeddingClient for DisabledEmbeddingClient {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn llm_configured(&self) -> bool {
        false
    }
    async fn embed(&self, _texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        Err(CoreError::EmbeddingUnavailable(
            "embedding client is disabled".into(),
        ))
    }
}

/// OpenAI-compatible HTTP embedding client.
pub struct OpenAiEmbeddingClient {
    model: String,
    dims: usize,
    max_retries: u32,
    timeout_secs: u64,
    llm_topic_fallback: bool,
    http: reqwest::Client,
}

impl OpenAiEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> CoreResult<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| CoreError::ConfigInvalid("embedding.model required".into()))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(CoreError::ConfigInvalid(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::ConfigInvalid(e.to_string()))?;
        Ok(Self {
            model,
            dims: config.dims,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
            llm_topic_fallback: config.llm_topic_fallback,
            http,
        })
    }

    /// Calls the upstream API for a single batch (≤ `MAX_BATCH_SIZE` texts),
    /// retrying on 429/5xx/transport error with exponential backoff
    /// (1s,2s,4s,8s,16s,32s, capped), failing fast on other 4xx.
    async fn embed_batch(&self, batch: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| CoreError::EmbeddingUnavailable("OPENAI_API_KEY not set".into()))?;

        let prepared: Vec<String> = batch.iter().map(|t| truncate_input(t)).collect();
        let body = serde_json::json!({ "model": self.model, "input": prepared });

        let mut last_err: Option<String> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {api_key}"))
                .header("Content-Type", "application/json")
                .timeout(Duration::from_secs(self.timeout_secs))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| CoreError::EmbeddingProtocolError(e.to_string()))?;
                        return parse_embedding_response(&json);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("upstream error {status}: {text}"));
                        continue;
                    }
                    let text = response.text().await.unwrap_or_default();
                    return Err(CoreError::EmbeddingProtocolError(format!(
                        "upstream error {status}: {text}"
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }
        Err(CoreError::EmbeddingUnavailable(
            last_err.unwrap_or_else(|| "embedding failed after retries".into()),
        ))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn llm_configured(&self) -> bool {
        self.llm_topic_fallback
    }

    async fn embed(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            let mut vectors = self.embed_batch(batch).await?;
            results.append(&mut vectors);
        }
        Ok(results)
    }
}

fn parse_embedding_response(json: &serde_json::Value) -> CoreResult<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| CoreError::EmbeddingProtocolError("missing data array".into()))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| CoreError::EmbeddingProtocolError("missing embedding field".into()))?;
        let vec: Vec<f32> = embedding.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect();
        embeddings.push(vec);
    }
    Ok(embeddings)
}

/// Instantiates the configured client.
pub fn create_client(config: &EmbeddingConfig) -> CoreResult<Box<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledEmbeddingClient)),
        "openai" => Ok(Box::new(OpenAiEmbeddingClient::new(config)?)),
        other => Err(CoreError::ConfigInvalid(format!(
            "unknown embedding provider: {other}"
        ))),
    }
}

/// Encodes a float vector as little-endian bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decodes a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched-length
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_input_adds_ellipsis_only_when_cut() {
        let short = "hello";
        assert_eq!(truncate_input(short), short);
        let long = "a".repeat(MAX_INPUT_CHARS + 10);
        let truncated = truncate_input(&long);
        assert_eq!(truncated.chars().count(), MAX_INPUT_CHARS + 1);
        assert!(truncated.ends_with('\u{2026}'));
    }

    #[test]
    fn vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), vec.len() * 4);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_edge_cases() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn disabled_client_reports_unavailable() {
        let client = DisabledEmbeddingClient;
        let err = client.embed(&["x".to_string()]).await.unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::EmbeddingUnavailable);
    }
}
