use crate::config::{AppConfig, Provider};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Turns text into dense vectors. Documents and queries are embedded through
/// separate calls because some providers tune the vector to the task.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

pub fn embedder_from_config(config: &AppConfig) -> Result<Arc<dyn Embedder>> {
    match config.embedding.provider {
        Provider::Gemini => Ok(Arc::new(GeminiEmbedder::new(
            &config.gemini.base_url,
            &config.gemini.api_key()?,
            &config.embedding.model,
            config.embedding.batch_size,
        ))),
        Provider::Ollama => Ok(Arc::new(OllamaEmbedder::new(
            &config.ollama.base_url,
            &config.embedding.model,
        ))),
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
        .unwrap_or_default()
}

// -- Gemini --

pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    batch_size: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

impl GeminiEmbedder {
    pub fn new(base_url: &str, api_key: &str, model: &str, batch_size: usize) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model,
            batch_size: batch_size.max(1),
        }
    }

    fn request<'a>(&'a self, text: &'a str, task_type: &'static str) -> EmbedContentRequest<'a> {
        EmbedContentRequest {
            model: &self.model,
            content: Content {
                parts: [Part { text }],
            },
            task_type,
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, method: &str, body: &B) -> Result<String> {
        let url = format!("{}/{}:{method}", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Embedding(format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CoreError::Embedding(format!("read response: {e}")))?;
        if !status.is_success() {
            tracing::warn!("gemini {method} returned {status}");
            return Err(CoreError::Embedding(format!(
                "gemini returned status {status}: {text}"
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|t| self.request(t, "RETRIEVAL_DOCUMENT"))
                    .collect(),
            };
            let raw = self.post("batchEmbedContents", &body).await?;
            vectors.extend(parse_batch_response(&raw, batch.len())?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let body = self.request(text, "RETRIEVAL_QUERY");
        let raw = self.post("embedContent", &body).await?;
        let parsed: EmbedContentResponse = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Embedding(format!("parse response: {e}")))?;
        Ok(parsed.embedding.values)
    }
}

fn parse_batch_response(raw: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let parsed: BatchEmbedResponse = serde_json::from_str(raw)
        .map_err(|e| CoreError::Embedding(format!("parse response: {e}")))?;
    if parsed.embeddings.len() != expected {
        return Err(CoreError::Embedding(format!(
            "expected {expected} embeddings, got {}",
            parsed.embeddings.len()
        )));
    }
    Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
}

// -- Ollama --

pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: http_client(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let req = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(|e| CoreError::Embedding(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Embedding(format!(
                "ollama returned status {}",
                response.status()
            )));
        }

        let body: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Embedding(format!("parse response: {e}")))?;

        Ok(body.embedding)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_gets_prefix() {
        let e = GeminiEmbedder::new("https://example.test/v1beta/", "k", "embedding-001", 0);
        assert_eq!(e.model, "models/embedding-001");
        assert_eq!(e.base_url, "https://example.test/v1beta");
        assert_eq!(e.batch_size, 1);
    }

    #[test]
    fn test_request_body_shape() {
        let e = GeminiEmbedder::new("https://example.test", "k", "models/embedding-001", 100);
        let body = serde_json::to_value(e.request("aspirin", "RETRIEVAL_QUERY")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "models/embedding-001",
                "content": {"parts": [{"text": "aspirin"}]},
                "taskType": "RETRIEVAL_QUERY",
            })
        );
    }

    #[test]
    fn test_parse_batch_response() {
        let raw = r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#;
        let vectors = parse_batch_response(raw, 2).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_parse_batch_response_count_mismatch() {
        let raw = r#"{"embeddings":[{"values":[0.1]}]}"#;
        assert!(matches!(
            parse_batch_response(raw, 2),
            Err(CoreError::Embedding(_))
        ));
    }
}
