use crate::config::{AppConfig, Provider};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// A hosted or local text-generation model.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Yields the reply as text deltas in arrival order.
    fn generate_stream(&self, prompt: String) -> BoxStream<'_, Result<String>>;

    async fn health_check(&self) -> bool;
}

pub fn generator_from_config(config: &AppConfig) -> Result<Arc<dyn Generator>> {
    match config.llm.provider {
        Provider::Gemini => Ok(Arc::new(GeminiClient::new(
            &config.gemini.base_url,
            &config.gemini.api_key()?,
            &config.llm.model,
            config.llm.temperature,
        ))),
        Provider::Ollama => Ok(Arc::new(OllamaClient::new(
            &config.ollama.base_url,
            &config.llm.model,
            config.llm.temperature,
        ))),
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_default()
}

/// Pops every complete line off the front of `buffer`.
///
/// Works on raw bytes so a code point split across network chunks stays
/// intact until its line is complete.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Split a byte stream into lines and map each through `parse`.
///
/// `parse` returns `None` for lines to skip and `Some((token, done))`
/// otherwise. The stream ends after the first `done` line.
fn line_tokens<'a, S, B, E, F>(bytes: S, mut parse: F) -> BoxStream<'a, Result<String>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'a,
    B: AsRef<[u8]> + Send + 'a,
    E: std::fmt::Display + Send + 'a,
    F: FnMut(&str) -> Option<Result<(String, bool)>> + Send + 'a,
{
    async_stream::try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer = Vec::new();

        'read: while let Some(chunk) = bytes.next().await {
            let chunk = chunk.map_err(|e| CoreError::Llm(format!("stream error: {e}")))?;
            buffer.extend_from_slice(chunk.as_ref());

            for line in drain_lines(&mut buffer) {
                let Some(parsed) = parse(&line) else {
                    continue;
                };
                let (token, done) = parsed?;
                if !token.is_empty() {
                    yield token;
                }
                if done {
                    break 'read;
                }
            }
        }
    }
    .boxed()
}

// -- Gemini --

pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, temperature: Option<f32>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.trim_start_matches("models/").to_string(),
            temperature,
        }
    }

    fn request_body(&self, prompt: &str) -> Value {
        let mut body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });
        if let Some(t) = self.temperature {
            body["generationConfig"] = json!({ "temperature": t });
        }
        body
    }

    async fn send(&self, method: &str, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/models/{}:{method}", self.base_url, self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!("gemini {method} returned {status}");
            return Err(CoreError::Llm(format!("gemini returned {status}: {body_text}")));
        }
        Ok(response)
    }
}

/// Concatenate the text parts of the first candidate.
pub(crate) fn candidate_text(response: &Value) -> Result<String> {
    let Some(candidate) = response["candidates"].as_array().and_then(|c| c.first()) else {
        let reason = response["promptFeedback"]["blockReason"]
            .as_str()
            .unwrap_or("no candidates returned");
        return Err(CoreError::Llm(format!("gemini returned no answer: {reason}")));
    };

    Ok(candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default())
}

/// Parse one line of a `streamGenerateContent?alt=sse` response.
///
/// Non-`data:` lines and undecodable payloads yield `None`.
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let data = line.strip_prefix("data:")?.trim();
    match serde_json::from_str::<Value>(data) {
        Ok(json) => Some(candidate_text(&json)),
        Err(e) => {
            tracing::warn!("failed to parse gemini chunk: {e}, line: {line}");
            None
        }
    }
}

#[async_trait]
impl Generator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .send("generateContent", &self.request_body(prompt))
            .await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| CoreError::Llm(format!("parse response: {e}")))?;
        candidate_text(&json)
    }

    fn generate_stream(&self, prompt: String) -> BoxStream<'_, Result<String>> {
        let body = self.request_body(&prompt);

        async_stream::try_stream! {
            let response = self.send("streamGenerateContent?alt=sse", &body).await?;
            let mut tokens = line_tokens(response.bytes_stream(), |line| {
                parse_sse_line(line).map(|r| r.map(|token| (token, false)))
            });
            while let Some(token) = tokens.next().await {
                let token = token?;
                yield token;
            }
        }
        .boxed()
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models/{}", self.base_url, self.model);
        matches!(
            self.client.get(&url).header("x-goog-api-key", &self.api_key).send().await,
            Ok(r) if r.status().is_success()
        )
    }
}

// -- Ollama --

pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, temperature: Option<f32>) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        }
    }

    fn request_body(&self, prompt: &str, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": stream,
        });
        if let Some(t) = self.temperature {
            body["options"] = json!({ "temperature": t });
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CoreError::Llm(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(CoreError::Llm(format!("ollama returned {status}: {body_text}")));
        }
        Ok(response)
    }
}

/// Parse one NDJSON line of a streaming `/api/chat` response into its
/// content delta and `done` flag.
fn parse_ndjson_line(line: &str) -> Option<(String, bool)> {
    match serde_json::from_str::<Value>(line) {
        Ok(json) => {
            let token = json["message"]["content"].as_str().unwrap_or("").to_string();
            Some((token, json["done"].as_bool().unwrap_or(false)))
        }
        Err(e) => {
            tracing::warn!("failed to parse ollama chunk: {e}, line: {line}");
            None
        }
    }
}

#[async_trait]
impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.send(&self.request_body(prompt, false)).await?;
        let json: Value = response
            .json()
            .await
            .map_err(|e| CoreError::Llm(format!("parse response: {e}")))?;
        Ok(json["message"]["content"].as_str().unwrap_or("").to_string())
    }

    fn generate_stream(&self, prompt: String) -> BoxStream<'_, Result<String>> {
        let body = self.request_body(&prompt, true);

        async_stream::try_stream! {
            let response = self.send(&body).await?;
            let mut tokens = line_tokens(response.bytes_stream(), |line| {
                parse_ndjson_line(line).map(Ok)
            });
            while let Some(token) = tokens.next().await {
                let token = token?;
                yield token;
            }
        }
        .boxed()
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(self.client.get(&url).send().await, Ok(r) if r.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_text_joins_parts() {
        let response = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Metformin "}, {"text": "lowers glucose."}]}
            }]
        });
        assert_eq!(candidate_text(&response).unwrap(), "Metformin lowers glucose.");
    }

    #[test]
    fn test_candidate_text_reports_block_reason() {
        let response = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = candidate_text(&response).unwrap_err();
        assert!(matches!(err, CoreError::Llm(msg) if msg.contains("SAFETY")));
    }

    #[test]
    fn test_gemini_request_body() {
        let client = GeminiClient::new("https://example.test/", "k", "models/gemini-2.5-flash", None);
        assert_eq!(client.model, "gemini-2.5-flash");
        let body = client.request_body("hi");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert!(body.get("generationConfig").is_none());

        let warm = GeminiClient::new("https://example.test", "k", "gemini-2.5-flash", Some(0.5));
        assert_eq!(warm.request_body("hi")["generationConfig"]["temperature"], 0.5);
    }

    #[test]
    fn test_ollama_request_body() {
        let client = OllamaClient::new("http://localhost:11434/", "llama3.2", Some(0.25));
        let body = client.request_body("hello", true);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["options"]["temperature"], 0.25);
    }

    #[test]
    fn test_drain_lines_keeps_partial_tail() {
        let mut buffer = b"data: {\"a\":1}\n\ndata: {\"b\"".to_vec();
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
        assert_eq!(buffer, b"data: {\"b\"");
    }

    #[test]
    fn test_drain_lines_waits_for_split_code_point() {
        let line = "{\"message\":{\"content\":\"Temp 38\u{b0}C\"}}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC2).unwrap() + 1;

        let mut buffer = line[..split].to_vec();
        assert!(drain_lines(&mut buffer).is_empty());
        buffer.extend_from_slice(&line[split..]);
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("Temp 38\u{b0}C"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parse_sse_line() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Dose 5 mg"}]}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap().unwrap(), "Dose 5 mg");

        assert!(parse_sse_line("event: ping").is_none());
        assert!(parse_sse_line("data: [non-json]").is_none());

        let blocked = r#"data: {"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = parse_sse_line(blocked).unwrap().unwrap_err();
        assert!(matches!(err, CoreError::Llm(msg) if msg.contains("SAFETY")));
    }

    #[test]
    fn test_parse_ndjson_line() {
        let (token, done) =
            parse_ndjson_line(r#"{"message":{"content":"Hb "},"done":false}"#).unwrap();
        assert_eq!(token, "Hb ");
        assert!(!done);

        let (token, done) = parse_ndjson_line(r#"{"message":{"content":""},"done":true}"#).unwrap();
        assert!(token.is_empty());
        assert!(done);

        assert!(parse_ndjson_line("not json").is_none());
    }

    fn chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = std::result::Result<Vec<u8>, std::io::Error>> {
        futures::stream::iter(parts.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_ndjson_stream_keeps_split_code_point() {
        let body = "{\"message\":{\"content\":\"Temp 38\u{b0}C\"},\"done\":true}\n".as_bytes();
        let split = body.iter().position(|&b| b == 0xC2).unwrap() + 1;
        let stream = chunks(vec![body[..split].to_vec(), body[split..].to_vec()]);

        let tokens: Vec<String> = line_tokens(stream, |line| parse_ndjson_line(line).map(Ok))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(tokens, vec!["Temp 38\u{b0}C".to_string()]);
    }

    #[tokio::test]
    async fn test_ndjson_stream_stops_at_done() {
        let body = concat!(
            "{\"message\":{\"content\":\"Normal \"},\"done\":false}\n",
            "{\"message\":{\"content\":\"range\"},\"done\":true}\n",
            "{\"message\":{\"content\":\"ignored\"},\"done\":false}\n",
        );
        let stream = chunks(vec![body.as_bytes().to_vec()]);

        let tokens: Vec<String> = line_tokens(stream, |line| parse_ndjson_line(line).map(Ok))
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(tokens.concat(), "Normal range");
    }

    #[tokio::test]
    async fn test_sse_stream_surfaces_block_reason() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Partial\"}]}}]}\n\n",
            "data: {\"promptFeedback\":{\"blockReason\":\"SAFETY\"}}\n\n",
        );
        let stream = chunks(vec![body.as_bytes().to_vec()]);

        let results: Vec<Result<String>> = line_tokens(stream, |line| {
            parse_sse_line(line).map(|r| r.map(|token| (token, false)))
        })
        .collect()
        .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "Partial");
        assert!(matches!(&results[1], Err(CoreError::Llm(msg)) if msg.contains("SAFETY")));
    }
}
