use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub documents: DocumentsConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks.
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: Provider,
    pub model: String,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8501".to_string(),
            max_upload_bytes: 200 * 1024 * 1024,
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            model: "models/embedding-001".to_string(),
            batch_size: 100,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Gemini,
            model: "gemini-2.5-flash".to_string(),
            temperature: None,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
        }
    }
}

impl GeminiConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(CoreError::Config(format!(
                "{} is not set; export it or add it to .env",
                self.api_key_env
            ))),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.medichat/config.toml`, creating defaults if missing.
    pub fn load() -> Result<Self> {
        let base_dir = Self::default_base_dir()?;
        let config_path = base_dir.join("config.toml");

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = AppConfig::default();
            fs::create_dir_all(&base_dir)?;
            let toml_str = toml::to_string_pretty(&config)
                .map_err(|e| CoreError::Config(format!("failed to serialize config: {e}")))?;
            fs::write(&config_path, toml_str)?;
            Ok(config)
        }
    }

    /// Load config from a specific path (for testing or custom setups).
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read config: {e}")))?;
        let config: AppConfig = toml::from_str(&contents)
            .map_err(|e| CoreError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default base directory (`~/.medichat`).
    pub fn default_base_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Config("could not determine home directory".to_string()))?;
        Ok(home.join(".medichat"))
    }

    pub fn validate(&self) -> Result<()> {
        let docs = &self.documents;
        if docs.chunk_size == 0 {
            return Err(CoreError::Config("documents.chunk_size must be > 0".into()));
        }
        if docs.chunk_overlap >= docs.chunk_size {
            return Err(CoreError::Config(format!(
                "documents.chunk_overlap ({}) must be smaller than chunk_size ({})",
                docs.chunk_overlap, docs.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(CoreError::Config("retrieval.top_k must be > 0".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(CoreError::Config("embedding.batch_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Initialize tracing/logging with env filter.
///
/// Respects `RUST_LOG` env var. Defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.documents.chunk_size, 1000);
        assert_eq!(config.documents.chunk_overlap, 200);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.llm.model, "gemini-2.5-flash");
        assert_eq!(config.embedding.model, "models/embedding-001");
        assert_eq!(config.llm.provider, Provider::Gemini);
        assert!(config.llm.temperature.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml() {
        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:9000"

[llm]
provider = "ollama"
model = "llama3.2"
temperature = 0.2

[retrieval]
top_k = 6
"#;
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(toml_content.as_bytes()).unwrap();

        let config = AppConfig::load_from(f.path()).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.llm.provider, Provider::Ollama);
        assert_eq!(config.llm.model, "llama3.2");
        assert_eq!(config.llm.temperature, Some(0.2));
        assert_eq!(config.retrieval.top_k, 6);
        // defaults for fields not specified
        assert_eq!(config.documents.chunk_size, 1000);
        assert_eq!(config.ollama.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"[documents]\nchunk_size = 100\nchunk_overlap = 100\n")
            .unwrap();

        let err = AppConfig::load_from(f.path()).unwrap_err();
        assert!(matches!(err, CoreError::Config(msg) if msg.contains("chunk_overlap")));
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let written = toml::to_string_pretty(&AppConfig::default()).unwrap();
        let parsed: AppConfig = toml::from_str(&written).unwrap();
        assert_eq!(parsed.server.max_upload_bytes, 200 * 1024 * 1024);
        assert!(parsed.llm.temperature.is_none());
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let gemini = GeminiConfig {
            api_key_env: "MEDICHAT_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..GeminiConfig::default()
        };
        assert!(matches!(gemini.api_key(), Err(CoreError::Config(_))));
    }
}
