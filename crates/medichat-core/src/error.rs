use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf error: {0}")]
    Pdf(String),

    #[error("chunking error: {0}")]
    Chunking(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("llm error: {0}")]
    Llm(String),

    /// Carries the per-document reasons nothing could be indexed.
    #[error("no valid text found in uploaded documents")]
    NoDocumentText(Vec<String>),
}

pub type Result<T> = std::result::Result<T, CoreError>;
