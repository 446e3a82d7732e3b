pub mod assistant;
pub mod chat;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod pdf;
pub mod prompt;

pub use assistant::{Answer, MediChat, ProcessedDocuments};
pub use config::AppConfig;
pub use error::{CoreError, Result};
