use crate::config::DocumentsConfig;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use text_splitter::{Characters, ChunkConfig, TextSplitter};

/// A piece of document text plus the name of the file it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub source: String,
    pub content: String,
}

/// Character-based splitter that prefers paragraph, then line, then word
/// boundaries, with a fixed overlap between neighbouring chunks.
pub struct Chunker {
    splitter: TextSplitter<Characters>,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(CoreError::Chunking("chunk size must be > 0".into()));
        }
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| CoreError::Chunking(format!("invalid chunk overlap: {e}")))?;
        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    pub fn from_config(config: &DocumentsConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.splitter.chunks(text).map(str::to_owned).collect()
    }

    pub fn split_document(&self, source: &str, text: &str) -> Vec<DocumentChunk> {
        self.splitter
            .chunks(text)
            .map(|content| DocumentChunk {
                source: source.to_string(),
                content: content.to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = Chunker::new(1000, 200).unwrap();
        let chunks = chunker.split("Patient presents with mild fever.");
        assert_eq!(chunks, vec!["Patient presents with mild fever.".to_string()]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let chunker = Chunker::new(1000, 200).unwrap();
        assert!(chunker.split("").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let chunker = Chunker::new(100, 20).unwrap();
        let text = (0..200)
            .map(|i| format!("word{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunker.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "chunk too long: {chunk}");
        }
        // overlap means the chunks together are longer than the source
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(total > text.len());
        assert!(chunks[0].starts_with("word0 "));
        assert!(chunks.last().unwrap().ends_with("word199"));
    }

    #[test]
    fn test_paragraph_boundaries_preferred() {
        let chunker = Chunker::new(60, 0).unwrap();
        let text = "First paragraph about blood pressure.\n\nSecond paragraph on dosage.";
        let chunks = chunker.split(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph about blood pressure.".to_string(),
                "Second paragraph on dosage.".to_string(),
            ]
        );
    }

    #[test]
    fn test_overlap_not_smaller_than_size_rejected() {
        assert!(matches!(Chunker::new(100, 100), Err(CoreError::Chunking(_))));
        assert!(matches!(Chunker::new(0, 0), Err(CoreError::Chunking(_))));
    }

    #[test]
    fn test_split_document_tags_source() {
        let chunker = Chunker::new(1000, 200).unwrap();
        let chunks = chunker.split_document("labs.pdf", "HbA1c 6.1%");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source, "labs.pdf");
        assert_eq!(chunks[0].content, "HbA1c 6.1%");
    }
}
