use crate::chunking::Chunker;
use crate::config::AppConfig;
use crate::embedding::Embedder;
use crate::error::{CoreError, Result};
use crate::index::{ScoredChunk, VectorIndex};
use crate::llm::Generator;
use crate::pdf::{self, UploadedDocument};
use crate::prompt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful "process documents" action.
#[derive(Debug)]
pub struct ProcessedDocuments {
    pub index: VectorIndex,
    /// Names of the documents that contributed text.
    pub documents: Vec<String>,
    /// Per-document problems that did not stop processing.
    pub warnings: Vec<String>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Distinct source documents of the retrieved chunks, best match first.
    pub sources: Vec<String>,
}

/// Retrieval-augmented question answering over uploaded PDFs.
#[derive(Clone)]
pub struct MediChat {
    config: AppConfig,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
}

impl MediChat {
    pub fn new(config: AppConfig, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Self {
        Self {
            config,
            embedder,
            generator,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Extract, chunk and embed a batch of uploads into a fresh index.
    ///
    /// Unreadable or empty documents are skipped with a warning. Fails with
    /// `CoreError::NoDocumentText` (carrying those warnings) when no document
    /// yields any text.
    pub async fn process_documents(&self, docs: Vec<UploadedDocument>) -> Result<ProcessedDocuments> {
        let chunker = Chunker::from_config(&self.config.documents)?;
        let mut warnings = Vec::new();
        let mut documents = Vec::new();
        let mut chunks = Vec::new();

        for doc in docs {
            if !doc.looks_like_pdf() {
                warnings.push(format!("{} is not a PDF file", doc.name));
                continue;
            }
            let text = match pdf::extract_text(doc.bytes).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to read {}: {e}", doc.name);
                    warnings.push(format!("Could not read {}", doc.name));
                    continue;
                }
            };
            if text.trim().is_empty() {
                warnings.push(format!("No text extracted from {}", doc.name));
                continue;
            }

            let doc_chunks = chunker.split_document(&doc.name, &text);
            debug!("{}: {} chars, {} chunks", doc.name, text.len(), doc_chunks.len());
            chunks.extend(doc_chunks);
            documents.push(doc.name);
        }

        if chunks.is_empty() {
            return Err(CoreError::NoDocumentText(warnings));
        }

        let chunk_count = chunks.len();
        let index = VectorIndex::from_chunks(chunks, self.embedder.as_ref()).await?;
        info!(
            "indexed {} documents into {chunk_count} chunks ({} skipped)",
            documents.len(),
            warnings.len()
        );

        Ok(ProcessedDocuments {
            index,
            documents,
            warnings,
            chunk_count,
        })
    }

    async fn retrieve(&self, index: &VectorIndex, question: &str) -> Result<(String, Vec<String>)> {
        let hits = index
            .similarity_search(question, self.config.retrieval.top_k, self.embedder.as_ref())
            .await?;
        debug!("retrieved {} chunks", hits.len());
        let prompt = prompt::build_prompt(&prompt::join_context(&hits), question);
        Ok((prompt, distinct_sources(&hits)))
    }

    pub async fn answer(&self, index: &VectorIndex, question: &str) -> Result<Answer> {
        let (prompt, sources) = self.retrieve(index, question).await?;
        let text = self.generator.generate(&prompt).await?;
        Ok(Answer { text, sources })
    }

    /// Like [`MediChat::answer`], but yields the reply as it is generated.
    pub async fn answer_stream(
        &self,
        index: &VectorIndex,
        question: &str,
    ) -> Result<(BoxStream<'_, Result<String>>, Vec<String>)> {
        let (prompt, sources) = self.retrieve(index, question).await?;
        Ok((self.generator.generate_stream(prompt), sources))
    }
}

fn distinct_sources(hits: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for hit in hits {
        if !sources.contains(&hit.chunk.source) {
            sources.push(hit.chunk.source.clone());
        }
    }
    sources
}
