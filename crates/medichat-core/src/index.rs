use crate::chunking::DocumentChunk;
use crate::embedding::Embedder;
use crate::error::{CoreError, Result};
use serde::Serialize;

/// Number of chunks returned by a search when the caller has no preference.
pub const DEFAULT_TOP_K: usize = 4;

/// A retrieved chunk with its squared L2 distance to the query (lower is closer).
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub distance: f32,
}

/// Flat exact-search index over chunk embeddings.
///
/// Built once from a full set of chunks and never mutated; a new upload
/// replaces the whole index.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    chunks: Vec<DocumentChunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    pub async fn from_chunks(chunks: Vec<DocumentChunk>, embedder: &dyn Embedder) -> Result<Self> {
        if chunks.is_empty() {
            return Err(CoreError::Index("cannot build an index from zero chunks".into()));
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = embedder.embed_documents(&texts).await?;
        Self::from_parts(chunks, vectors)
    }

    /// Assemble an index from chunks and their precomputed embeddings.
    pub fn from_parts(chunks: Vec<DocumentChunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(CoreError::Index(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(CoreError::Index("embeddings must be non-empty".into()));
        }
        if let Some(pos) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(CoreError::Index(format!(
                "vector {pos} has dimension {}, expected {dimension}",
                vectors[pos].len()
            )));
        }

        Ok(Self {
            dimension,
            chunks,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = embedder.embed_query(query).await?;
        self.search_by_vector(&query_vector, k)
    }

    pub fn search_by_vector(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.dimension {
            return Err(CoreError::Index(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(query, v)))
            .collect();
        // stable sort keeps insertion order for equal distances; NaN sorts last
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, distance)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                distance,
            })
            .collect())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
