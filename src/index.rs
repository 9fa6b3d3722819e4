//! In-memory vector index over (chunk, embedding) pairs.
//!
//! Built once per Process action and never mutated afterwards; processing
//! new files builds a fresh index. Search is exact brute-force cosine
//! similarity over every entry.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Chunk;

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// A chunk returned by [`VectorIndex::search`] with its similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dims: usize,
}

impl VectorIndex {
    /// Embed every chunk in batches of `batch_size` and load the results.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(chunks.len());
        let mut dims = 0usize;

        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                if dims == 0 {
                    dims = vector.len();
                } else if vector.len() != dims {
                    bail!(
                        "inconsistent embedding dimensions: expected {}, got {}",
                        dims,
                        vector.len()
                    );
                }
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    vector,
                });
            }
        }

        tracing::debug!(entries = entries.len(), dims, model = embedder.model_name(), "vector index built");
        Ok(Self { entries, dims })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Top `k` chunks by descending similarity; ties keep source order.
    pub fn search(&self, query_vec: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(query_vec, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }
}
