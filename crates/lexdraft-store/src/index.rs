//! Corpus Index contract and the in-memory brute-force implementation.

use std::sync::Arc;

use lexdraft_ai::{TextEmbedder, cosine_similarity};
use tracing::{debug, info};

use crate::{PassageCatalog, StoreError};

/// Nearest-neighbour lookup over embedded passages.
///
/// Scores are raw similarities, higher is closer; their scale is up to the
/// index. Ids refer to [`PassageCatalog`] entries, but an index may return
/// ids the catalog does not know.
#[async_trait::async_trait]
pub trait CorpusIndex: Send + Sync {
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>, StoreError>;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;
}

/// Exhaustive cosine search over vectors held in memory.
pub struct MemoryIndex {
    embedder: Arc<dyn TextEmbedder>,
    entries: Vec<(String, Vec<f32>)>,
}

impl MemoryIndex {
    /// Embed every catalog passage once.
    pub fn build(
        catalog: &PassageCatalog,
        embedder: Arc<dyn TextEmbedder>,
    ) -> Result<Self, StoreError> {
        let texts: Vec<String> = catalog.iter().map(|p| p.searchable_text()).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = embedder.embed_batch(&refs)?;
        if vectors.len() != texts.len() {
            return Err(StoreError::Embedding(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        let entries: Vec<(String, Vec<f32>)> = catalog
            .iter()
            .map(|p| p.id.clone())
            .zip(vectors)
            .collect();
        info!(entries = entries.len(), dim = embedder.dim(), "built in-memory index");
        Ok(Self { embedder, entries })
    }

    /// Index over pre-computed vectors.
    pub fn from_vectors(embedder: Arc<dyn TextEmbedder>, entries: Vec<(String, Vec<f32>)>) -> Self {
        Self { embedder, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl CorpusIndex for MemoryIndex {
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>, StoreError> {
        let dim = self.embedder.dim();
        if query.len() != dim {
            return Err(StoreError::Dimension {
                expected: dim,
                got: query.len(),
            });
        }
        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .map(|(id, v)| (id.clone(), cosine_similarity(query, v)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        debug!(k, returned = scored.len(), "nearest neighbours");
        Ok(scored)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        Ok(self.embedder.embed_batch(&refs)?)
    }
}
