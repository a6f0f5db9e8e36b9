//! Collaborator wiring: corpus, embedder, index and completion providers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use lexdraft_ai::router::{ANTHROPIC, OPENAI};
use lexdraft_ai::{
    CompletionProvider, HashEmbedder, OfflineProvider, ProviderRegistry, TextEmbedder,
};
use lexdraft_core::{CitationCandidate, PipelineConfig};
use lexdraft_store::{CorpusIndex, MemoryIndex, PassageCatalog, RetrievalEngine};
use tracing::{debug, info};

/// Where embeddings come from and where the index lives.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Directory holding `model.onnx` and `tokenizer.json`.
    pub model_dir: Option<PathBuf>,
    /// LanceDB directory; the index is kept in memory when unset.
    pub lance_dir: Option<PathBuf>,
}

pub fn embedder(model_dir: Option<&Path>) -> anyhow::Result<Arc<dyn TextEmbedder>> {
    match model_dir {
        #[cfg(feature = "onnx")]
        Some(dir) => {
            let onnx = lexdraft_ai::OnnxEmbedder::load(dir)
                .with_context(|| format!("loading embedding model from {}", dir.display()))?;
            Ok(Arc::new(onnx))
        }
        #[cfg(not(feature = "onnx"))]
        Some(dir) => anyhow::bail!(
            "--model-dir {} needs a build with the `onnx` feature",
            dir.display()
        ),
        None => Ok(Arc::new(HashEmbedder::default())),
    }
}

/// Load the corpus, index it, and assemble the Retrieval Engine.
pub async fn build_engine(
    corpus: &Path,
    config: &PipelineConfig,
    options: &IndexOptions,
) -> anyhow::Result<RetrievalEngine> {
    let start = Instant::now();
    let catalog = PassageCatalog::load(corpus)
        .with_context(|| format!("loading corpus {}", corpus.display()))?;
    anyhow::ensure!(!catalog.is_empty(), "corpus {} has no passages", corpus.display());
    let catalog = Arc::new(catalog);
    let embedder = embedder(options.model_dir.as_deref())?;

    let index: Arc<dyn CorpusIndex> = match options.lance_dir.as_deref() {
        #[cfg(feature = "lancedb")]
        Some(dir) => {
            let lance = lexdraft_store::LanceIndex::open(dir, embedder).await?;
            lance.build(&catalog).await.context("building LanceDB index")?;
            Arc::new(lance)
        }
        #[cfg(not(feature = "lancedb"))]
        Some(dir) => anyhow::bail!(
            "--lance-dir {} needs a build with the `lancedb` feature",
            dir.display()
        ),
        None => Arc::new(MemoryIndex::build(&catalog, embedder)?),
    };

    let verifier = Arc::new(config.verification.verifier());
    info!(
        passages = catalog.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "corpus indexed"
    );
    for (jurisdiction, count) in catalog.jurisdiction_counts() {
        debug!(%jurisdiction, passages = count, "corpus coverage");
    }
    Ok(RetrievalEngine::new(index, catalog)
        .with_settings(config.retrieval.clone())
        .with_verifier(verifier))
}

/// Providers for both vendor names the router hands out.
///
/// Without an endpoint every call is answered offline.
pub fn providers(
    endpoint: Option<&str>,
    api_key: Option<String>,
) -> anyhow::Result<ProviderRegistry> {
    let provider: Arc<dyn CompletionProvider> = match endpoint {
        #[cfg(feature = "http")]
        Some(url) => {
            info!(endpoint = url, "using HTTP completion endpoint");
            Arc::new(lexdraft_ai::HttpCompletionClient::new(url, api_key))
        }
        #[cfg(not(feature = "http"))]
        Some(url) => {
            let _ = api_key;
            anyhow::bail!("endpoint {url} needs a build with the `http` feature")
        }
        None => {
            info!("no completion endpoint configured, answering offline");
            Arc::new(OfflineProvider::default())
        }
    };
    let mut registry = ProviderRegistry::new();
    registry
        .register_as(OPENAI, Arc::clone(&provider))
        .register_as(ANTHROPIC, provider);
    Ok(registry)
}

/// Candidates for `lexdraft verify`: a JSON array of citation candidates.
pub fn load_candidates(path: &Path) -> anyhow::Result<Vec<CitationCandidate>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading candidates {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing candidates {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CORPUS: &str = r#"[
        {"id": "emp-9", "title": "Employment Law", "section": "Part 9",
         "jurisdiction": "PRIMARY", "instrumentType": "Law",
         "content": "An employee is entitled to paid annual leave."},
        {"id": "dp-27", "title": "Data Protection Regulations", "section": "Article 27",
         "jurisdiction": "SECONDARY_A", "instrumentType": "Regulation",
         "content": "A controller shall notify the Commissioner of a breach."}
    ]"#;

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn engine_indexes_the_corpus() {
        let corpus = write(CORPUS);
        let config = PipelineConfig::default();
        let engine = build_engine(corpus.path(), &config, &IndexOptions::default())
            .await
            .unwrap();
        assert_eq!(engine.catalog().len(), 2);

        let ctx = engine.context(
            "annual leave for employees",
            lexdraft_core::Jurisdiction::Primary,
        );
        let hits = engine.search(&ctx).await.unwrap();
        assert_eq!(hits[0].passage.id, "emp-9");
    }

    #[tokio::test]
    async fn empty_corpus_is_rejected() {
        let corpus = write("[]");
        let err = build_engine(corpus.path(), &PipelineConfig::default(), &IndexOptions::default())
            .await
            .err().unwrap();
        assert!(err.to_string().contains("has no passages"));
    }

    #[test]
    fn offline_registry_serves_both_vendors() {
        let registry = providers(None, None).unwrap();
        assert_eq!(registry.names(), vec![ANTHROPIC, OPENAI]);
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn model_dir_needs_onnx() {
        assert!(embedder(Some(Path::new("models/minilm"))).is_err());
    }

    #[test]
    fn candidates_parse_with_defaults() {
        let file = write(
            r#"[{"title": "Employment Law", "section": "Part 9"}, {"title": "Companies Law"}]"#,
        );
        let candidates = load_candidates(file.path()).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].section, None);
        assert!(load_candidates(Path::new("/nonexistent.json")).is_err());
    }
}
