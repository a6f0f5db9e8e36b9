//! Retrieval Engine: ranked, jurisdiction-boosted passages plus the
//! citations they support.
//!
//! Two rankings feed a hybrid search:
//!
//! - the vector leg, delegated to a [`CorpusIndex`], with the preferred
//!   jurisdiction's scores multiplied by the boost factor;
//! - the keyword leg, `|query terms ∩ passage terms| / |query terms|`,
//!   computed locally over the catalog.
//!
//! Each leg keeps its top `2 × max_results`. The legs are fused with
//! [`fuse`], a passage missing from one leg scoring 0 there. Non-hybrid
//! search uses the boosted vector leg alone. Either way results are sorted
//! by descending score (ties by passage id), filtered by the minimum
//! similarity, and truncated to `max_results`.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use lexdraft_core::text::word_set;
use lexdraft_core::{
    Citation, CitationCandidate, CitationVerifier, InstrumentType, Jurisdiction, PassageSummary,
    RetrievalSettings,
};
use tracing::{debug, info};

use crate::{CorpusIndex, Passage, PassageCatalog, StoreError};

/// Parameters of one retrieval call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalContext {
    pub query: String,
    pub jurisdiction: Jurisdiction,
    pub max_results: usize,
    pub boost_preferred: bool,
    pub hybrid: bool,
    pub min_similarity: f64,
}

impl RetrievalContext {
    pub fn new(query: impl Into<String>, jurisdiction: Jurisdiction) -> Self {
        Self::from_settings(query, jurisdiction, &RetrievalSettings::default())
    }

    pub fn from_settings(
        query: impl Into<String>,
        jurisdiction: Jurisdiction,
        settings: &RetrievalSettings,
    ) -> Self {
        Self {
            query: query.into(),
            jurisdiction,
            max_results: settings.max_results,
            boost_preferred: settings.boost_preferred,
            hybrid: settings.hybrid,
            min_similarity: settings.min_similarity,
        }
    }

    pub fn with_max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    pub fn with_hybrid(mut self, hybrid: bool) -> Self {
        self.hybrid = hybrid;
        self
    }

    pub fn with_boost(mut self, boost: bool) -> Self {
        self.boost_preferred = boost;
        self
    }

    pub fn with_min_similarity(mut self, min: f64) -> Self {
        self.min_similarity = min;
        self
    }
}

/// A passage with its final score and the per-leg scores behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedPassage {
    pub passage: Passage,
    pub score: f64,
    /// Vector-leg score after boosting.
    pub vector_score: f64,
    pub keyword_score: f64,
}

impl RankedPassage {
    pub fn candidate(&self) -> CitationCandidate {
        self.passage.candidate()
    }

    pub fn summary(&self, excerpt_chars: usize) -> PassageSummary {
        self.passage.summary(self.score, excerpt_chars)
    }
}

/// Weighted sum of the two legs.
pub fn fuse(
    vector_score: f64,
    keyword_score: f64,
    vector_weight: f64,
    keyword_weight: f64,
) -> f64 {
    vector_weight * vector_score + keyword_weight * keyword_score
}

/// Fuse two id-keyed rankings, treating an id absent from a leg as 0 there.
///
/// Returns `(id, fused, vector, keyword)` in descending fused order.
pub fn fuse_rankings(
    vector: &[(String, f64)],
    keyword: &[(String, f64)],
    vector_weight: f64,
    keyword_weight: f64,
) -> Vec<(String, f64, f64, f64)> {
    let mut legs: HashMap<&str, (f64, f64)> = HashMap::new();
    for (id, s) in vector {
        legs.entry(id.as_str()).or_default().0 = *s;
    }
    for (id, s) in keyword {
        legs.entry(id.as_str()).or_default().1 = *s;
    }
    let mut fused: Vec<(String, f64, f64, f64)> = legs
        .into_iter()
        .map(|(id, (v, k))| (id.to_string(), fuse(v, k, vector_weight, keyword_weight), v, k))
        .collect();
    fused.sort_by(|a, b| descending(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
    fused
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Ranks catalog passages for a query and turns them into verified citations.
pub struct RetrievalEngine {
    index: Arc<dyn CorpusIndex>,
    catalog: Arc<PassageCatalog>,
    settings: RetrievalSettings,
    verifier: Arc<CitationVerifier>,
    terms: HashMap<String, BTreeSet<String>>,
}

impl RetrievalEngine {
    pub fn new(index: Arc<dyn CorpusIndex>, catalog: Arc<PassageCatalog>) -> Self {
        let terms = catalog
            .iter()
            .map(|p| (p.id.clone(), word_set(&p.searchable_text())))
            .collect();
        Self {
            index,
            catalog,
            settings: RetrievalSettings::default(),
            verifier: Arc::new(CitationVerifier::default()),
            terms,
        }
    }

    pub fn with_settings(mut self, settings: RetrievalSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a verifier (and its cache) with other components.
    pub fn with_verifier(mut self, verifier: Arc<CitationVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Verifier shared by retrieval citations and draft verification.
    pub fn verifier(&self) -> &Arc<CitationVerifier> {
        &self.verifier
    }

    pub fn catalog(&self) -> &PassageCatalog {
        &self.catalog
    }

    pub fn context(
        &self,
        query: impl Into<String>,
        jurisdiction: Jurisdiction,
    ) -> RetrievalContext {
        RetrievalContext::from_settings(query, jurisdiction, &self.settings)
    }

    /// Ranked passages for `ctx`.
    pub async fn search(&self, ctx: &RetrievalContext) -> Result<Vec<RankedPassage>, StoreError> {
        self.ranked(ctx, |_| true).await
    }

    /// Ranked passages plus a citation for every passage the query itself
    /// verifies against, de-duplicated by title and section.
    pub async fn retrieve_with_citations(
        &self,
        ctx: &RetrievalContext,
    ) -> Result<(Vec<RankedPassage>, Vec<Citation>), StoreError> {
        let ranked = self.search(ctx).await?;
        let mut citations: Vec<Citation> = Vec::new();
        for hit in &ranked {
            let result = self
                .verifier
                .verify(&ctx.query, &[hit.candidate()], ctx.jurisdiction);
            if let Some(citation) = result.into_citation() {
                if !citations.iter().any(|c| c.key() == citation.key()) {
                    citations.push(citation);
                }
            }
        }
        info!(
            passages = ranked.len(),
            citations = citations.len(),
            jurisdiction = %ctx.jurisdiction,
            "retrieved with citations"
        );
        Ok((ranked, citations))
    }

    /// Search restricted to passages of one jurisdiction, boosted only when it is the primary one.
    pub async fn search_by_jurisdiction(
        &self,
        query: &str,
        jurisdiction: Jurisdiction,
        limit: usize,
    ) -> Result<Vec<RankedPassage>, StoreError> {
        let ctx = self
            .context(query, jurisdiction)
            .with_max_results(limit)
            .with_boost(jurisdiction == Jurisdiction::Primary);
        self.ranked(&ctx, |p| p.jurisdiction == jurisdiction).await
    }

    /// Search restricted to one instrument category, preferring `jurisdiction`.
    pub async fn search_by_instrument(
        &self,
        query: &str,
        instrument_type: InstrumentType,
        jurisdiction: Jurisdiction,
        limit: usize,
    ) -> Result<Vec<RankedPassage>, StoreError> {
        let ctx = self.context(query, jurisdiction).with_max_results(limit);
        self.ranked(&ctx, |p| p.instrument_type == instrument_type).await
    }

    async fn ranked<F>(
        &self,
        ctx: &RetrievalContext,
        keep: F,
    ) -> Result<Vec<RankedPassage>, StoreError>
    where
        F: Fn(&Passage) -> bool + Send + Sync,
    {
        if ctx.max_results == 0 || self.catalog.is_empty() {
            return Ok(Vec::new());
        }

        // No leg can hold more passages than the catalog.
        let wanted = ctx.max_results.min(self.catalog.len());
        let leg_size = if ctx.hybrid {
            wanted.saturating_mul(2)
        } else {
            wanted
        };
        let vector = self.vector_leg(ctx, leg_size, &keep).await?;

        let fused: Vec<(String, f64, f64, f64)> = if ctx.hybrid {
            let keyword = self.keyword_leg(&ctx.query, leg_size, &keep);
            fuse_rankings(
                &vector,
                &keyword,
                self.settings.vector_weight,
                self.settings.keyword_weight,
            )
        } else {
            vector
                .into_iter()
                .map(|(id, s)| (id, s, s, 0.0))
                .collect()
        };

        let mut results: Vec<RankedPassage> = fused
            .into_iter()
            .filter(|(_, score, _, _)| *score >= ctx.min_similarity)
            .filter_map(|(id, score, vector_score, keyword_score)| {
                self.catalog.get(&id).map(|p| RankedPassage {
                    passage: p.clone(),
                    score,
                    vector_score,
                    keyword_score,
                })
            })
            .collect();
        results.sort_by(|a, b| {
            descending(a.score, b.score).then_with(|| a.passage.id.cmp(&b.passage.id))
        });
        results.truncate(ctx.max_results);
        debug!(
            query = %ctx.query,
            hybrid = ctx.hybrid,
            returned = results.len(),
            "ranked passages"
        );
        Ok(results)
    }

    /// Boosted nearest-neighbour ranking, oversampled so that filtering and
    /// unknown ids still leave `size` results where possible.
    async fn vector_leg<F>(
        &self,
        ctx: &RetrievalContext,
        size: usize,
        keep: &F,
    ) -> Result<Vec<(String, f64)>, StoreError>
    where
        F: Fn(&Passage) -> bool + Send + Sync,
    {
        let query_vec = self
            .index
            .embed(std::slice::from_ref(&ctx.query))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Embedding("no vector for query".into()))?;
        let k = size
            .saturating_mul(self.settings.oversample.max(1))
            .min(self.catalog.len().max(size));
        let hits = self.index.nearest_neighbors(&query_vec, k).await?;

        let mut leg: Vec<(String, f64)> = Vec::with_capacity(hits.len());
        for (id, raw) in hits {
            let Some(passage) = self.catalog.get(&id) else {
                debug!(id = %id, "index hit has no catalog entry, skipping");
                continue;
            };
            if !keep(passage) {
                continue;
            }
            let mut score = raw as f64;
            if ctx.boost_preferred && passage.jurisdiction == ctx.jurisdiction {
                score *= self.settings.boost_factor;
            }
            leg.push((id, score));
        }
        leg.sort_by(|a, b| descending(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        leg.truncate(size);
        Ok(leg)
    }

    fn keyword_leg<F>(&self, query: &str, size: usize, keep: &F) -> Vec<(String, f64)>
    where
        F: Fn(&Passage) -> bool,
    {
        let query_terms = word_set(query);
        if query_terms.is_empty() {
            return Vec::new();
        }
        let mut leg: Vec<(String, f64)> = self
            .catalog
            .iter()
            .filter(|p| keep(p))
            .filter_map(|p| {
                let overlap = self.terms.get(&p.id)?.intersection(&query_terms).count();
                (overlap > 0).then(|| (p.id.clone(), overlap as f64 / query_terms.len() as f64))
            })
            .collect();
        leg.sort_by(|a, b| descending(a.1, b.1).then_with(|| a.0.cmp(&b.0)));
        leg.truncate(size);
        leg
    }
}
