//! Citation verification by normalised lexical similarity.
//!
//! A claim is scored against each candidate source as
//!
//! ```text
//! base     = max(jaccard(claim, title), jaccard(claim, section), jaccard(claim, title + section))
//! enhanced = min(0.7 * base + 0.3 * legal_term_overlap(claim, title + section), 1.0)
//! final    = min(enhanced + boost, 1.0)
//! ```
//!
//! where `boost` applies only to candidates in the preferred jurisdiction. A
//! claim passes when the best final score reaches the threshold.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::citation::{Citation, CitationCandidate, VerificationResult};
use crate::legal::Jurisdiction;
use crate::text::{jaccard_similarity, legal_term_overlap};

pub const DEFAULT_THRESHOLD: f64 = 0.25;
pub const DEFAULT_JURISDICTION_BOOST: f64 = 0.1;
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

const LEXICAL_WEIGHT: f64 = 0.7;
const TERM_WEIGHT: f64 = 0.3;

/// Tunables for [`verify_citation`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyOptions {
    pub threshold: f64,
    pub jurisdiction_boost: f64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            jurisdiction_boost: DEFAULT_JURISDICTION_BOOST,
        }
    }
}

/// Lexical + legal-term similarity of a claim to one candidate, before any boost.
pub fn enhanced_similarity(claim: &str, candidate: &CitationCandidate) -> f64 {
    if claim.trim().is_empty() || candidate.title.trim().is_empty() {
        return 0.0;
    }

    let reference = candidate.reference_text();
    let title_score = jaccard_similarity(claim, &candidate.title);
    let section_score = candidate
        .section
        .as_deref()
        .map(|s| jaccard_similarity(claim, s))
        .unwrap_or(0.0);
    let combined_score = jaccard_similarity(claim, &reference);

    let base = title_score.max(section_score).max(combined_score);
    let terms = legal_term_overlap(claim, &reference);

    (LEXICAL_WEIGHT * base + TERM_WEIGHT * terms).min(1.0)
}

/// Score one candidate for a claim, applying the preferred-jurisdiction boost.
pub fn score_candidate(
    claim: &str,
    candidate: &CitationCandidate,
    preferred: Jurisdiction,
    options: &VerifyOptions,
) -> f64 {
    let mut score = enhanced_similarity(claim, candidate);
    if candidate.jurisdiction == preferred {
        score += options.jurisdiction_boost;
    }
    score.min(1.0)
}

/// Verify a claim against a candidate set.
///
/// Empty claims or empty candidate sets fail with a zero score and no best match.
pub fn verify_citation(
    claim: &str,
    candidates: &[CitationCandidate],
    preferred: Jurisdiction,
    options: &VerifyOptions,
) -> VerificationResult {
    if claim.trim().is_empty() || candidates.is_empty() {
        return VerificationResult::empty();
    }

    let mut ranked: Vec<(CitationCandidate, f64)> = candidates
        .iter()
        .map(|c| (c.clone(), round3(score_candidate(claim, c, preferred, options))))
        .collect();

    // Stable sort keeps input order among equal scores.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (best, score) = ranked
        .first()
        .map(|(c, s)| (Some(c.clone()), *s))
        .unwrap_or((None, 0.0));

    VerificationResult {
        passed: score >= options.threshold,
        score,
        best_candidate: best,
        ranked,
    }
}

/// Verify many claims against one candidate set.
pub fn batch_verify(
    claims: &[String],
    candidates: &[CitationCandidate],
    preferred: Jurisdiction,
    options: &VerifyOptions,
) -> Vec<VerificationResult> {
    claims
        .iter()
        .map(|claim| verify_citation(claim, candidates, preferred, options))
        .collect()
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

// ── Memoising verifier ──

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    claim: String,
    candidates: Vec<CitationCandidate>,
    preferred: Jurisdiction,
    threshold_bits: u64,
    boost_bits: u64,
}

/// Cache statistics for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VerifierStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Shared citation verifier with a bounded memo.
///
/// Results are cached by the exact (claim, candidate list, preferred
/// jurisdiction, options) tuple, so a boosted score computed for one caller is
/// never returned to a caller with a different preferred jurisdiction. The
/// cache holds at most `capacity` results and evicts the least useful first.
pub struct CitationVerifier {
    options: VerifyOptions,
    cache: Cache<CacheKey, VerificationResult>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for CitationVerifier {
    fn default() -> Self {
        Self::new(VerifyOptions::default())
    }
}

impl fmt::Debug for CitationVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CitationVerifier")
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CitationVerifier {
    pub fn new(options: VerifyOptions) -> Self {
        Self::with_capacity(options, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(options: VerifyOptions, capacity: u64) -> Self {
        Self {
            options,
            cache: Cache::builder().max_capacity(capacity).build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Verify one claim, consulting the cache first.
    pub fn verify(
        &self,
        claim: &str,
        candidates: &[CitationCandidate],
        preferred: Jurisdiction,
    ) -> VerificationResult {
        let key = CacheKey {
            claim: claim.to_string(),
            candidates: candidates.to_vec(),
            preferred,
            threshold_bits: self.options.threshold.to_bits(),
            boost_bits: self.options.jurisdiction_boost.to_bits(),
        };

        if let Some(hit) = self.cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let result = verify_citation(claim, candidates, preferred, &self.options);
        debug!(
            score = result.score,
            passed = result.passed,
            candidates = candidates.len(),
            "verified claim"
        );
        self.cache.insert(key, result.clone());
        result
    }

    /// Verify many claims against the same candidates.
    pub fn verify_batch(
        &self,
        claims: &[String],
        candidates: &[CitationCandidate],
        preferred: Jurisdiction,
    ) -> Vec<VerificationResult> {
        claims
            .iter()
            .map(|claim| self.verify(claim, candidates, preferred))
            .collect()
    }

    /// Citations for every claim that passes, in claim order.
    pub fn accepted_citations(
        &self,
        claims: &[String],
        candidates: &[CitationCandidate],
        preferred: Jurisdiction,
    ) -> Vec<Citation> {
        self.verify_batch(claims, candidates, preferred)
            .into_iter()
            .filter_map(VerificationResult::into_citation)
            .collect()
    }

    pub fn stats(&self) -> VerifierStats {
        // Entry counts lag behind inserts and evictions until pending work runs.
        self.cache.run_pending_tasks();
        VerifierStats {
            entries: self.cache.entry_count() as usize,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
