//! Citation candidates, verified citations, and verification results.

use serde::{Deserialize, Serialize};

use crate::legal::{InstrumentType, Jurisdiction};

/// An unverified source reference produced by retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationCandidate {
    pub title: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub jurisdiction: Jurisdiction,
    #[serde(default)]
    pub instrument_type: InstrumentType,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl CitationCandidate {
    pub fn new(title: impl Into<String>, jurisdiction: Jurisdiction) -> Self {
        Self {
            title: title.into(),
            section: None,
            url: None,
            jurisdiction,
            instrument_type: InstrumentType::Other,
            snippet: None,
        }
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_instrument(mut self, instrument_type: InstrumentType) -> Self {
        self.instrument_type = instrument_type;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Title and section joined the way the verifier compares them.
    pub fn reference_text(&self) -> String {
        match &self.section {
            Some(section) => format!("{} {}", self.title, section),
            None => self.title.clone(),
        }
    }
}

/// A verified reference, safe to show to the user.
///
/// Only constructed from a passing [`VerificationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub title: String,
    pub section: Option<String>,
    pub url: Option<String>,
    pub jurisdiction: Jurisdiction,
    pub instrument_type: InstrumentType,
}

impl Citation {
    /// Identity used for de-duplication: the same instrument section cited twice is one citation.
    pub fn key(&self) -> (&str, Option<&str>) {
        (self.title.as_str(), self.section.as_deref())
    }
}

/// Outcome of verifying one claim against a candidate set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub passed: bool,
    /// Best candidate score in `[0, 1]`, rounded to three decimals.
    pub score: f64,
    pub best_candidate: Option<CitationCandidate>,
    /// Every candidate with its score, highest first.
    pub ranked: Vec<(CitationCandidate, f64)>,
}

impl VerificationResult {
    pub fn empty() -> Self {
        Self {
            passed: false,
            score: 0.0,
            best_candidate: None,
            ranked: Vec::new(),
        }
    }

    /// Reduce to a [`Citation`] if, and only if, verification passed.
    pub fn into_citation(self) -> Option<Citation> {
        if !self.passed {
            return None;
        }
        self.best_candidate.map(|c| Citation {
            title: c.title,
            section: c.section,
            url: c.url,
            jurisdiction: c.jurisdiction,
            instrument_type: c.instrument_type,
        })
    }
}
