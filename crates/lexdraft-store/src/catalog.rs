//! Passage metadata: the text and provenance behind every index entry.

use std::collections::HashMap;
use std::path::Path;

use lexdraft_core::text::excerpt;
use lexdraft_core::{CitationCandidate, InstrumentType, Jurisdiction, PassageSummary};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::StoreError;

pub const SNIPPET_CHARS: usize = 200;

/// One retrievable unit of a legal instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub id: String,
    /// Source document the passage was cut from.
    #[serde(default)]
    pub doc_id: String,
    pub title: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub jurisdiction: Jurisdiction,
    #[serde(default)]
    pub instrument_type: InstrumentType,
    pub content: String,
}

impl Passage {
    /// Text that gets embedded and keyword-matched.
    pub fn searchable_text(&self) -> String {
        match &self.section {
            Some(section) => format!("{} {}\n{}", self.title, section, self.content),
            None => format!("{}\n{}", self.title, self.content),
        }
    }

    /// Citation candidate carrying the first [`SNIPPET_CHARS`] characters of the content.
    pub fn candidate(&self) -> CitationCandidate {
        let mut candidate = CitationCandidate::new(self.title.clone(), self.jurisdiction)
            .with_instrument(self.instrument_type)
            .with_snippet(excerpt(&self.content, SNIPPET_CHARS));
        candidate.section = self.section.clone();
        candidate.url = self.url.clone();
        candidate
    }

    /// Whitespace-collapsed excerpt for prompts and review.
    pub fn summary(&self, score: f64, excerpt_chars: usize) -> PassageSummary {
        let flat = self.content.split_whitespace().collect::<Vec<_>>().join(" ");
        PassageSummary {
            passage_id: self.id.clone(),
            title: self.title.clone(),
            section: self.section.clone(),
            url: self.url.clone(),
            jurisdiction: self.jurisdiction,
            instrument_type: self.instrument_type,
            excerpt: excerpt(&flat, excerpt_chars),
            score,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CorpusFile {
    Bare(Vec<Passage>),
    Wrapped { passages: Vec<Passage> },
}

/// Id-addressable passage metadata, in load order.
#[derive(Debug, Clone, Default)]
pub struct PassageCatalog {
    passages: Vec<Passage>,
    by_id: HashMap<String, usize>,
}

impl PassageCatalog {
    pub fn from_passages(passages: Vec<Passage>) -> Result<Self, StoreError> {
        let mut by_id = HashMap::with_capacity(passages.len());
        for (i, p) in passages.iter().enumerate() {
            if by_id.insert(p.id.clone(), i).is_some() {
                return Err(StoreError::DuplicatePassage(p.id.clone()));
            }
        }
        Ok(Self { passages, by_id })
    }

    /// Parse either a JSON array of passages or `{"passages": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let passages = match serde_json::from_str::<CorpusFile>(json)? {
            CorpusFile::Bare(p) | CorpusFile::Wrapped { passages: p } => p,
        };
        Self::from_passages(passages)
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&raw)?;
        info!(path = %path.display(), passages = catalog.len(), "loaded corpus");
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Option<&Passage> {
        self.by_id.get(id).map(|&i| &self.passages[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Passage> {
        self.passages.iter()
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Passage counts per jurisdiction, for the CLI summary.
    pub fn jurisdiction_counts(&self) -> Vec<(Jurisdiction, usize)> {
        Jurisdiction::ALL
            .into_iter()
            .map(|j| (j, self.passages.iter().filter(|p| p.jurisdiction == j).count()))
            .filter(|(_, n)| *n > 0)
            .collect()
    }
}
