//! Text normalisation and lexical similarity for legal references.
//!
//! Everything here is pure and deterministic: the same inputs always produce
//! the same normalised form, word set and similarity score.
//!
//! # Legal terms
//!
//! Besides plain word overlap, claims and sources are compared on a small
//! vocabulary of legal-domain terms:
//!
//! - Numbered divisions: "Article 27", "Part 9", "Section 3A"
//! - Instrument keywords: law, regulation, rule, act, code, statute, ordinance
//! - Jurisdiction names (see [`Jurisdiction::aliases`])
//! - Practice areas: employment, data protection, commercial, corporate, financial
//! - Modal verbs: shall, must, may, required, prohibited, permitted

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::legal::Jurisdiction;

lazy_static! {
    static ref NUMBERED_DIVISION: Regex = Regex::new(
        r"\b(?:article|section|part|chapter|clause|paragraph|subsection|schedule)\s+\d+[a-z]?\b"
    )
    .unwrap();

    static ref INSTRUMENT_KEYWORD: Regex =
        Regex::new(r"\b(?:law|regulation|rule|act|code|statute|ordinance)\b").unwrap();

    static ref PRACTICE_AREA: Regex =
        Regex::new(r"\b(?:employment|data\s+protection|commercial|corporate|financial)\b").unwrap();

    static ref MODAL_VERB: Regex =
        Regex::new(r"\b(?:shall|must|may|required|prohibited|permitted)\b").unwrap();

    static ref JURISDICTION_NAME: Regex = {
        let names: Vec<&str> = Jurisdiction::ALL
            .iter()
            .flat_map(|j| j.aliases().iter().copied())
            .collect();
        Regex::new(&format!(r"\b(?:{})\b", names.join("|"))).unwrap()
    };
}

/// Lowercase, replace punctuation with spaces, and collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let mapped: String = text
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distinct words of the normalised text.
pub fn word_set(text: &str) -> BTreeSet<String> {
    normalize_text(text)
        .split(' ')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two sets: `|a ∩ b| / |a ∪ b|`, or 0 when either is empty.
pub fn set_jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Jaccard similarity of the word sets of two texts.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    set_jaccard(&word_set(a), &word_set(b))
}

/// Extract legal-domain terms from free text.
///
/// Multi-word terms are returned with single spaces ("data protection",
/// "article 27") so that spacing differences do not affect overlap.
pub fn legal_terms(text: &str) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    let mut terms = BTreeSet::new();
    for pattern in [
        &*NUMBERED_DIVISION,
        &*INSTRUMENT_KEYWORD,
        &*JURISDICTION_NAME,
        &*PRACTICE_AREA,
        &*MODAL_VERB,
    ] {
        for m in pattern.find_iter(&lower) {
            terms.insert(m.as_str().split_whitespace().collect::<Vec<_>>().join(" "));
        }
    }
    terms
}

/// Overlap of legal terms between two texts, with the same empty-set rule as [`set_jaccard`].
pub fn legal_term_overlap(a: &str, b: &str) -> f64 {
    set_jaccard(&legal_terms(a), &legal_terms(b))
}

/// Truncate to at most `max_chars` characters, appending an ellipsis when cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", text[..byte_idx].trim_end()),
        None => text.to_string(),
    }
}
