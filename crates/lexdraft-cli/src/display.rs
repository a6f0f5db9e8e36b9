//! Plain-text rendering for the CLI.
//!
//! Every renderer builds a `String` so output can be checked in tests; the
//! `print_*` wrappers write it to stdout.

use std::fmt::Write;

use lexdraft_core::{Citation, ExportArtifact, PipelineState, VerificationResult};
use lexdraft_store::RankedPassage;

const LABEL_WIDTH: usize = 14;
const MAX_TRACE_ITEMS: usize = 40;

// ── Export card ──

pub fn render_export_card(artifact: &ExportArtifact) -> String {
    let meta = &artifact.metadata;
    let mut out = String::new();

    let _ = writeln!(out, "=== Draft ({}) ===", meta.jurisdiction);
    let _ = writeln!(out);
    row(&mut out, "Generated", &meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string());
    row(
        &mut out,
        "Verification",
        if meta.verification_passed { "passed" } else { "flagged" },
    );
    row(&mut out, "Citations", &meta.citation_count.to_string());
    let models: Vec<String> = meta
        .models_used
        .iter()
        .map(|(role, model)| format!("{role}={model}"))
        .collect();
    if !models.is_empty() {
        row(&mut out, "Models", &models.join(", "));
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Content");
    for line in artifact.content.lines() {
        let _ = writeln!(out, "  {line}");
    }
    let _ = writeln!(out);

    if !artifact.citations.is_empty() {
        let _ = writeln!(out, "Citations");
        for (i, citation) in artifact.citations.iter().enumerate() {
            let _ = writeln!(out, "  {:>2}. {}", i + 1, citation_line(citation));
        }
        let _ = writeln!(out);
    }

    render_trace(&mut out, &artifact.trace);
    out
}

pub fn print_export_card(artifact: &ExportArtifact) {
    print!("{}", render_export_card(artifact));
}

// ── Failed run ──

/// The error and the trace up to the point of failure.
pub fn render_failure(state: &PipelineState) -> String {
    let mut out = String::new();
    if let Some(failure) = &state.error {
        let _ = writeln!(out, "=== Run failed ===");
        row(&mut out, "Stage", failure.stage.as_str());
        row(&mut out, "Kind", &format!("{:?}", failure.kind).to_lowercase());
        row(&mut out, "Error", &failure.message);
        let _ = writeln!(out);
    }
    render_trace(&mut out, &state.trace);
    out
}

pub fn print_failure(state: &PipelineState) {
    eprint!("{}", render_failure(state));
}

// ── Search results ──

pub fn render_ranked(hits: &[RankedPassage]) -> String {
    if hits.is_empty() {
        return "No passages matched.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:>2}  {:>6}  {:>6}  {:>6}  source",
        "#", "score", "vector", "keyword"
    );
    for (i, hit) in hits.iter().enumerate() {
        let p = &hit.passage;
        let _ = writeln!(
            out,
            "  {:>2}  {:>6.3}  {:>6.3}  {:>6.3}  {} [{} {}]",
            i + 1,
            hit.score,
            hit.vector_score,
            hit.keyword_score,
            heading(&p.title, p.section.as_deref()),
            p.jurisdiction,
            p.instrument_type.label(),
        );
    }
    out
}

pub fn print_ranked(hits: &[RankedPassage]) {
    print!("{}", render_ranked(hits));
}

// ── Verification ──

pub fn render_verification(claim: &str, result: &VerificationResult) -> String {
    let mut out = String::new();
    row(&mut out, "Claim", claim);
    row(
        &mut out,
        "Result",
        &format!(
            "{} (score {:.3})",
            if result.passed { "PASS" } else { "FAIL" },
            result.score
        ),
    );
    if let Some(best) = &result.best_candidate {
        row(&mut out, "Best match", &heading(&best.title, best.section.as_deref()));
    }
    if !result.ranked.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Candidates");
        for (candidate, score) in &result.ranked {
            let _ = writeln!(
                out,
                "  {score:.3}  {} [{}]",
                heading(&candidate.title, candidate.section.as_deref()),
                candidate.jurisdiction
            );
        }
    }
    out
}

pub fn print_verification(claim: &str, result: &VerificationResult) {
    print!("{}", render_verification(claim, result));
}

// ── Helpers ──

fn row(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "  {label:<width$} {value}", width = LABEL_WIDTH);
}

fn heading(title: &str, section: Option<&str>) -> String {
    match section {
        Some(section) => format!("{title}, {section}"),
        None => title.to_string(),
    }
}

fn citation_line(citation: &Citation) -> String {
    let mut line = format!(
        "{} [{} {}]",
        heading(&citation.title, citation.section.as_deref()),
        citation.jurisdiction,
        citation.instrument_type.label()
    );
    if let Some(url) = &citation.url {
        let _ = write!(line, " {url}");
    }
    line
}

fn render_trace(out: &mut String, trace: &[String]) {
    if trace.is_empty() {
        return;
    }
    let _ = writeln!(out, "Trace ({} steps)", trace.len());
    for label in trace.iter().take(MAX_TRACE_ITEMS) {
        let _ = writeln!(out, "  - {label}");
    }
    if trace.len() > MAX_TRACE_ITEMS {
        let _ = writeln!(out, "  ... and {} more", trace.len() - MAX_TRACE_ITEMS);
    }
}
