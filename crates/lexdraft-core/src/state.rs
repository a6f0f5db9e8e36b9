//! Pipeline state, stage identifiers, and the pure delta-merge function.
//!
//! Stages never mutate the state they are given. Each returns a
//! [`StateDelta`]; the orchestrator folds it into a fresh snapshot with
//! [`apply_delta`], which is also where the error invariant is enforced:
//! once a state carries an error, later deltas can only extend the trace.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::citation::{Citation, CitationCandidate};
use crate::export::ExportArtifact;
use crate::legal::{InstrumentType, Jurisdiction};

/// The seven pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intake,
    Plan,
    Retrieve,
    Draft,
    Verify,
    Review,
    Export,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Self::Intake,
        Self::Plan,
        Self::Retrieve,
        Self::Draft,
        Self::Verify,
        Self::Review,
        Self::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Plan => "plan",
            Self::Retrieve => "retrieve",
            Self::Draft => "draft",
            Self::Verify => "verify",
            Self::Review => "review",
            Self::Export => "export",
        }
    }

    /// Stage that follows this one, or `None` after `Export`.
    pub fn next(&self) -> Option<Stage> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Whether the run halts after this stage when the state carries an error.
    pub fn halts_on_error(&self) -> bool {
        matches!(self, Self::Intake | Self::Plan | Self::Retrieve | Self::Draft)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy for fatal run failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid run inputs, detected during intake.
    Validation,
    /// A model call failed, was rate-limited, or a stage faulted unexpectedly.
    Provider,
    /// The corpus index could not be queried.
    Retrieval,
}

/// A fatal failure recorded on the state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct StageFailure {
    pub kind: ErrorKind,
    pub stage: Stage,
    pub message: String,
}

impl StageFailure {
    pub fn validation(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            stage,
            message: message.into(),
        }
    }

    pub fn provider(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Provider,
            stage,
            message: message.into(),
        }
    }

    pub fn retrieval(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Retrieval,
            stage,
            message: message.into(),
        }
    }
}

/// Caller inputs for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub instruction: String,
    #[serde(default)]
    pub jurisdiction: Option<Jurisdiction>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub reference_ids: Vec<String>,
    #[serde(default)]
    pub model_override: Option<String>,
}

impl RunRequest {
    pub fn new(instruction: impl Into<String>, jurisdiction: Jurisdiction) -> Self {
        Self {
            instruction: instruction.into(),
            jurisdiction: Some(jurisdiction),
            ..Self::default()
        }
    }

    pub fn with_template(mut self, template_id: impl Into<String>) -> Self {
        self.template_id = Some(template_id.into());
        self
    }

    pub fn with_references(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.reference_ids = ids.into_iter().collect();
        self
    }

    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }
}

/// Summary of one retrieved passage, kept on the state for drafting and verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageSummary {
    pub passage_id: String,
    pub title: String,
    pub section: Option<String>,
    pub url: Option<String>,
    pub jurisdiction: Jurisdiction,
    pub instrument_type: InstrumentType,
    pub excerpt: String,
    pub score: f64,
}

impl PassageSummary {
    /// The citation candidate this passage stands for.
    pub fn candidate(&self) -> CitationCandidate {
        CitationCandidate {
            title: self.title.clone(),
            section: self.section.clone(),
            url: self.url.clone(),
            jurisdiction: self.jurisdiction,
            instrument_type: self.instrument_type,
            snippet: Some(self.excerpt.clone()),
        }
    }
}

/// Material compiled for a human reviewer before export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPacket {
    pub draft: String,
    pub plan: String,
    pub citations: Vec<Citation>,
    pub verification_notes: Option<String>,
    pub verification_passed: bool,
    pub retrieved_count: usize,
    pub models_used: BTreeMap<String, String>,
    pub jurisdiction: Jurisdiction,
}

/// State threaded through every stage of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub instruction: String,
    pub jurisdiction: Option<Jurisdiction>,
    pub template_id: Option<String>,
    pub reference_ids: Vec<String>,
    pub model_override: Option<String>,
    /// Empty until planning completes.
    pub plan: String,
    pub passages: Vec<PassageSummary>,
    pub citations: Vec<Citation>,
    pub draft: String,
    pub verification_notes: Option<String>,
    pub verification_passed: bool,
    /// Role ("planner", "drafter", "verifier") to the model that served it.
    pub models_used: BTreeMap<String, String>,
    pub review: Option<ReviewPacket>,
    pub export: Option<ExportArtifact>,
    pub trace: Vec<String>,
    pub error: Option<StageFailure>,
}

impl PipelineState {
    pub fn new(request: RunRequest) -> Self {
        Self {
            instruction: request.instruction,
            jurisdiction: request.jurisdiction,
            template_id: request.template_id,
            reference_ids: request.reference_ids,
            model_override: request.model_override,
            ..Self::default()
        }
    }

    /// Jurisdiction used for boosting; intake guarantees it is set for later stages.
    pub fn preferred_jurisdiction(&self) -> Jurisdiction {
        self.jurisdiction.unwrap_or_default()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Merge a delta into a new snapshot. See [`apply_delta`].
    pub fn apply(&self, delta: StateDelta) -> Self {
        apply_delta(self, delta)
    }
}

/// Changes a stage wants made to the state.
///
/// `trace` is appended, `citations` are appended with de-duplication, and
/// every `Some` field replaces the previous value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    pub plan: Option<String>,
    pub passages: Option<Vec<PassageSummary>>,
    pub citations: Vec<Citation>,
    pub draft: Option<String>,
    pub verification_notes: Option<String>,
    pub verification_passed: Option<bool>,
    pub models_used: Vec<(String, String)>,
    pub review: Option<ReviewPacket>,
    pub export: Option<ExportArtifact>,
    pub trace: Vec<String>,
    pub error: Option<StageFailure>,
}

impl StateDelta {
    pub fn failed(error: StageFailure) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }

    /// True when the delta would change nothing but the trace.
    pub fn is_trace_only(&self) -> bool {
        let content = Self {
            trace: Vec::new(),
            ..self.clone()
        };
        content == Self::default()
    }
}

/// Pure merge of a stage delta into a state snapshot.
///
/// - The trace always grows.
/// - If the state already carries an error, nothing else changes.
/// - If the delta carries an error, only the error is recorded; content the
///   failing stage produced is dropped and earlier content is left intact.
pub fn apply_delta(state: &PipelineState, delta: StateDelta) -> PipelineState {
    let mut next = state.clone();
    next.trace.extend(delta.trace);

    if next.error.is_some() {
        return next;
    }
    if let Some(error) = delta.error {
        next.error = Some(error);
        return next;
    }

    if let Some(plan) = delta.plan {
        next.plan = plan;
    }
    if let Some(passages) = delta.passages {
        next.passages = passages;
    }
    for citation in delta.citations {
        if !next.citations.iter().any(|c| c.key() == citation.key()) {
            next.citations.push(citation);
        }
    }
    if let Some(draft) = delta.draft {
        next.draft = draft;
    }
    if let Some(notes) = delta.verification_notes {
        next.verification_notes = Some(notes);
    }
    if let Some(passed) = delta.verification_passed {
        next.verification_passed = passed;
    }
    for (role, model) in delta.models_used {
        next.models_used.insert(role, model);
    }
    if let Some(review) = delta.review {
        next.review = Some(review);
    }
    if let Some(export) = delta.export {
        next.export = Some(export);
    }
    next
}
