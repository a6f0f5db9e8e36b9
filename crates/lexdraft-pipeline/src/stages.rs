//! The seven stage functions.
//!
//! Each stage reads a snapshot and returns a [`StateDelta`]; none mutates the
//! state it is given. Trace labels go through [`StageProgress`] and are folded
//! into the delta by the orchestrator, so a stage that fails or faults still
//! leaves its labels behind.

use chrono::Utc;
use lexdraft_ai::prompts::{self, Disclaimer};
use lexdraft_ai::{Capability, CompletionRequest, ModelChoice, ProviderError, RouterError};
use lexdraft_core::{
    Citation, ExportArtifact, ExportMetadata, ModelParams, PassageSummary, PipelineState,
    ReviewPacket, Stage, StageFailure, StateDelta,
};
use tracing::{debug, info, warn};

use crate::{PipelineDeps, StageProgress};

/// Sentences shorter than this are not checked as claims.
const MIN_CLAIM_WORDS: usize = 4;

#[derive(Debug, thiserror::Error)]
enum StageError {
    #[error(transparent)]
    Routing(#[from] RouterError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("model returned no content")]
    Empty,
}

impl StageError {
    /// Empty completions get a fixed message; everything else is prefixed.
    fn into_failure(self, stage: Stage, empty: &str, prefix: &str) -> StageFailure {
        match self {
            Self::Empty => StageFailure::provider(stage, empty),
            other => StageFailure::provider(stage, format!("{prefix}: {other}")),
        }
    }
}

struct ModelCall<'a> {
    capability: Capability,
    context_length: usize,
    /// Completes the label "Using {model} for {activity}".
    activity: &'a str,
    params: &'a ModelParams,
    prompt: String,
}

async fn call_model(
    deps: &PipelineDeps,
    state: &PipelineState,
    progress: &StageProgress,
    call: ModelCall<'_>,
) -> Result<(ModelChoice, String), StageError> {
    let choice = deps.router.select_model(
        call.capability,
        call.context_length,
        state.preferred_jurisdiction(),
        state.model_override.as_deref(),
    )?;
    progress.label(format!("Using {} for {}", choice.model, call.activity));

    let provider = deps.providers.get(&choice.provider)?;
    let request = CompletionRequest::new(choice.model.as_str(), call.prompt)
        .with_limits(call.params.max_tokens, call.params.temperature);
    let completion = provider.complete(&request).await?;
    debug!(
        model = %choice.model,
        provider = %choice.provider,
        total_tokens = completion.usage.total_tokens,
        finish_reason = %completion.finish_reason,
        "completion received"
    );
    if completion.content.trim().is_empty() {
        return Err(StageError::Empty);
    }
    Ok((choice, completion.content))
}

/// Validate run inputs and model availability.
pub async fn intake(
    state: &PipelineState,
    deps: &PipelineDeps,
    progress: &StageProgress,
) -> StateDelta {
    progress.label("Validating workflow inputs");

    if state.instruction.trim().is_empty() {
        warn!("intake rejected run: missing user prompt");
        return StateDelta::failed(StageFailure::validation(Stage::Intake, "Missing user prompt"));
    }
    if state.jurisdiction.is_none() {
        warn!("intake rejected run: missing jurisdiction");
        return StateDelta::failed(StageFailure::validation(
            Stage::Intake,
            "Missing jurisdiction",
        ));
    }

    let report = deps.router.validate();
    debug!(available = report.available_count, "model availability checked");
    for warning in &report.warnings {
        warn!(%warning, "model routing");
    }
    if !report.is_valid() {
        return StateDelta::failed(StageFailure::validation(
            Stage::Intake,
            format!("Model availability issues: {}", report.issues.join("; ")),
        ));
    }

    progress.label("Preflight validation completed");
    StateDelta::default()
}

pub async fn plan(
    state: &PipelineState,
    deps: &PipelineDeps,
    progress: &StageProgress,
) -> StateDelta {
    progress.label("Creating workflow plan");

    let prompt = prompts::planner_prompt(
        &state.instruction,
        state.preferred_jurisdiction(),
        state.template_id.as_deref(),
        &state.reference_ids,
    );
    let call = ModelCall {
        capability: Capability::Reasoning,
        context_length: prompt.len(),
        activity: "planning",
        params: &deps.config.generation.plan,
        prompt,
    };

    match call_model(deps, state, progress, call).await {
        Ok((choice, plan)) => {
            progress.label("Plan generation completed");
            info!(model = %choice.model, chars = plan.len(), "plan generated");
            StateDelta {
                plan: Some(plan),
                models_used: vec![("planner".into(), choice.model)],
                ..StateDelta::default()
            }
        }
        Err(err) => {
            warn!(error = %err, "planning failed");
            StateDelta::failed(err.into_failure(
                Stage::Plan,
                "Failed to generate plan",
                "Planning error",
            ))
        }
    }
}

/// Rank corpus passages for the instruction and accept the citations they support.
pub async fn retrieve(
    state: &PipelineState,
    deps: &PipelineDeps,
    progress: &StageProgress,
) -> StateDelta {
    progress.label("Retrieving sources and context");

    let ctx = deps
        .retrieval
        .context(state.instruction.as_str(), state.preferred_jurisdiction());
    let (ranked, citations) = match deps.retrieval.retrieve_with_citations(&ctx).await {
        Ok(found) => found,
        Err(err) => {
            warn!(error = %err, "retrieval failed");
            return StateDelta::failed(StageFailure::retrieval(
                Stage::Retrieve,
                format!("Retrieval error: {err}"),
            ));
        }
    };
    progress.label(format!("Retrieved {} relevant documents", ranked.len()));

    let excerpt_chars = deps.config.drafting.excerpt_chars;
    let passages: Vec<PassageSummary> = ranked.iter().map(|r| r.summary(excerpt_chars)).collect();
    let fresh = fresh_citations(&state.citations, citations);
    progress.label(format!("Generated {} verified citations", fresh.len()));
    for citation in &fresh {
        progress.citation(citation);
    }

    StateDelta {
        passages: Some(passages),
        citations: fresh,
        ..StateDelta::default()
    }
}

/// Generate the draft from the plan and retrieved context, then append the disclaimer.
pub async fn draft(
    state: &PipelineState,
    deps: &PipelineDeps,
    progress: &StageProgress,
) -> StateDelta {
    progress.label("Drafting content");

    let context = prompts::format_context(&state.passages, deps.config.drafting.context_passages);
    let call = ModelCall {
        capability: Capability::Generation,
        context_length: state.plan.len() + context.len(),
        activity: "drafting",
        params: &deps.config.generation.draft,
        prompt: prompts::drafter_prompt(&state.plan, &context, state.preferred_jurisdiction()),
    };

    match call_model(deps, state, progress, call).await {
        Ok((choice, body)) => {
            let disclaimer = Disclaimer::for_topic(&state.instruction);
            let draft = format!("{body}\n\n{}", disclaimer.text());
            for fragment in draft.split_inclusive("\n\n") {
                progress.chunk(fragment);
            }
            progress.label("Draft generation completed");
            info!(model = %choice.model, chars = draft.len(), ?disclaimer, "draft generated");
            StateDelta {
                draft: Some(draft),
                models_used: vec![("drafter".into(), choice.model)],
                ..StateDelta::default()
            }
        }
        Err(err) => {
            warn!(error = %err, "drafting failed");
            StateDelta::failed(err.into_failure(
                Stage::Draft,
                "Failed to generate draft",
                "Drafting error",
            ))
        }
    }
}

/// Check draft claims against the retrieved passages and ask the
/// verification model to review the draft.
///
/// Citations accepted from draft claims are only emitted once the review
/// call has succeeded, so a failed stage never announces content the state
/// will not keep.
pub async fn verify(
    state: &PipelineState,
    deps: &PipelineDeps,
    progress: &StageProgress,
) -> StateDelta {
    progress.label("Verifying citations and content accuracy");

    let disclaimer = Disclaimer::for_topic(&state.instruction);
    let body = state
        .draft
        .strip_suffix(disclaimer.text())
        .unwrap_or(state.draft.as_str());
    let claims = draft_claims(body, deps.config.verification.max_claims);
    let candidates: Vec<_> = state.passages.iter().map(PassageSummary::candidate).collect();
    let accepted = deps.retrieval.verifier().accepted_citations(
        &claims,
        &candidates,
        state.preferred_jurisdiction(),
    );
    let fresh = fresh_citations(&state.citations, accepted);
    debug!(claims = claims.len(), accepted = fresh.len(), "draft claims verified");

    let cited: Vec<Citation> = state.citations.iter().chain(&fresh).cloned().collect();
    let call = ModelCall {
        capability: Capability::Verification,
        context_length: state.draft.len(),
        activity: "verification",
        params: &deps.config.generation.verify,
        prompt: prompts::verifier_prompt(&state.draft, &cited),
    };

    match call_model(deps, state, progress, call).await {
        Ok((choice, notes)) => {
            let passed = prompts::review_approves(&notes);
            if passed {
                progress.label("Citation verification passed");
            } else {
                progress.label("Citation verification flagged issues");
            }
            if !fresh.is_empty() {
                progress.label(format!("Accepted {} citations from draft claims", fresh.len()));
            }
            for citation in &fresh {
                progress.citation(citation);
            }
            info!(model = %choice.model, passed, citations = cited.len(), "draft verified");
            StateDelta {
                citations: fresh,
                verification_notes: Some(notes),
                verification_passed: Some(passed),
                models_used: vec![("verifier".into(), choice.model)],
                ..StateDelta::default()
            }
        }
        Err(err) => {
            warn!(error = %err, "verification failed");
            StateDelta::failed(err.into_failure(
                Stage::Verify,
                "Failed to verify content",
                "Verification error",
            ))
        }
    }
}

/// Compile the review packet. Trace-only when the run already failed.
pub async fn review(
    state: &PipelineState,
    _deps: &PipelineDeps,
    progress: &StageProgress,
) -> StateDelta {
    progress.label("Preparing content for review");
    if state.has_error() {
        return StateDelta::default();
    }

    let packet = ReviewPacket {
        draft: state.draft.clone(),
        plan: state.plan.clone(),
        citations: state.citations.clone(),
        verification_notes: state.verification_notes.clone(),
        verification_passed: state.verification_passed,
        retrieved_count: state.passages.len(),
        models_used: state.models_used.clone(),
        jurisdiction: state.preferred_jurisdiction(),
    };
    progress.label("Content prepared for human review");
    StateDelta {
        review: Some(packet),
        ..StateDelta::default()
    }
}

/// Package the export artifact. Trace-only when the run already failed.
pub async fn export(
    state: &PipelineState,
    _deps: &PipelineDeps,
    progress: &StageProgress,
) -> StateDelta {
    progress.label("Exporting final content");
    if state.has_error() {
        return StateDelta::default();
    }

    progress.label("Export completed");
    let mut trace = state.trace.clone();
    trace.extend(progress.labels());
    let artifact = ExportArtifact {
        content: state.draft.clone(),
        citations: state.citations.clone(),
        trace,
        metadata: ExportMetadata {
            jurisdiction: state.preferred_jurisdiction(),
            citation_count: state.citations.len(),
            verification_passed: state.verification_passed,
            generated_at: Utc::now(),
            models_used: state.models_used.clone(),
        },
    };
    StateDelta {
        export: Some(artifact),
        ..StateDelta::default()
    }
}

/// Candidate claims: sentences of the draft with enough words to carry a
/// statement, first occurrence only, at most `limit`.
fn draft_claims(draft: &str, limit: usize) -> Vec<String> {
    let sentences = draft
        .lines()
        .map(|line| line.trim().trim_start_matches(['#', '-', '*', '>']).trim())
        .flat_map(|line| line.split_inclusive(['.', '!', '?']))
        .map(str::trim)
        .filter(|s| s.split_whitespace().count() >= MIN_CLAIM_WORDS);

    let mut claims: Vec<String> = Vec::new();
    for sentence in sentences {
        if claims.len() >= limit {
            break;
        }
        if !claims.iter().any(|c| c == sentence) {
            claims.push(sentence.to_string());
        }
    }
    claims
}

/// Incoming citations not already on the state, de-duplicated among themselves.
fn fresh_citations(existing: &[Citation], incoming: Vec<Citation>) -> Vec<Citation> {
    let mut fresh: Vec<Citation> = Vec::new();
    for citation in incoming {
        let seen = existing
            .iter()
            .chain(&fresh)
            .any(|c| c.key() == citation.key());
        if !seen {
            fresh.push(citation);
        }
    }
    fresh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{Reply, ScriptedProvider, deps_with};
    use lexdraft_core::{ErrorKind, InstrumentType, Jurisdiction, PipelineEvent, RunRequest};
    use tokio::sync::mpsc;

    fn started(instruction: &str) -> PipelineState {
        PipelineState::new(RunRequest::new(instruction, Jurisdiction::Primary))
    }

    fn employment_passage() -> PassageSummary {
        PassageSummary {
            passage_id: "emp-9".into(),
            title: "Employment Law".into(),
            section: Some("Part 9".into()),
            url: None,
            jurisdiction: Jurisdiction::Primary,
            instrument_type: InstrumentType::Law,
            excerpt: "An employee is entitled to annual leave.".into(),
            score: 0.8,
        }
    }

    fn citation(title: &str, section: &str) -> Citation {
        Citation {
            title: title.into(),
            section: Some(section.into()),
            url: None,
            jurisdiction: Jurisdiction::Primary,
            instrument_type: InstrumentType::Law,
        }
    }

    #[test]
    fn claims_skip_short_fragments_and_duplicates() {
        let draft = "# Annual leave\n\n\
                     Employees accrue annual leave under the Employment Law. See below.\n\
                     - Employees accrue annual leave under the Employment Law.\n\
                     The employer must keep leave records!";
        let claims = draft_claims(draft, 10);
        assert_eq!(
            claims,
            vec![
                "Employees accrue annual leave under the Employment Law.",
                "The employer must keep leave records!",
            ]
        );
        assert_eq!(draft_claims(draft, 1).len(), 1);
        assert!(draft_claims(draft, 0).is_empty());
    }

    #[test]
    fn fresh_citations_drop_known_and_repeated_keys() {
        let existing = vec![citation("Employment Law", "Part 9")];
        let incoming = vec![
            citation("Employment Law", "Part 9"),
            citation("Data Protection Law", "Article 27"),
            citation("Data Protection Law", "Article 27"),
        ];
        let fresh = fresh_citations(&existing, incoming);
        assert_eq!(fresh, vec![citation("Data Protection Law", "Article 27")]);
    }

    #[test]
    fn stage_errors_map_to_messages() {
        let empty = StageError::Empty.into_failure(
            Stage::Plan,
            "Failed to generate plan",
            "Planning error",
        );
        assert_eq!(empty.message, "Failed to generate plan");
        assert_eq!(empty.kind, ErrorKind::Provider);

        let routed = StageError::from(RouterError::NoModel(Capability::Generation))
            .into_failure(Stage::Draft, "Failed to generate draft", "Drafting error");
        assert_eq!(routed.message, "Drafting error: no model available for generation");
        assert_eq!(routed.stage, Stage::Draft);
    }

    #[tokio::test]
    async fn intake_treats_whitespace_as_missing() {
        let deps = deps_with(ScriptedProvider::approving());
        let progress = StageProgress::detached(Stage::Intake);
        let delta = intake(&started("   \n"), &deps, &progress).await;

        let error = delta.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert_eq!(error.message, "Missing user prompt");
        assert_eq!(progress.labels(), vec!["Validating workflow inputs"]);
    }

    #[tokio::test]
    async fn intake_requires_jurisdiction() {
        let deps = deps_with(ScriptedProvider::approving());
        let progress = StageProgress::detached(Stage::Intake);
        let state = PipelineState::new(RunRequest {
            instruction: "Draft a leave policy".into(),
            ..RunRequest::default()
        });
        let delta = intake(&state, &deps, &progress).await;
        assert_eq!(delta.error.unwrap().message, "Missing jurisdiction");
    }

    #[tokio::test]
    async fn plan_failure_keeps_labels_and_drops_content() {
        let provider =
            ScriptedProvider::approving().plan(Reply::Fail(ProviderError::timeout("slow")));
        let deps = deps_with(provider);
        let progress = StageProgress::detached(Stage::Plan);
        let delta = plan(&started("Draft a leave policy"), &deps, &progress).await;

        assert!(delta.plan.is_none());
        assert_eq!(delta.error.unwrap().message, "Planning error: timeout: slow");
        assert_eq!(
            progress.labels(),
            vec!["Creating workflow plan", "Using o1 for planning"]
        );
    }

    #[tokio::test]
    async fn draft_chunks_reassemble_the_draft() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let deps = deps_with(ScriptedProvider::approving());
        let progress = StageProgress::new(Stage::Draft, Some(tx));
        let mut state = started("Draft an employment leave policy");
        state.plan = "1. Cover annual leave".into();
        state.passages = vec![employment_passage()];

        let delta = draft(&state, &deps, &progress).await;
        drop(progress);

        let draft = delta.draft.unwrap();
        assert!(draft.ends_with(Disclaimer::Standard.text()));
        let mut chunks = String::new();
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::Chunk { text } = event {
                chunks.push_str(&text);
            }
        }
        assert_eq!(chunks, draft);
        assert_eq!(delta.models_used, vec![("drafter".to_string(), "gpt-4.1".to_string())]);
    }

    #[tokio::test]
    async fn verify_accepts_citations_from_draft_claims() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let deps = deps_with(ScriptedProvider::approving());
        let progress = StageProgress::new(Stage::Verify, Some(tx));
        let mut state = started("Draft an employment leave policy");
        state.passages = vec![employment_passage()];
        state.draft = format!(
            "Annual leave is governed by the Employment Law Part 9.\n\n{}",
            Disclaimer::Standard.text()
        );

        let delta = verify(&state, &deps, &progress).await;
        drop(progress);

        assert_eq!(delta.verification_passed, Some(true));
        assert_eq!(delta.citations, vec![citation("Employment Law", "Part 9")]);
        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.kind());
        }
        assert_eq!(kinds.last(), Some(&"citation"));
        assert_eq!(kinds.iter().filter(|k| **k == "citation").count(), 1);
    }

    #[tokio::test]
    async fn verify_failure_emits_no_citations() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let deps = deps_with(ScriptedProvider::approving().verify(Reply::Text(String::new())));
        let progress = StageProgress::new(Stage::Verify, Some(tx));
        let mut state = started("Draft an employment leave policy");
        state.passages = vec![employment_passage()];
        state.draft = "Annual leave is governed by the Employment Law Part 9.".into();

        let delta = verify(&state, &deps, &progress).await;
        drop(progress);

        assert_eq!(delta.error.unwrap().message, "Failed to verify content");
        while let Some(event) = rx.recv().await {
            assert_eq!(event.kind(), "thinking_state");
        }
    }

    #[tokio::test]
    async fn review_and_export_are_trace_only_after_an_error() {
        let deps = deps_with(ScriptedProvider::approving());
        let mut state = started("Draft a leave policy");
        state.error = Some(StageFailure::provider(Stage::Verify, "Failed to verify content"));

        let progress = StageProgress::detached(Stage::Review);
        assert!(review(&state, &deps, &progress).await.is_trace_only());
        assert_eq!(progress.labels(), vec!["Preparing content for review"]);

        let progress = StageProgress::detached(Stage::Export);
        assert!(export(&state, &deps, &progress).await.is_trace_only());
        assert_eq!(progress.labels(), vec!["Exporting final content"]);
    }

    #[tokio::test]
    async fn export_trace_includes_its_own_labels() {
        let deps = deps_with(ScriptedProvider::approving());
        let mut state = started("Draft a leave policy");
        state.draft = "Draft".into();
        state.trace = vec!["Validating workflow inputs".into()];
        state.citations = vec![citation("Employment Law", "Part 9")];

        let progress = StageProgress::detached(Stage::Export);
        let artifact = export(&state, &deps, &progress).await.export.unwrap();
        assert_eq!(
            artifact.trace,
            vec!["Validating workflow inputs", "Exporting final content", "Export completed"]
        );
        assert_eq!(artifact.metadata.citation_count, 1);
        assert_eq!(artifact.metadata.jurisdiction, Jurisdiction::Primary);
    }
}
