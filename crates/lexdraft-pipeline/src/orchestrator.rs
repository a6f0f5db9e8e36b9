//! Pipeline Orchestrator: walks the stage sequence, merges deltas, and
//! surfaces progress as a stream of events.
//!
//! ```text
//! Intake ─▶ Plan ─▶ Retrieve ─▶ Draft ─▶ Verify ─▶ Review ─▶ Export ─▶ done
//!    │        │         │         │
//!    └────────┴─────────┴─────────┴──▶ halt when the state carries an error
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::stream::{self, BoxStream, StreamExt};
use lexdraft_ai::{ModelRouter, ProviderRegistry};
use lexdraft_core::{
    PipelineConfig, PipelineEvent, PipelineState, RunRequest, Stage, StageFailure, StateDelta,
};
use lexdraft_store::RetrievalEngine;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::progress::EventSink;
use crate::{StageProgress, stages};

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Collaborators shared read-only by every run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub router: Arc<dyn ModelRouter>,
    pub providers: ProviderRegistry,
    pub retrieval: Arc<RetrievalEngine>,
    pub config: PipelineConfig,
}

impl PipelineDeps {
    pub fn new(
        router: Arc<dyn ModelRouter>,
        providers: ProviderRegistry,
        retrieval: Arc<RetrievalEngine>,
    ) -> Self {
        Self {
            router,
            providers,
            retrieval,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }
}

/// Runs drafting requests. Cheap to clone; runs share nothing mutable.
#[derive(Clone)]
pub struct Pipeline {
    deps: Arc<PipelineDeps>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps: Arc::new(deps),
        }
    }

    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    /// Run every stage and return the final state. Failures are reported on
    /// `state.error`, never as a panic or an `Err`.
    pub async fn run(&self, request: RunRequest) -> PipelineState {
        execute(&self.deps, request, None).await
    }

    /// Run on a spawned task, yielding events as they are produced.
    ///
    /// The stream always ends with exactly one `done` or `error` event.
    /// Dropping it abandons the run: the in-flight collaborator call is
    /// dropped at its next suspension point and no later stage runs.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run_stream(&self, request: RunRequest) -> BoxStream<'static, PipelineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let deps = Arc::clone(&self.deps);

        tokio::spawn(async move {
            tokio::select! {
                state = execute(&deps, request, Some(tx.clone())) => {
                    let _ = tx.send(terminal_event(&state));
                }
                () = tx.closed() => {
                    info!("event stream dropped, run abandoned");
                }
            }
        });

        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }
}

fn terminal_event(state: &PipelineState) -> PipelineEvent {
    match &state.error {
        Some(failure) => PipelineEvent::Error {
            message: failure.message.clone(),
            stage: failure.stage,
        },
        None => PipelineEvent::Done {},
    }
}

async fn execute(
    deps: &PipelineDeps,
    request: RunRequest,
    sink: Option<EventSink>,
) -> PipelineState {
    let run_id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);
    let mut state = PipelineState::new(request);
    info!(
        run_id,
        jurisdiction = ?state.jurisdiction,
        streaming = sink.is_some(),
        "pipeline run started"
    );

    let mut next = Some(Stage::Intake);
    while let Some(stage) = next {
        let progress = StageProgress::new(stage, sink.clone());
        let delta = run_stage(stage, &state, deps, &progress).await;
        state = state.apply(delta.with_trace(progress.take_trace()));

        if stage.halts_on_error() && state.has_error() {
            warn!(run_id, %stage, "pipeline halted");
            break;
        }
        next = stage.next();
    }

    match &state.error {
        Some(failure) => warn!(
            run_id,
            stage = %failure.stage,
            kind = ?failure.kind,
            error = %failure,
            trace = state.trace.len(),
            "pipeline run failed"
        ),
        None => info!(
            run_id,
            citations = state.citations.len(),
            trace = state.trace.len(),
            "pipeline run finished"
        ),
    }
    state
}

/// Run one stage, turning a panic into an error-bearing delta.
async fn run_stage(
    stage: Stage,
    state: &PipelineState,
    deps: &PipelineDeps,
    progress: &StageProgress,
) -> StateDelta {
    let work = async {
        match stage {
            Stage::Intake => stages::intake(state, deps, progress).await,
            Stage::Plan => stages::plan(state, deps, progress).await,
            Stage::Retrieve => stages::retrieve(state, deps, progress).await,
            Stage::Draft => stages::draft(state, deps, progress).await,
            Stage::Verify => stages::verify(state, deps, progress).await,
            Stage::Review => stages::review(state, deps, progress).await,
            Stage::Export => stages::export(state, deps, progress).await,
        }
    };

    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(delta) => delta,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(%stage, %reason, "stage panicked");
            StateDelta::failed(StageFailure::provider(
                stage,
                format!("Unexpected error in {stage} stage: {reason}"),
            ))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::testkit::{Reply, ScriptedProvider, deps_with, deps_with_registry};
    use lexdraft_ai::router::OPENAI;
    use lexdraft_ai::{CompletionProvider, ProviderError, StaticRouter};
    use lexdraft_core::{ErrorKind, Jurisdiction};

    const INSTRUCTION: &str = "Summarise annual leave under the Employment Law";

    fn pipeline(provider: ScriptedProvider) -> Pipeline {
        Pipeline::new(deps_with(provider))
    }

    fn request() -> RunRequest {
        RunRequest::new(INSTRUCTION, Jurisdiction::Primary)
    }

    async fn collect(pipeline: &Pipeline, request: RunRequest) -> Vec<PipelineEvent> {
        pipeline.run_stream(request).collect().await
    }

    fn labels(events: &[PipelineEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::ThinkingState { label } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn completes_every_stage() {
        let state = pipeline(ScriptedProvider::approving()).run(request()).await;

        assert!(state.error.is_none(), "{:?}", state.error);
        assert_eq!(state.trace.first().map(String::as_str), Some("Validating workflow inputs"));
        assert_eq!(state.trace.last().map(String::as_str), Some("Export completed"));
        assert!(state.trace.contains(&"Retrieved 3 relevant documents".to_string()));
        assert!(state.verification_passed);

        assert_eq!(state.citations.len(), 1);
        assert_eq!(state.citations[0].title, "Employment Law");
        assert_eq!(state.models_used["planner"], "o1");
        assert_eq!(state.models_used["drafter"], "gpt-4.1");
        assert_eq!(state.models_used["verifier"], "claude-3.7-sonnet");

        let review = state.review.as_ref().unwrap();
        assert_eq!(review.retrieved_count, 3);
        let export = state.export.as_ref().unwrap();
        assert_eq!(export.trace, state.trace);
        assert_eq!(export.content, state.draft);
        assert_eq!(export.metadata.citation_count, 1);
        assert_eq!(export.metadata.models_used, state.models_used);
    }

    #[tokio::test]
    async fn stream_mirrors_the_final_state() {
        let pipeline = pipeline(ScriptedProvider::approving());
        let state = pipeline.run(request()).await;
        let events = collect(&pipeline, request()).await;

        assert_eq!(labels(&events), state.trace);
        let chunks: String = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Chunk { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(chunks, state.draft);
        let citations = events.iter().filter(|e| e.kind() == "citation").count();
        assert_eq!(citations, state.citations.len());

        assert_eq!(events.last(), Some(&PipelineEvent::Done {}));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn empty_instruction_emits_one_label_then_error() {
        let pipeline = pipeline(ScriptedProvider::approving());
        let events = collect(&pipeline, RunRequest::new("", Jurisdiction::Primary)).await;

        assert_eq!(
            events,
            vec![
                PipelineEvent::thinking("Validating workflow inputs"),
                PipelineEvent::Error {
                    message: "Missing user prompt".into(),
                    stage: Stage::Intake,
                },
            ]
        );
    }

    #[tokio::test]
    async fn halts_after_the_first_failing_stage() {
        let provider = ScriptedProvider::approving()
            .plan(Reply::Fail(ProviderError::rate_limited("quota", Some(Duration::from_secs(3)))));
        let state = pipeline(provider).run(request()).await;

        let error = state.error.unwrap();
        assert_eq!(error.stage, Stage::Plan);
        assert_eq!(error.kind, ErrorKind::Provider);
        assert_eq!(error.message, "Planning error: rate limited: quota");
        assert_eq!(
            state.trace,
            vec![
                "Validating workflow inputs",
                "Preflight validation completed",
                "Creating workflow plan",
                "Using o1 for planning",
            ]
        );
        assert!(state.plan.is_empty());
        assert!(state.passages.is_empty());
        assert!(state.export.is_none());
    }

    #[tokio::test]
    async fn verification_failure_runs_review_and_export_as_trace_only() {
        let provider =
            ScriptedProvider::approving().verify(Reply::Fail(ProviderError::unavailable("503")));
        let pipeline = pipeline(provider);
        let state = pipeline.run(request()).await;

        assert_eq!(state.error.as_ref().unwrap().stage, Stage::Verify);
        assert!(!state.draft.is_empty());
        assert_eq!(state.citations.len(), 1);
        assert!(state.review.is_none());
        assert!(state.export.is_none());
        assert_eq!(
            &state.trace[state.trace.len() - 2..],
            ["Preparing content for review", "Exporting final content"]
        );

        let events = collect(&pipeline, request()).await;
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Error { stage: Stage::Verify, .. })
        ));
    }

    #[tokio::test]
    async fn stage_panic_becomes_a_provider_error() {
        let pipeline = pipeline(ScriptedProvider::approving().draft(Reply::Panic));
        let state = pipeline.run(request()).await;

        let error = state.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Provider);
        assert_eq!(error.stage, Stage::Draft);
        assert!(error.message.contains("provider exploded"), "{}", error.message);
        assert_eq!(state.trace.last().map(String::as_str), Some("Using gpt-4.1 for drafting"));

        let events = collect(&pipeline, request()).await;
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::Error { stage: Stage::Draft, .. })
        ));
        assert!(events.iter().all(|e| e.kind() != "chunk"));
    }

    #[tokio::test]
    async fn dropping_the_stream_cancels_the_in_flight_call() {
        let provider = ScriptedProvider::approving().draft(Reply::Hang);
        let cancelled = provider.cancelled();
        let pipeline = pipeline(provider);

        let mut events = pipeline.run_stream(request());
        while let Some(event) = events.next().await {
            if event == PipelineEvent::thinking("Using gpt-4.1 for drafting") {
                break;
            }
        }
        assert!(!cancelled.load(Ordering::SeqCst));
        drop(events);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !cancelled.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("hanging call was not dropped");
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_share_state() {
        let pipeline = pipeline(ScriptedProvider::approving());
        let runs = (0..8).map(|i| {
            let instruction = if i % 2 == 0 {
                format!("{INSTRUCTION} ({i})")
            } else {
                String::new()
            };
            let pipeline = pipeline.clone();
            async move { pipeline.run(RunRequest::new(instruction, Jurisdiction::Primary)).await }
        });
        let states = futures::future::join_all(runs).await;

        for (i, state) in states.iter().enumerate() {
            if i % 2 == 0 {
                assert!(state.error.is_none());
                assert!(state.instruction.ends_with(&format!("({i})")));
                assert_eq!(state.trace.last().map(String::as_str), Some("Export completed"));
            } else {
                assert_eq!(state.trace, vec!["Validating workflow inputs"]);
                assert_eq!(state.error.as_ref().unwrap().kind, ErrorKind::Validation);
            }
        }
    }

    #[tokio::test]
    async fn unregistered_provider_fails_the_stage_that_needs_it() {
        let provider: Arc<dyn CompletionProvider> = Arc::new(ScriptedProvider::approving());
        let mut registry = ProviderRegistry::new();
        registry.register_as(OPENAI, provider);
        let state = Pipeline::new(deps_with_registry(registry)).run(request()).await;

        let error = state.error.unwrap();
        assert_eq!(error.stage, Stage::Verify);
        assert!(
            error.message.starts_with("Verification error: unknown provider"),
            "{}",
            error.message
        );
    }

    #[tokio::test]
    async fn model_override_serves_every_role() {
        let state = pipeline(ScriptedProvider::approving())
            .run(request().with_model_override("gpt-4-turbo"))
            .await;

        assert!(state.error.is_none());
        assert!(state.models_used.values().all(|m| m == "gpt-4-turbo"));
        assert_eq!(state.models_used.len(), 3);
    }

    #[tokio::test]
    async fn intake_rejects_unroutable_configuration() {
        let deps = PipelineDeps {
            router: Arc::new(StaticRouter::with_available(Vec::<String>::new())),
            ..deps_with(ScriptedProvider::approving())
        };
        let state = Pipeline::new(deps).run(request()).await;

        let error = state.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert!(error.message.starts_with("Model availability issues: No models available"));
        assert_eq!(state.trace, vec!["Validating workflow inputs"]);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
