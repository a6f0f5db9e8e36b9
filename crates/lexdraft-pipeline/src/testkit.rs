//! Scripted collaborators shared by the stage and orchestrator tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lexdraft_ai::prompts::{PLAN_HEADING, QUERY_HEADING, VERIFY_HEADING};
use lexdraft_ai::router::{ANTHROPIC, OPENAI};
use lexdraft_ai::{
    Completion, CompletionProvider, CompletionRequest, HashEmbedder, ProviderError,
    ProviderRegistry, StaticRouter, TextEmbedder, Usage,
};
use lexdraft_core::PipelineConfig;
use lexdraft_store::{MemoryIndex, PassageCatalog, RetrievalEngine};

use crate::PipelineDeps;

pub(crate) const CORPUS: &str = r#"[
    {"id": "emp-9", "docId": "emp", "title": "Employment Law", "section": "Part 9",
     "jurisdiction": "PRIMARY", "instrumentType": "Law",
     "content": "An employee is entitled to twenty working days of paid annual leave in each year."},
    {"id": "dp-27", "docId": "dp", "title": "Data Protection Regulations", "section": "Article 27",
     "jurisdiction": "SECONDARY_A", "instrumentType": "Regulation",
     "content": "A controller shall notify the Commissioner of a personal data breach without delay."},
    {"id": "cr-4", "docId": "cr", "title": "Court Procedure Rules", "section": "Rule 4",
     "jurisdiction": "SECONDARY_B", "instrumentType": "CourtRule",
     "content": "A claim form may be served outside the jurisdiction with permission."}
]"#;

#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Text(String),
    Fail(ProviderError),
    Panic,
    /// Never completes; records its own cancellation.
    Hang,
}

/// Provider that answers each role with a fixed reply.
pub(crate) struct ScriptedProvider {
    plan: Reply,
    draft: Reply,
    verify: Reply,
    cancelled: Arc<AtomicBool>,
}

struct CancelFlag(Arc<AtomicBool>);

impl Drop for CancelFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    pub(crate) fn approving() -> Self {
        Self {
            plan: Reply::Text("1. Cover annual leave\n2. Cite the Employment Law".into()),
            draft: Reply::Text(
                "Employees accrue annual leave under the Employment Law.\n\n\
                 The employer must keep leave records."
                    .into(),
            ),
            verify: Reply::Text("Verification status: APPROVED".into()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn plan(mut self, reply: Reply) -> Self {
        self.plan = reply;
        self
    }

    pub(crate) fn draft(mut self, reply: Reply) -> Self {
        self.draft = reply;
        self
    }

    pub(crate) fn verify(mut self, reply: Reply) -> Self {
        self.verify = reply;
        self
    }

    /// Set once a hanging call has been dropped.
    pub(crate) fn cancelled(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn reply_for(&self, prompt: &str) -> &Reply {
        if prompt.contains(VERIFY_HEADING) {
            &self.verify
        } else if prompt.contains(PLAN_HEADING) {
            &self.draft
        } else if prompt.contains(QUERY_HEADING) {
            &self.plan
        } else {
            panic!("unrecognised prompt: {prompt}")
        }
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        match self.reply_for(&request.prompt).clone() {
            Reply::Text(content) => Ok(Completion {
                content,
                usage: Usage::default(),
                finish_reason: "stop".into(),
            }),
            Reply::Fail(err) => Err(err),
            Reply::Panic => panic!("provider exploded"),
            Reply::Hang => {
                let _flag = CancelFlag(Arc::clone(&self.cancelled));
                std::future::pending().await
            }
        }
    }
}

pub(crate) fn engine() -> RetrievalEngine {
    let config = PipelineConfig::default();
    let catalog = Arc::new(PassageCatalog::from_json(CORPUS).unwrap());
    let embedder: Arc<dyn TextEmbedder> = Arc::new(HashEmbedder::default());
    let index = Arc::new(MemoryIndex::build(&catalog, embedder).unwrap());
    RetrievalEngine::new(index, catalog)
        .with_settings(config.retrieval.clone())
        .with_verifier(Arc::new(config.verification.verifier()))
}

pub(crate) fn deps_with_registry(registry: ProviderRegistry) -> PipelineDeps {
    PipelineDeps::new(Arc::new(StaticRouter::default()), registry, Arc::new(engine()))
}

/// Default router and corpus, `provider` serving both vendors.
pub(crate) fn deps_with(provider: ScriptedProvider) -> PipelineDeps {
    let provider: Arc<dyn CompletionProvider> = Arc::new(provider);
    let mut registry = ProviderRegistry::new();
    registry
        .register_as(OPENAI, Arc::clone(&provider))
        .register_as(ANTHROPIC, provider);
    deps_with_registry(registry)
}
