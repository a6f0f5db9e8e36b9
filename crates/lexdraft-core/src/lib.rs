pub mod citation;
pub mod config;
pub mod event;
pub mod export;
pub mod legal;
pub mod state;
pub mod text;
pub mod verify;

pub use citation::{Citation, CitationCandidate, VerificationResult};
pub use config::{ConfigError, ModelParams, PipelineConfig, RetrievalSettings};
pub use event::PipelineEvent;
pub use export::{ExportArtifact, ExportMetadata};
pub use legal::{InstrumentType, Jurisdiction};
pub use state::{
    ErrorKind, PassageSummary, PipelineState, ReviewPacket, RunRequest, Stage, StageFailure,
    StateDelta, apply_delta,
};
pub use verify::{CitationVerifier, VerifyOptions, batch_verify, verify_citation};
