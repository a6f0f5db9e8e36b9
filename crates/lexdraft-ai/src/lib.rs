//! Language-model collaborators: completion providers, model routing,
//! text embeddings and prompt templates.

pub mod embedder;
pub mod offline;
pub mod prompts;
pub mod provider;
pub mod router;

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpCompletionClient;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;

pub use embedder::{HashEmbedder, TextEmbedder, cosine_similarity};
pub use offline::OfflineProvider;
pub use prompts::Disclaimer;
pub use provider::{
    Completion, CompletionProvider, CompletionRequest, ProviderError, ProviderErrorKind,
    ProviderRegistry, Usage,
};
pub use router::{Capability, ModelChoice, ModelRouter, RouterError, RoutingReport, StaticRouter};
