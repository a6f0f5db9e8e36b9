//! Progress events emitted by a streaming pipeline run.
//!
//! The JSON shape is a compatibility surface: a `type` discriminator plus
//! the fields listed on each variant, nothing else.

use serde::{Deserialize, Serialize};

use crate::citation::Citation;
use crate::legal::{InstrumentType, Jurisdiction};
use crate::state::Stage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A trace label, emitted the moment the stage produces it.
    ThinkingState { label: String },
    /// A fragment of draft text.
    Chunk { text: String },
    /// A newly accepted citation.
    Citation {
        title: String,
        section: Option<String>,
        url: Option<String>,
        #[serde(rename = "instrumentType")]
        instrument_type: InstrumentType,
        jurisdiction: Jurisdiction,
    },
    /// Terminal: the run failed.
    Error { message: String, stage: Stage },
    /// Terminal: the run completed.
    Done {},
}

impl PipelineEvent {
    pub fn thinking(label: impl Into<String>) -> Self {
        Self::ThinkingState {
            label: label.into(),
        }
    }

    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { text: text.into() }
    }

    /// No further events follow a terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done {})
    }

    /// Wire `type` discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ThinkingState { .. } => "thinking_state",
            Self::Chunk { .. } => "chunk",
            Self::Citation { .. } => "citation",
            Self::Error { .. } => "error",
            Self::Done {} => "done",
        }
    }
}

impl From<&Citation> for PipelineEvent {
    fn from(citation: &Citation) -> Self {
        Self::Citation {
            title: citation.title.clone(),
            section: citation.section.clone(),
            url: citation.url.clone(),
            instrument_type: citation.instrument_type,
            jurisdiction: citation.jurisdiction,
        }
    }
}
