//! Per-stage progress recording.
//!
//! A [`StageProgress`] collects the trace labels one stage produces and, on a
//! streaming run, forwards each label, draft fragment and accepted citation
//! to the event channel the moment it is produced.

use std::sync::{Mutex, MutexGuard, PoisonError};

use lexdraft_core::{Citation, PipelineEvent, Stage};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

pub(crate) type EventSink = UnboundedSender<PipelineEvent>;

pub struct StageProgress {
    stage: Stage,
    labels: Mutex<Vec<String>>,
    sink: Option<EventSink>,
}

impl StageProgress {
    pub(crate) fn new(stage: Stage, sink: Option<EventSink>) -> Self {
        Self {
            stage,
            labels: Mutex::new(Vec::new()),
            sink,
        }
    }

    /// Recorder that keeps labels but emits nothing.
    pub fn detached(stage: Stage) -> Self {
        Self::new(stage, None)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Append a trace label.
    pub fn label(&self, label: impl Into<String>) {
        let label = label.into();
        debug!(stage = %self.stage, label = %label, "trace");
        self.emit(PipelineEvent::thinking(label.clone()));
        self.lock().push(label);
    }

    /// A fragment of draft text.
    pub fn chunk(&self, text: impl Into<String>) {
        self.emit(PipelineEvent::chunk(text));
    }

    /// A citation newly accepted into the run.
    pub fn citation(&self, citation: &Citation) {
        self.emit(PipelineEvent::from(citation));
    }

    /// Labels recorded so far, without draining them.
    pub fn labels(&self) -> Vec<String> {
        self.lock().clone()
    }

    pub(crate) fn take_trace(&self) -> Vec<String> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.labels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(sink) = &self.sink {
            // A closed receiver means the stream was abandoned; the run is
            // torn down at its next suspension point.
            let _ = sink.send(event);
        }
    }
}
