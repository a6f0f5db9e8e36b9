//! Deterministic provider that needs no network.
//!
//! It recognises which role a prompt was built for from its section headings
//! and answers with a fixed-shape response built from the prompt itself: a
//! numbered plan, a draft quoting the retrieved context, or an approval.
//! Used by the CLI when no endpoint is configured.

use crate::prompts::{PLAN_HEADING, QUERY_HEADING, VERIFY_HEADING};
use crate::provider::{Completion, CompletionProvider, CompletionRequest, ProviderError, Usage};

#[derive(Debug, Clone)]
pub struct OfflineProvider {
    name: String,
}

impl Default for OfflineProvider {
    fn default() -> Self {
        Self::new("offline")
    }
}

impl OfflineProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn respond(prompt: &str) -> String {
        if let Some(draft) = section(prompt, VERIFY_HEADING) {
            let paragraphs = draft.split("\n\n").filter(|p| !p.trim().is_empty()).count();
            format!("Verification status: APPROVED. Reviewed {paragraphs} paragraphs offline.")
        } else if let Some(plan) = section(prompt, PLAN_HEADING) {
            draft_from(plan, section(prompt, "RETRIEVED CONTEXT:").unwrap_or_default())
        } else if let Some(query) = section(prompt, QUERY_HEADING) {
            let query = query.lines().next().unwrap_or_default().trim();
            format!(
                "1. Identify the legal issues raised by: {query}\n\
                 2. Consult primary-jurisdiction instruments first\n\
                 3. Draft the content with section-level citations\n\
                 4. Verify every citation before release"
            )
        } else {
            String::new()
        }
    }
}

/// Text following `heading` up to the next blank-line-separated ALL-CAPS heading.
fn section<'a>(prompt: &'a str, heading: &str) -> Option<&'a str> {
    let start = prompt.find(heading)? + heading.len();
    let rest = &prompt[start..];
    let end = rest
        .match_indices("\n\n")
        .map(|(i, _)| i)
        .find(|&i| is_heading(&rest[i + 2..]))
        .unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn is_heading(text: &str) -> bool {
    let line = text.lines().next().unwrap_or_default();
    match line.split_once(':') {
        Some((label, _)) => {
            !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c == ' ')
        }
        None => false,
    }
}

fn draft_from(plan: &str, context: &str) -> String {
    let mut paragraphs = vec![format!(
        "This note follows the approved plan:\n{}",
        plan.lines().next().unwrap_or_default().trim()
    )];
    for block in context.split("\n\n").filter(|b| !b.trim().is_empty()) {
        let mut lines = block.lines();
        let heading = lines
            .next()
            .unwrap_or_default()
            .trim_start_matches("**")
            .split("**")
            .next()
            .unwrap_or_default();
        let body: String = lines.collect::<Vec<_>>().join(" ");
        paragraphs.push(format!("Under {heading}: {}", body.trim()));
    }
    paragraphs.join("\n\n")
}

#[async_trait::async_trait]
impl CompletionProvider for OfflineProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let content = Self::respond(&request.prompt);
        let words = |s: &str| s.split_whitespace().count() as u32;
        let usage = Usage {
            prompt_tokens: words(&request.prompt),
            completion_tokens: words(&content),
            total_tokens: words(&request.prompt) + words(&content),
        };
        Ok(Completion {
            content,
            usage,
            finish_reason: "stop".into(),
        })
    }
}
