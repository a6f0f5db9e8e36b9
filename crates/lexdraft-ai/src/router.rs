//! Capability-based model selection.
//!
//! [`StaticRouter`] maps each [`Capability`] to a default model, falls back
//! through a per-model chain when the default is unavailable, and promotes
//! long prompts to the long-context capability. A per-run override bypasses
//! all of that.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use lexdraft_core::Jurisdiction;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const OPENAI: &str = "openai";
pub const ANTHROPIC: &str = "anthropic";

/// Provider assumed for models missing from the provider table.
const FALLBACK_PROVIDER: &str = OPENAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    Reasoning,
    Generation,
    Verification,
    LongContext,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Self::Reasoning,
        Self::Generation,
        Self::Verification,
        Self::LongContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Generation => "generation",
            Self::Verification => "verification",
            Self::LongContext => "longContext",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A routed model and the provider that serves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelChoice {
    pub model: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouterError {
    #[error("no model available for {0}")]
    NoModel(Capability),
}

/// Outcome of [`ModelRouter::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoutingReport {
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub available_count: usize,
}

impl RoutingReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

pub trait ModelRouter: Send + Sync {
    /// Pick a model for `capability`. `override_model`, when set, is returned as-is.
    fn select_model(
        &self,
        capability: Capability,
        context_length: usize,
        jurisdiction: Jurisdiction,
        override_model: Option<&str>,
    ) -> Result<ModelChoice, RouterError>;

    fn validate(&self) -> RoutingReport;
}

/// Table-driven router.
#[derive(Debug, Clone)]
pub struct StaticRouter {
    defaults: BTreeMap<Capability, String>,
    providers: BTreeMap<String, String>,
    fallbacks: BTreeMap<String, Vec<String>>,
    available: BTreeSet<String>,
    long_context_threshold: usize,
}

impl Default for StaticRouter {
    /// Stock tables with every known model marked available.
    fn default() -> Self {
        let router = Self::with_available(std::iter::empty::<String>());
        let all: Vec<String> = router.providers.keys().cloned().collect();
        router.set_available(all)
    }
}

impl StaticRouter {
    /// Stock tables with only `available` models usable.
    pub fn with_available<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let defaults = BTreeMap::from([
            (Capability::Reasoning, "o1".to_string()),
            (Capability::Generation, "gpt-4.1".to_string()),
            (Capability::Verification, "claude-3.7-sonnet".to_string()),
            (Capability::LongContext, "claude-3.7-sonnet".to_string()),
        ]);
        let providers = [
            ("o1", OPENAI),
            ("o3", OPENAI),
            ("gpt-4.1", OPENAI),
            ("gpt-4-turbo", OPENAI),
            ("claude-3.7-sonnet", ANTHROPIC),
            ("claude-3-opus", ANTHROPIC),
            ("claude-3-haiku", ANTHROPIC),
        ]
        .into_iter()
        .map(|(m, p)| (m.to_string(), p.to_string()))
        .collect();
        let fallbacks = [
            ("o1", &["gpt-4.1", "claude-3.7-sonnet"][..]),
            ("gpt-4.1", &["gpt-4-turbo", "claude-3.7-sonnet"][..]),
            ("claude-3.7-sonnet", &["claude-3-opus", "gpt-4.1"][..]),
            ("o3", &["o1", "gpt-4.1"][..]),
            ("claude-3-opus", &["claude-3.7-sonnet", "gpt-4.1"][..]),
        ]
        .into_iter()
        .map(|(m, chain)| (m.to_string(), chain.iter().map(|s| s.to_string()).collect()))
        .collect();

        Self {
            defaults,
            providers,
            fallbacks,
            available: available.into_iter().map(Into::into).collect(),
            long_context_threshold: 32_000,
        }
    }

    /// Models of the given providers become available, e.g. those with an API key.
    pub fn for_providers(providers: &[&str]) -> Self {
        let router = Self::with_available(std::iter::empty::<String>());
        let models: Vec<String> = router
            .providers
            .iter()
            .filter(|(_, p)| providers.contains(&p.as_str()))
            .map(|(m, _)| m.clone())
            .collect();
        router.set_available(models)
    }

    pub fn set_available<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_long_context_threshold(mut self, chars: usize) -> Self {
        self.long_context_threshold = chars;
        self
    }

    pub fn with_default(mut self, capability: Capability, model: impl Into<String>) -> Self {
        self.defaults.insert(capability, model.into());
        self
    }

    pub fn is_available(&self, model: &str) -> bool {
        self.available.contains(model)
    }

    pub fn provider_for(&self, model: &str) -> &str {
        self.providers
            .get(model)
            .map(String::as_str)
            .unwrap_or(FALLBACK_PROVIDER)
    }

    fn choice(&self, model: &str) -> ModelChoice {
        ModelChoice {
            model: model.to_string(),
            provider: self.provider_for(model).to_string(),
        }
    }
}

impl ModelRouter for StaticRouter {
    fn select_model(
        &self,
        capability: Capability,
        context_length: usize,
        jurisdiction: Jurisdiction,
        override_model: Option<&str>,
    ) -> Result<ModelChoice, RouterError> {
        if let Some(model) = override_model {
            debug!(model, %capability, "using model override");
            return Ok(self.choice(model));
        }

        let capability = if context_length > self.long_context_threshold {
            Capability::LongContext
        } else {
            capability
        };

        let primary = self
            .defaults
            .get(&capability)
            .map(String::as_str)
            .unwrap_or("gpt-4.1");
        if self.is_available(primary) {
            debug!(model = primary, %capability, %jurisdiction, "routed to primary model");
            return Ok(self.choice(primary));
        }

        let chain = self.fallbacks.get(primary).map(Vec::as_slice).unwrap_or(&[]);
        if let Some(fallback) = chain.iter().find(|m| self.is_available(m)) {
            warn!(
                primary,
                fallback = %fallback,
                %capability,
                "primary model unavailable, using fallback"
            );
            return Ok(self.choice(fallback));
        }

        match self.available.iter().next() {
            Some(any) => {
                warn!(
                    primary,
                    model = %any,
                    %capability,
                    "no fallback available, using any available model"
                );
                Ok(self.choice(any))
            }
            None => Err(RouterError::NoModel(capability)),
        }
    }

    fn validate(&self) -> RoutingReport {
        let mut report = RoutingReport {
            available_count: self.available.len(),
            ..RoutingReport::default()
        };

        let has = |provider: &str| {
            self.available
                .iter()
                .any(|m| self.provider_for(m) == provider)
        };
        match (has(OPENAI), has(ANTHROPIC)) {
            (false, false) if self.available.is_empty() => report
                .issues
                .push("No models available - check API key configuration".into()),
            (false, false) => {}
            (false, true) => report
                .warnings
                .push("OpenAI models unavailable - limited to Anthropic models".into()),
            (true, false) => report
                .warnings
                .push("Anthropic models unavailable - limited to OpenAI models".into()),
            (true, true) => {}
        }

        for (capability, model) in &self.defaults {
            if self.is_available(model) {
                continue;
            }
            let chain = self.fallbacks.get(model).map(Vec::as_slice).unwrap_or(&[]);
            if chain.iter().any(|m| self.is_available(m)) {
                report.warnings.push(format!(
                    "Primary {capability} model ({model}) unavailable, using fallback"
                ));
            } else {
                report
                    .issues
                    .push(format!("No available model for {capability} capability"));
            }
        }
        report
    }
}
