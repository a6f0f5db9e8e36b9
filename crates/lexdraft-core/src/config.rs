//! Pipeline configuration.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! yields the stock behaviour. Unknown fields are rejected to catch typos.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::verify::{CitationVerifier, DEFAULT_CACHE_CAPACITY, VerifyOptions};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub retrieval: RetrievalSettings,
    pub verification: VerificationSettings,
    pub generation: GenerationSettings,
    pub drafting: DraftingSettings,
    pub routing: RoutingSettings,
}

/// Retrieval Engine tunables; per-call retrieval contexts start from these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalSettings {
    pub max_results: usize,
    pub hybrid: bool,
    pub boost_preferred: bool,
    /// Multiplier applied to passages of the preferred jurisdiction.
    pub boost_factor: f64,
    pub vector_weight: f64,
    pub keyword_weight: f64,
    /// Nearest-neighbour candidates fetched per requested result.
    pub oversample: usize,
    pub min_similarity: f64,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_results: 10,
            hybrid: true,
            boost_preferred: true,
            boost_factor: 1.2,
            vector_weight: 0.7,
            keyword_weight: 0.3,
            oversample: 3,
            min_similarity: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationSettings {
    pub threshold: f64,
    pub jurisdiction_boost: f64,
    /// Upper bound on draft sentences checked by the verify stage.
    pub max_claims: usize,
    /// Verification results kept by the shared verifier.
    pub cache_capacity: u64,
}

impl VerificationSettings {
    pub fn options(&self) -> VerifyOptions {
        VerifyOptions {
            threshold: self.threshold,
            jurisdiction_boost: self.jurisdiction_boost,
        }
    }

    pub fn verifier(&self) -> CitationVerifier {
        CitationVerifier::with_capacity(self.options(), self.cache_capacity)
    }
}

impl Default for VerificationSettings {
    fn default() -> Self {
        let options = VerifyOptions::default();
        Self {
            threshold: options.threshold,
            jurisdiction_boost: options.jurisdiction_boost,
            max_claims: 12,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Sampling parameters for one model call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationSettings {
    pub plan: ModelParams,
    pub draft: ModelParams,
    pub verify: ModelParams,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            plan: ModelParams {
                max_tokens: 2000,
                temperature: 0.1,
            },
            draft: ModelParams {
                max_tokens: 4000,
                temperature: 0.2,
            },
            verify: ModelParams {
                max_tokens: 2000,
                temperature: 0.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DraftingSettings {
    /// Retrieved passages included in the drafting prompt.
    pub context_passages: usize,
    /// Characters kept from each passage.
    pub excerpt_chars: usize,
}

impl Default for DraftingSettings {
    fn default() -> Self {
        Self {
            context_passages: 5,
            excerpt_chars: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingSettings {
    /// Prompts longer than this (in chars) are routed to a long-context model.
    pub long_context_threshold: usize,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            long_context_threshold: 32_000,
        }
    }
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_path(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;
        let finite = [
            ("retrieval.boost_factor", r.boost_factor),
            ("retrieval.vector_weight", r.vector_weight),
            ("retrieval.keyword_weight", r.keyword_weight),
            ("retrieval.min_similarity", r.min_similarity),
            ("verification.threshold", self.verification.threshold),
            ("verification.jurisdiction_boost", self.verification.jurisdiction_boost),
        ];
        if let Some((name, value)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ConfigError::Invalid(format!("{name} must be finite, got {value}")));
        }
        if r.max_results == 0 {
            return Err(ConfigError::Invalid("retrieval.max_results must be > 0".into()));
        }
        if r.oversample == 0 {
            return Err(ConfigError::Invalid("retrieval.oversample must be > 0".into()));
        }
        if r.vector_weight < 0.0 || r.keyword_weight < 0.0 {
            return Err(ConfigError::Invalid("fusion weights must be non-negative".into()));
        }
        if r.boost_factor < 1.0 {
            return Err(ConfigError::Invalid("retrieval.boost_factor must be >= 1".into()));
        }
        let v = &self.verification;
        if !(0.0..=1.0).contains(&v.threshold) {
            return Err(ConfigError::Invalid(
                "verification.threshold must be within [0, 1]".into(),
            ));
        }
        if v.jurisdiction_boost < 0.0 {
            return Err(ConfigError::Invalid(
                "verification.jurisdiction_boost must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_object_gives_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.retrieval.boost_factor, 1.2);
        assert_eq!(config.verification.threshold, 0.25);
        assert_eq!(config.verification.jurisdiction_boost, 0.1);
        assert_eq!(config.generation.draft.max_tokens, 4000);
        assert_eq!(config.routing.long_context_threshold, 32_000);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"retrieval": {"hybrid": false}, "verification": {"threshold": 0.4}}"#,
        )
        .unwrap();
        assert!(!config.retrieval.hybrid);
        assert_eq!(config.retrieval.max_results, 10);
        assert_eq!(config.verification.threshold, 0.4);
        assert_eq!(config.verification.max_claims, 12);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = PipelineConfig::from_json(r#"{"verification": {"threshold": 1.5}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = PipelineConfig::from_json(r#"{"retrieval": {"max_results": 0}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_non_finite_values() {
        let mut config = PipelineConfig::default();
        config.verification.threshold = f64::NAN;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, ConfigError::Invalid(msg) if msg.contains("verification.threshold")),
            "{err}"
        );

        let mut config = PipelineConfig::default();
        config.retrieval.boost_factor = f64::INFINITY;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PipelineConfig::default();
        config.retrieval.min_similarity = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn verifier_uses_configured_capacity() {
        let config = PipelineConfig::from_json(
            r#"{"verification": {"threshold": 0.5, "cache_capacity": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.verification.cache_capacity, 2);
        let verifier = config.verification.verifier();
        assert_eq!(verifier.options().threshold, 0.5);
        for claim in ["one", "two", "three", "four"] {
            verifier.verify(claim, &[], crate::Jurisdiction::Primary);
        }
        assert!(verifier.stats().entries <= 2);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = PipelineConfig::from_json(r#"{"retreival": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"drafting": {{"context_passages": 3}}}}"#).unwrap();
        let config = PipelineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.drafting.context_passages, 3);
        assert_eq!(config.drafting.excerpt_chars, 500);

        let missing = PipelineConfig::from_path(Path::new("/nonexistent/lexdraft.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
