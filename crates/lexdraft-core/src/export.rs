//! The self-contained artifact produced by the export stage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::citation::Citation;
use crate::legal::Jurisdiction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportArtifact {
    pub content: String,
    pub citations: Vec<Citation>,
    pub trace: Vec<String>,
    pub metadata: ExportMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub jurisdiction: Jurisdiction,
    pub citation_count: usize,
    pub verification_passed: bool,
    pub generated_at: DateTime<Utc>,
    /// Role to model name, for every model actually used in the run.
    pub models_used: BTreeMap<String, String>,
}

impl ExportArtifact {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal::InstrumentType;
    use chrono::TimeZone;

    #[test]
    fn metadata_is_camel_case() {
        let artifact = ExportArtifact {
            content: "Draft".into(),
            citations: vec![Citation {
                title: "Companies Law".into(),
                section: None,
                url: None,
                jurisdiction: Jurisdiction::Primary,
                instrument_type: InstrumentType::Law,
            }],
            trace: vec!["Export completed".into()],
            metadata: ExportMetadata {
                jurisdiction: Jurisdiction::Primary,
                citation_count: 1,
                verification_passed: true,
                generated_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
                models_used: BTreeMap::from([("drafter".to_string(), "gpt-4.1".to_string())]),
            },
        };
        let value = serde_json::to_value(&artifact).unwrap();
        let meta = &value["metadata"];
        assert_eq!(meta["citationCount"], 1);
        assert_eq!(meta["verificationPassed"], true);
        assert_eq!(meta["generatedAt"], "2025-03-01T12:00:00Z");
        assert_eq!(meta["modelsUsed"]["drafter"], "gpt-4.1");
        assert_eq!(value["citations"][0]["instrumentType"], "Law");
    }
}
