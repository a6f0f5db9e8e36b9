//! Jurisdiction and instrument taxonomies shared by retrieval, verification and export.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Legal jurisdiction a passage, citation or run is tagged with.
///
/// `Primary` is the jurisdiction the assistant is built around; the two
/// secondary jurisdictions are neighbouring regimes that are cited when the
/// primary instruments defer to them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Jurisdiction {
    #[default]
    Primary,
    SecondaryA,
    SecondaryB,
    Other,
}

impl Jurisdiction {
    pub const ALL: [Jurisdiction; 4] = [
        Self::Primary,
        Self::SecondaryA,
        Self::SecondaryB,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "PRIMARY",
            Self::SecondaryA => "SECONDARY_A",
            Self::SecondaryB => "SECONDARY_B",
            Self::Other => "OTHER",
        }
    }

    /// Names under which instruments of this jurisdiction refer to it.
    ///
    /// Used by legal-term extraction, so they must be lowercase single tokens.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Primary => &["difc"],
            Self::SecondaryA => &["dfsa"],
            Self::SecondaryB => &["uae", "dubai", "emirates"],
            Self::Other => &[],
        }
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Jurisdiction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|j| j.as_str() == upper)
            .ok_or_else(|| UnknownVariant {
                kind: "jurisdiction",
                value: s.to_string(),
            })
    }
}

/// Category of legal instrument a passage was taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InstrumentType {
    Law,
    Regulation,
    CourtRule,
    Rulebook,
    Notice,
    #[default]
    Other,
}

impl InstrumentType {
    pub const ALL: [InstrumentType; 6] = [
        Self::Law,
        Self::Regulation,
        Self::CourtRule,
        Self::Rulebook,
        Self::Notice,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Law => "Law",
            Self::Regulation => "Regulation",
            Self::CourtRule => "CourtRule",
            Self::Rulebook => "Rulebook",
            Self::Notice => "Notice",
            Self::Other => "Other",
        }
    }

    /// Human-readable label for rendered output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CourtRule => "Court Rule",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let squashed: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().to_ascii_lowercase() == squashed)
            .ok_or_else(|| UnknownVariant {
                kind: "instrument type",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jurisdiction_wire_names() {
        let json = serde_json::to_string(&Jurisdiction::SecondaryA).unwrap();
        assert_eq!(json, "\"SECONDARY_A\"");
        let parsed: Jurisdiction = serde_json::from_str("\"OTHER\"").unwrap();
        assert_eq!(parsed, Jurisdiction::Other);
    }

    #[test]
    fn jurisdiction_parses_loosely() {
        assert_eq!("primary".parse::<Jurisdiction>(), Ok(Jurisdiction::Primary));
        assert_eq!(
            "secondary-b".parse::<Jurisdiction>(),
            Ok(Jurisdiction::SecondaryB)
        );
        assert!("atlantis".parse::<Jurisdiction>().is_err());
    }

    #[test]
    fn instrument_type_parses_labels() {
        assert_eq!(
            "Court Rule".parse::<InstrumentType>(),
            Ok(InstrumentType::CourtRule)
        );
        assert_eq!("law".parse::<InstrumentType>(), Ok(InstrumentType::Law));
        assert_eq!(
            serde_json::to_string(&InstrumentType::CourtRule).unwrap(),
            "\"CourtRule\""
        );
    }

    #[test]
    fn aliases_are_lowercase_tokens() {
        for j in Jurisdiction::ALL {
            for alias in j.aliases() {
                assert_eq!(*alias, alias.to_lowercase());
                assert!(!alias.contains(' '));
            }
        }
    }
}
