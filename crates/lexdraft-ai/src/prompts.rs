//! Prompt templates for the planner, drafter and verifier roles, and the
//! topic-sensitive disclaimer appended to every draft.

use lexdraft_core::{Citation, Jurisdiction, PassageSummary};

/// Section headings that mark which role a prompt was built for.
pub const QUERY_HEADING: &str = "USER QUERY:";
pub const PLAN_HEADING: &str = "APPROVED PLAN:";
pub const VERIFY_HEADING: &str = "CONTENT TO VERIFY:";

pub const SYSTEM_PREAMBLE: &str = "\
You are a legal research assistant that supports legal professionals with \
information and analysis grounded in a curated corpus of legal instruments.

DISCLAIMERS:
- This is NOT legal advice and must not be relied upon as such.
- Qualified legal counsel should be consulted on any specific matter.
- Laws and regulations change; current versions must be verified.

JURISDICTION FOCUS:
- Prioritise instruments of the requested jurisdiction.
- Cite neighbouring regimes only where the primary instruments defer to them.
- Always state which jurisdiction each reference belongs to.

CITATIONS:
- Give specific section references and the instrument type.
- Use the format [Document Title, Section X.Y, Jurisdiction].";

const PLANNER_ROLE: &str = "\
You plan legal research and drafting work.

Produce a numbered plan covering:
- the legal issues raised by the request
- the sources to consult, primary jurisdiction first
- research and drafting steps
- what must be verified before the content is released";

const DRAFTER_ROLE: &str = "\
You draft legal content from an approved plan.

- Use clear, professional legal language with headings.
- Support each statement with a citation from the retrieved context.
- Keep the jurisdictions of cited instruments distinct.
- Separate paragraphs with a blank line.";

const VERIFIER_ROLE: &str = "\
You verify drafted legal content.

Check that every citation has a section reference, that instrument types and \
jurisdictions are correct, that a non-advice disclaimer is present and that the \
tone is professional. Reply with a verification status: state APPROVED if the \
content can be released, otherwise list the issues to fix.";

fn with_role(role: &str, body: String) -> String {
    format!("{SYSTEM_PREAMBLE}\n\n{role}\n\n{body}")
}

pub fn planner_prompt(
    instruction: &str,
    jurisdiction: Jurisdiction,
    template_id: Option<&str>,
    reference_ids: &[String],
) -> String {
    let mut context = Vec::new();
    if let Some(id) = template_id {
        context.push(format!("template document: {id}"));
    }
    if !reference_ids.is_empty() {
        context.push(format!("reference documents: {}", reference_ids.join(", ")));
    }
    let context = if context.is_empty() {
        "No additional context provided".to_string()
    } else {
        context.join("\n")
    };
    with_role(
        PLANNER_ROLE,
        format!(
            "{QUERY_HEADING} {instruction}\n\n\
             PRIMARY JURISDICTION: {jurisdiction}\n\n\
             CONTEXT:\n{context}"
        ),
    )
}

/// Retrieved passages rendered for the drafting prompt.
pub fn format_context(passages: &[PassageSummary], limit: usize) -> String {
    passages
        .iter()
        .take(limit)
        .map(|p| {
            let heading = match &p.section {
                Some(section) => format!("{}, {}", p.title, section),
                None => p.title.clone(),
            };
            format!(
                "**{heading}** [{} {}] (score {:.3})\n{}",
                p.jurisdiction,
                p.instrument_type.label(),
                p.score,
                p.excerpt
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn drafter_prompt(plan: &str, context: &str, jurisdiction: Jurisdiction) -> String {
    let plan = if plan.trim().is_empty() {
        "No plan provided"
    } else {
        plan
    };
    let context = if context.trim().is_empty() {
        "No additional context retrieved"
    } else {
        context
    };
    with_role(
        DRAFTER_ROLE,
        format!(
            "{PLAN_HEADING}\n{plan}\n\n\
             PRIMARY JURISDICTION: {jurisdiction}\n\n\
             RETRIEVED CONTEXT:\n{context}"
        ),
    )
}

pub fn verifier_prompt(draft: &str, citations: &[Citation]) -> String {
    let cited = if citations.is_empty() {
        "No citations provided separately".to_string()
    } else {
        citations
            .iter()
            .map(|c| {
                format!(
                    "- {}{} ({}, {})",
                    c.title,
                    c.section.as_deref().map(|s| format!(", {s}")).unwrap_or_default(),
                    c.instrument_type.label(),
                    c.jurisdiction
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    with_role(
        VERIFIER_ROLE,
        format!("{VERIFY_HEADING}\n{draft}\n\nCITATIONS TO VERIFY:\n{cited}"),
    )
}

/// Whether a verifier reply approves the draft.
pub fn review_approves(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    lower.contains("approved") || lower.contains("verified")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disclaimer {
    Standard,
    FinancialServices,
    Corporate,
}

impl Disclaimer {
    /// Pick by keywords in the user's instruction; financial terms win over corporate ones.
    pub fn for_topic(topic: &str) -> Self {
        let lower = topic.to_lowercase();
        let any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        if any(&["financial", "dfsa", "banking", "investment", "fund"]) {
            Self::FinancialServices
        } else if any(&["corporate", "company", "business", "commercial", "contract"]) {
            Self::Corporate
        } else {
            Self::Standard
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            Self::Standard => {
                "IMPORTANT LEGAL DISCLAIMER:\n\
                 This information is provided for educational and informational purposes only \
                 and does not constitute legal advice. It reflects the laws and regulations as \
                 understood when it was generated and may not reflect later developments. \
                 Consult qualified legal counsel before acting on any specific matter."
            }
            Self::FinancialServices => {
                "IMPORTANT LEGAL DISCLAIMER:\n\
                 This information relates to financial services regulation and is provided for \
                 educational purposes only. It is not legal advice, regulatory guidance or a \
                 compliance recommendation. Regulated firms should consult qualified counsel and \
                 compliance professionals and confirm current requirements with the regulator."
            }
            Self::Corporate => {
                "IMPORTANT LEGAL DISCLAIMER:\n\
                 This information relates to corporate and commercial law and is provided for \
                 educational purposes only. It is not legal advice and does not replace \
                 professional counsel. Businesses should consult qualified legal professionals \
                 on specific corporate and commercial matters."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexdraft_core::InstrumentType;

    #[test]
    fn planner_prompt_carries_inputs() {
        let prompt = planner_prompt(
            "Draft a leave policy",
            Jurisdiction::Primary,
            Some("tpl-7"),
            &["ref-1".into(), "ref-2".into()],
        );
        assert!(prompt.starts_with(SYSTEM_PREAMBLE));
        assert!(prompt.contains("USER QUERY: Draft a leave policy"));
        assert!(prompt.contains("PRIMARY JURISDICTION: PRIMARY"));
        assert!(prompt.contains("template document: tpl-7"));
        assert!(prompt.contains("reference documents: ref-1, ref-2"));
    }

    #[test]
    fn drafter_prompt_substitutes_placeholders_for_empty_inputs() {
        let prompt = drafter_prompt("", "  ", Jurisdiction::SecondaryA);
        assert!(prompt.contains("No plan provided"));
        assert!(prompt.contains("No additional context retrieved"));
        assert!(prompt.contains(PLAN_HEADING));
    }

    #[test]
    fn context_is_limited_and_labelled() {
        let passage = |n: usize| PassageSummary {
            passage_id: format!("p{n}"),
            title: format!("Law {n}"),
            section: Some("Part 1".into()),
            url: None,
            jurisdiction: Jurisdiction::Primary,
            instrument_type: InstrumentType::CourtRule,
            excerpt: "text".into(),
            score: 0.5,
        };
        let ctx = format_context(&[passage(1), passage(2), passage(3)], 2);
        assert!(ctx.contains("**Law 1, Part 1** [PRIMARY Court Rule] (score 0.500)"));
        assert!(ctx.contains("Law 2"));
        assert!(!ctx.contains("Law 3"));
    }

    #[test]
    fn verifier_lists_citations() {
        let citation = Citation {
            title: "Employment Law".into(),
            section: Some("Part 9".into()),
            url: None,
            jurisdiction: Jurisdiction::Primary,
            instrument_type: InstrumentType::Law,
        };
        let prompt = verifier_prompt("Body", &[citation]);
        assert!(prompt.contains("- Employment Law, Part 9 (Law, PRIMARY)"));
        assert!(verifier_prompt("Body", &[]).contains("No citations provided separately"));
    }

    #[test]
    fn approval_detection() {
        assert!(review_approves("Status: APPROVED"));
        assert!(review_approves("All citations verified."));
        assert!(!review_approves("Issues found: missing section references"));
    }

    #[test]
    fn disclaimer_by_topic() {
        assert_eq!(
            Disclaimer::for_topic("Fund prospectus for a commercial client"),
            Disclaimer::FinancialServices
        );
        assert_eq!(
            Disclaimer::for_topic("Shareholder agreement for a Company"),
            Disclaimer::Corporate
        );
        assert_eq!(
            Disclaimer::for_topic("Annual leave policy"),
            Disclaimer::Standard
        );
        assert!(Disclaimer::Standard.text().starts_with("IMPORTANT LEGAL DISCLAIMER"));
    }
}
