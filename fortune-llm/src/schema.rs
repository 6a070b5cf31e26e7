//! The fixed seven-section structured interpretation schema (spec §6).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A completed interpretation, broken into the seven fixed sections the
/// model is asked to produce, in order. Field order is part of the contract:
/// downstream consumers concatenate the sections in struct-declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct InterpretationSections {
    #[validate(length(min = 100))]
    pub line_by_line_interpretation: String,
    #[validate(length(min = 50))]
    pub overall_development: String,
    #[validate(length(min = 50))]
    pub positive_factors: String,
    #[validate(length(min = 50))]
    pub challenges: String,
    #[validate(length(min = 50))]
    pub suggested_actions: String,
    #[validate(length(min = 30))]
    pub supplementary_notes: String,
    #[validate(length(min = 30))]
    pub conclusion: String,
}

impl InterpretationSections {
    /// Concatenate all seven sections, in the fixed order, for the plain
    /// `response_text` field on a completed task.
    pub fn concatenated(&self) -> String {
        [
            &self.line_by_line_interpretation,
            &self.overall_development,
            &self.positive_factors,
            &self.challenges,
            &self.suggested_actions,
            &self.supplementary_notes,
            &self.conclusion,
        ]
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_sections() -> InterpretationSections {
        InterpretationSections {
            line_by_line_interpretation: "x".repeat(100),
            overall_development: "x".repeat(50),
            positive_factors: "x".repeat(50),
            challenges: "x".repeat(50),
            suggested_actions: "x".repeat(50),
            supplementary_notes: "x".repeat(30),
            conclusion: "x".repeat(30),
        }
    }

    #[test]
    fn valid_sections_pass_validation() {
        assert!(valid_sections().validate().is_ok());
    }

    #[test]
    fn short_line_by_line_fails_validation() {
        let mut sections = valid_sections();
        sections.line_by_line_interpretation = "too short".to_string();
        assert!(sections.validate().is_err());
    }

    #[test]
    fn short_conclusion_fails_validation() {
        let mut sections = valid_sections();
        sections.conclusion = "short".to_string();
        assert!(sections.validate().is_err());
    }

    #[test]
    fn concatenated_preserves_section_order() {
        let mut sections = valid_sections();
        sections.line_by_line_interpretation = "AAA".repeat(40);
        sections.conclusion = "ZZZ".repeat(10);
        let text = sections.concatenated();
        assert!(text.find("AAA").unwrap() < text.find("ZZZ").unwrap());
    }
}
