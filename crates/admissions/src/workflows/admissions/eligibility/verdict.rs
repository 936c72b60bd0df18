use serde::{Deserialize, Serialize};

use super::rules::UnmetRequirement;

/// Outcome of checking one applicant against one offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub is_eligible: bool,
    pub message: String,
    pub missing_requirements: Vec<String>,
}

impl EligibilityVerdict {
    pub(crate) fn from_unmet(unmet: Vec<UnmetRequirement>) -> Self {
        if unmet.is_empty() {
            return Self {
                is_eligible: true,
                message: "eligible to apply".to_string(),
                missing_requirements: Vec::new(),
            };
        }

        let missing_requirements: Vec<String> =
            unmet.iter().map(UnmetRequirement::describe).collect();
        let message = match missing_requirements.len() {
            1 => "not eligible: 1 requirement not met".to_string(),
            count => format!("not eligible: {count} requirements not met"),
        };

        Self {
            is_eligible: false,
            message,
            missing_requirements,
        }
    }

    pub fn summary(&self) -> String {
        if self.missing_requirements.is_empty() {
            self.message.clone()
        } else {
            format!("{}: {}", self.message, self.missing_requirements.join("; "))
        }
    }
}
