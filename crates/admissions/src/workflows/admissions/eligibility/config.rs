use serde::{Deserialize, Serialize};

/// Lowest minimum-credit requirement an offering may declare.
pub const DEFAULT_CREDIT_FLOOR: u32 = 4;

/// Platform-wide dials applied to every eligibility evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionsPolicy {
    credit_floor: u32,
}

impl AdmissionsPolicy {
    pub fn with_credit_floor(credit_floor: u32) -> Self {
        Self { credit_floor }
    }

    pub fn credit_floor(&self) -> u32 {
        self.credit_floor
    }
}

impl Default for AdmissionsPolicy {
    fn default() -> Self {
        Self::with_credit_floor(DEFAULT_CREDIT_FLOOR)
    }
}
