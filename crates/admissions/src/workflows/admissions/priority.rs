use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::domain::{AcademicRecord, ValidationError};

const PASS_WEIGHT: f64 = 10.0;
const GPA_WEIGHT: f64 = 100.0;

/// Ranking value used only to order applicants; higher sorts first.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityScore(pub f64);

impl PriorityScore {
    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for PriorityScore {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriorityScore {}

impl PartialOrd for PriorityScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityScore {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Fixed-weight scorer: `credits + passes * 10 + gpa * 100`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityScorer;

impl PriorityScorer {
    /// Absent fields contribute nothing to their term.
    pub fn score(&self, record: &AcademicRecord) -> Result<PriorityScore, ValidationError> {
        record.validate()?;

        let credits = record.credits.unwrap_or(0.0);
        let passes = record.passes.map(f64::from).unwrap_or(0.0);
        let gpa = record.gpa.unwrap_or(0.0);

        Ok(PriorityScore(credits + passes * PASS_WEIGHT + gpa * GPA_WEIGHT))
    }
}
