use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::eligibility::EligibilityVerdict;

/// Identifier wrapper for applicants.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

/// Identifier wrapper for submitted applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Admissions cycle (intake) an application belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CycleId(pub String);

impl fmt::Display for ApplicantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A course offered by one faculty of one institution. Ordering is lexicographic
/// by institution, faculty, then course and doubles as the deterministic
/// tie-breaker wherever two offerings compare equal otherwise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OfferingId {
    pub institution: String,
    pub faculty: String,
    pub course: String,
}

impl OfferingId {
    pub fn new(
        institution: impl Into<String>,
        faculty: impl Into<String>,
        course: impl Into<String>,
    ) -> Self {
        Self {
            institution: institution.into(),
            faculty: faculty.into(),
            course: course.into(),
        }
    }
}

impl fmt::Display for OfferingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.institution, self.faculty, self.course)
    }
}

/// Academic profile of a single applicant. Numeric fields are optional because
/// applicants complete their profile incrementally; an absent value is not the
/// same thing as zero until an evaluator or scorer decides it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademicRecord {
    pub applicant_id: ApplicantId,
    #[serde(default)]
    pub credits: Option<f64>,
    #[serde(default)]
    pub passes: Option<u32>,
    #[serde(default)]
    pub gpa: Option<f64>,
    #[serde(default)]
    pub subject_grades: BTreeMap<String, String>,
}

impl AcademicRecord {
    pub fn new(applicant_id: ApplicantId) -> Self {
        Self {
            applicant_id,
            credits: None,
            passes: None,
            gpa: None,
            subject_grades: BTreeMap::new(),
        }
    }

    pub fn with_credits(mut self, credits: f64) -> Self {
        self.credits = Some(credits);
        self
    }

    pub fn with_passes(mut self, passes: u32) -> Self {
        self.passes = Some(passes);
        self
    }

    pub fn with_gpa(mut self, gpa: f64) -> Self {
        self.gpa = Some(gpa);
        self
    }

    pub fn with_grade(mut self, subject: impl Into<String>, grade: impl Into<String>) -> Self {
        self.subject_grades.insert(subject.into(), grade.into());
        self
    }

    /// Reject numbers no scale can interpret: negatives, NaN and infinities.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(credits) = self.credits {
            if !credits.is_finite() {
                return Err(ValidationError::NonFiniteCredits);
            }
            if credits < 0.0 {
                return Err(ValidationError::NegativeCredits(credits));
            }
        }

        if let Some(gpa) = self.gpa {
            if !gpa.is_finite() {
                return Err(ValidationError::NonFiniteGpa);
            }
            if gpa < 0.0 {
                return Err(ValidationError::NegativeGpa(gpa));
            }
        }

        Ok(())
    }

    /// Grade recorded for `subject`, matching names case-insensitively.
    pub fn grade_for(&self, subject: &str) -> Option<&str> {
        let wanted = subject.trim();
        self.subject_grades
            .iter()
            .find(|(name, _)| name.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, grade)| grade.as_str())
    }
}

/// Ordinal grade symbols listed from lowest to highest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeScale(pub Vec<String>);

impl GradeScale {
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(symbols.into_iter().map(Into::into).collect())
    }

    /// Position of `symbol` on the scale; higher is better.
    pub fn rank(&self, symbol: &str) -> Option<usize> {
        let wanted = symbol.trim();
        self.0
            .iter()
            .position(|candidate| candidate.trim().eq_ignore_ascii_case(wanted))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for GradeScale {
    fn default() -> Self {
        Self::new(["F", "E", "D", "C", "B", "A"])
    }
}

/// Minimum grade an offering demands in one subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRequirement {
    pub subject: String,
    pub minimum_grade: String,
}

impl SubjectRequirement {
    pub fn new(subject: impl Into<String>, minimum_grade: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            minimum_grade: minimum_grade.into(),
        }
    }
}

/// Entry requirements attached to an offering for the active cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferingRequirement {
    pub offering_id: OfferingId,
    pub min_credits: u32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub grade_scale: GradeScale,
    #[serde(default)]
    pub subjects: Vec<SubjectRequirement>,
}

impl OfferingRequirement {
    pub fn new(offering_id: OfferingId, min_credits: u32) -> Self {
        Self {
            offering_id,
            min_credits,
            description: None,
            grade_scale: GradeScale::default(),
            subjects: Vec::new(),
        }
    }

    pub fn with_subject(mut self, subject: SubjectRequirement) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Status tracked for an application through review and conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    UnderReview,
    Accepted { finalized: bool },
    Rejected,
    Waitlisted,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Accepted { finalized: false } => "accepted",
            ApplicationStatus::Accepted { finalized: true } => "accepted_final",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Waitlisted => "waitlisted",
        }
    }

    pub const fn is_accepted(self) -> bool {
        matches!(self, ApplicationStatus::Accepted { .. })
    }

    pub const fn is_finalized(self) -> bool {
        matches!(self, ApplicationStatus::Accepted { finalized: true })
    }

    /// `Pending -> UnderReview -> {Accepted, Rejected, Waitlisted}`, plus the two
    /// moves conflict resolution makes on accepted rows: finalizing the winner
    /// and rejecting a loser. Rejection is terminal.
    pub const fn can_transition_to(self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        match (self, next) {
            (Pending, UnderReview) => true,
            (UnderReview, Accepted { finalized: false }) | (UnderReview, Rejected) => true,
            (UnderReview, Waitlisted) => true,
            (Waitlisted, Accepted { finalized: false }) | (Waitlisted, Rejected) => true,
            (Accepted { finalized: false }, Accepted { finalized: true }) => true,
            (Accepted { .. }, Rejected) => true,
            _ => false,
        }
    }
}

/// Audit note attached to every row touched by conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionNote {
    pub winning_offering: OfferingId,
    pub reason: String,
    pub resolved_at: DateTime<Utc>,
}

/// One applicant's application to one offering in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub offering_id: OfferingId,
    pub cycle: CycleId,
    pub submitted_at: DateTime<Utc>,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub eligibility: Option<EligibilityVerdict>,
    #[serde(default)]
    pub resolution: Option<ResolutionNote>,
}

impl Application {
    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.id.clone(),
            applicant_id: self.applicant_id.clone(),
            offering: self.offering_id.to_string(),
            status: self.status.label(),
            resolution_reason: self.resolution.as_ref().map(|note| note.reason.clone()),
        }
    }
}

/// Sanitized representation of an application's exposed status.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub offering: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_reason: Option<String>,
}

/// Malformed numeric or scale input; no eligibility or score is computed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("credits must not be negative (found {0})")]
    NegativeCredits(f64),
    #[error("credits must be a finite number")]
    NonFiniteCredits,
    #[error("grade point average must not be negative (found {0})")]
    NegativeGpa(f64),
    #[error("grade point average must be a finite number")]
    NonFiniteGpa,
    #[error("minimum credits {min_credits} is below the platform floor of {floor}")]
    BelowCreditFloor { min_credits: u32, floor: u32 },
    #[error("offering {offering} defines an empty grade scale")]
    EmptyGradeScale { offering: OfferingId },
    #[error("required grade '{grade}' for {subject} is not on the offering's grade scale")]
    UnknownRequiredGrade { subject: String, grade: String },
}
