mod config;
mod rules;
mod verdict;

pub use config::{AdmissionsPolicy, DEFAULT_CREDIT_FLOOR};
pub use verdict::EligibilityVerdict;

use super::domain::{AcademicRecord, OfferingRequirement, ValidationError};

/// Stateless predicate deciding whether an applicant may apply to an offering.
#[derive(Debug, Clone, Default)]
pub struct EligibilityEvaluator {
    policy: AdmissionsPolicy,
}

impl EligibilityEvaluator {
    pub fn new(policy: AdmissionsPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AdmissionsPolicy {
        &self.policy
    }

    pub fn evaluate(
        &self,
        record: &AcademicRecord,
        requirement: &OfferingRequirement,
    ) -> Result<EligibilityVerdict, ValidationError> {
        record.validate()?;
        self.validate_requirement(requirement)?;

        let unmet = rules::unmet_requirements(record, requirement);
        Ok(EligibilityVerdict::from_unmet(unmet))
    }

    fn validate_requirement(&self, requirement: &OfferingRequirement) -> Result<(), ValidationError> {
        let floor = self.policy.credit_floor();
        if requirement.min_credits < floor {
            return Err(ValidationError::BelowCreditFloor {
                min_credits: requirement.min_credits,
                floor,
            });
        }

        if requirement.subjects.is_empty() {
            return Ok(());
        }

        if requirement.grade_scale.is_empty() {
            return Err(ValidationError::EmptyGradeScale {
                offering: requirement.offering_id.clone(),
            });
        }

        if let Some(unknown) = requirement
            .subjects
            .iter()
            .find(|subject| requirement.grade_scale.rank(&subject.minimum_grade).is_none())
        {
            return Err(ValidationError::UnknownRequiredGrade {
                subject: unknown.subject.clone(),
                grade: unknown.minimum_grade.clone(),
            });
        }

        Ok(())
    }
}
