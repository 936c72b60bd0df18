use super::super::domain::{AcademicRecord, OfferingRequirement, SubjectRequirement};

/// One condition of an offering the applicant does not satisfy yet.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UnmetRequirement {
    Credits {
        actual: f64,
        required: u32,
    },
    MissingGrade {
        subject: String,
        required: String,
    },
    GradeOffScale {
        subject: String,
        grade: String,
        required: String,
    },
    GradeBelowMinimum {
        subject: String,
        grade: String,
        required: String,
    },
}

impl UnmetRequirement {
    pub(crate) fn describe(&self) -> String {
        match self {
            UnmetRequirement::Credits { actual, required } => format!(
                "Minimum credits not met ({}/{})",
                display_number(*actual),
                required
            ),
            UnmetRequirement::MissingGrade { subject, required } => format!(
                "Subject requirement not met: {subject} (no grade recorded, requires {required})"
            ),
            UnmetRequirement::GradeOffScale {
                subject,
                grade,
                required,
            } => format!(
                "Subject requirement not met: {subject} (grade {grade} is not on the offering's scale, requires {required})"
            ),
            UnmetRequirement::GradeBelowMinimum {
                subject,
                grade,
                required,
            } => format!("Subject requirement not met: {subject} ({grade} below required {required})"),
        }
    }
}

/// Collect every unmet condition: credits first, then subjects in declared order.
/// Inputs are expected to be validated already.
pub(crate) fn unmet_requirements(
    record: &AcademicRecord,
    requirement: &OfferingRequirement,
) -> Vec<UnmetRequirement> {
    let mut unmet = Vec::new();

    let credits = record.credits.unwrap_or(0.0);
    if credits < f64::from(requirement.min_credits) {
        unmet.push(UnmetRequirement::Credits {
            actual: credits,
            required: requirement.min_credits,
        });
    }

    for subject in &requirement.subjects {
        if let Some(gap) = check_subject(record, requirement, subject) {
            unmet.push(gap);
        }
    }

    unmet
}

fn check_subject(
    record: &AcademicRecord,
    requirement: &OfferingRequirement,
    subject: &SubjectRequirement,
) -> Option<UnmetRequirement> {
    let scale = &requirement.grade_scale;
    let required_rank = scale.rank(&subject.minimum_grade)?;

    let Some(grade) = record.grade_for(&subject.subject) else {
        return Some(UnmetRequirement::MissingGrade {
            subject: subject.subject.clone(),
            required: subject.minimum_grade.clone(),
        });
    };

    match scale.rank(grade) {
        None => Some(UnmetRequirement::GradeOffScale {
            subject: subject.subject.clone(),
            grade: grade.to_string(),
            required: subject.minimum_grade.clone(),
        }),
        Some(rank) if rank < required_rank => Some(UnmetRequirement::GradeBelowMinimum {
            subject: subject.subject.clone(),
            grade: grade.to_string(),
            required: subject.minimum_grade.clone(),
        }),
        Some(_) => None,
    }
}

/// Whole numbers print without a fractional part ("80", not "80.0").
pub(crate) fn display_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
