use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::super::domain::{
    AcademicRecord, ApplicantId, Application, ApplicationId, OfferingId,
};
use super::super::priority::{PriorityScore, PriorityScorer};

/// One applicant holding accepted offers from two or more distinct offerings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub applicant_id: ApplicantId,
    pub priority_score: PriorityScore,
    /// Ordered by submission time, then offering id.
    pub applications: Vec<Application>,
}

impl ConflictRecord {
    /// Build a record from caller-supplied members, e.g. when an operator
    /// resolves a conflict seen on an earlier snapshot.
    pub fn from_members(
        mut applications: Vec<Application>,
        priority_score: PriorityScore,
    ) -> Result<Self, ConflictMembersError> {
        let applicant_id = applications
            .first()
            .map(|application| application.applicant_id.clone())
            .ok_or(ConflictMembersError::Empty)?;
        if applications.len() < 2 {
            return Err(ConflictMembersError::SingleMember(
                applications[0].id.clone(),
            ));
        }

        if let Some(stranger) = applications
            .iter()
            .find(|application| application.applicant_id != applicant_id)
        {
            return Err(ConflictMembersError::MixedApplicants {
                expected: applicant_id,
                found: stranger.applicant_id.clone(),
            });
        }

        sort_members(&mut applications);
        if let Some(duplicate) = first_repeated_offering(&applications) {
            return Err(ConflictMembersError::DuplicateOffering(duplicate));
        }

        Ok(Self {
            applicant_id,
            priority_score,
            applications,
        })
    }

    pub fn offerings(&self) -> impl Iterator<Item = &OfferingId> {
        self.applications
            .iter()
            .map(|application| &application.offering_id)
    }

    pub fn member_for(&self, offering: &OfferingId) -> Option<&Application> {
        self.applications
            .iter()
            .find(|application| &application.offering_id == offering)
    }

    /// Quick-resolve pick: earliest submission, then lowest offering id, then
    /// lowest application id, so equal timestamps still select one member.
    pub fn earliest_submission(&self) -> Option<&Application> {
        self.applications.iter().min_by(|left, right| {
            left.submitted_at
                .cmp(&right.submitted_at)
                .then_with(|| left.offering_id.cmp(&right.offering_id))
                .then_with(|| left.id.cmp(&right.id))
        })
    }
}

/// Reasons a caller-supplied member list cannot form a conflict record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictMembersError {
    #[error("a conflict needs at least two applications")]
    Empty,
    #[error("application {0} alone does not form a conflict")]
    SingleMember(ApplicationId),
    #[error("conflict members belong to different applicants ({expected} and {found})")]
    MixedApplicants {
        expected: ApplicantId,
        found: ApplicantId,
    },
    #[error("offering {0} appears more than once in the conflict")]
    DuplicateOffering(OfferingId),
}

/// Data anomalies surfaced next to the detected conflicts instead of being merged silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityWarning {
    DuplicateAcceptance {
        applicant_id: ApplicantId,
        offering_id: OfferingId,
        application_ids: Vec<ApplicationId>,
    },
    UnscorableRecord {
        applicant_id: ApplicantId,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<ConflictRecord>,
    pub warnings: Vec<IntegrityWarning>,
}

/// Scans one cycle's snapshot for applicants holding multiple acceptances.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector {
    scorer: PriorityScorer,
}

impl ConflictDetector {
    pub fn new(scorer: PriorityScorer) -> Self {
        Self { scorer }
    }

    pub fn detect(
        &self,
        applications: &[Application],
        records: &BTreeMap<ApplicantId, AcademicRecord>,
    ) -> ConflictReport {
        let mut accepted: BTreeMap<&ApplicantId, BTreeMap<&OfferingId, Vec<&Application>>> =
            BTreeMap::new();
        for application in applications
            .iter()
            .filter(|application| application.status.is_accepted())
        {
            accepted
                .entry(&application.applicant_id)
                .or_default()
                .entry(&application.offering_id)
                .or_default()
                .push(application);
        }

        let mut report = ConflictReport::default();

        for (applicant_id, by_offering) in accepted {
            let mut members = Vec::with_capacity(by_offering.len());

            for (offering_id, mut rows) in by_offering {
                rows.sort_by(|left, right| {
                    left.submitted_at
                        .cmp(&right.submitted_at)
                        .then_with(|| left.id.cmp(&right.id))
                });

                if rows.len() > 1 {
                    let application_ids: Vec<ApplicationId> =
                        rows.iter().map(|row| row.id.clone()).collect();
                    warn!(
                        applicant = %applicant_id,
                        offering = %offering_id,
                        count = rows.len(),
                        "duplicate acceptance for a single offering"
                    );
                    report.warnings.push(IntegrityWarning::DuplicateAcceptance {
                        applicant_id: applicant_id.clone(),
                        offering_id: offering_id.clone(),
                        application_ids,
                    });
                }

                members.push(rows[0].clone());
            }

            if members.len() < 2 {
                continue;
            }

            let priority_score = self.priority_for(applicant_id, records, &mut report.warnings);
            sort_members(&mut members);
            report.conflicts.push(ConflictRecord {
                applicant_id: applicant_id.clone(),
                priority_score,
                applications: members,
            });
        }

        report.conflicts.sort_by(|left, right| {
            right
                .priority_score
                .cmp(&left.priority_score)
                .then_with(|| left.applicant_id.cmp(&right.applicant_id))
        });

        debug!(
            conflicts = report.conflicts.len(),
            warnings = report.warnings.len(),
            "conflict detection complete"
        );
        report
    }

    fn priority_for(
        &self,
        applicant_id: &ApplicantId,
        records: &BTreeMap<ApplicantId, AcademicRecord>,
        warnings: &mut Vec<IntegrityWarning>,
    ) -> PriorityScore {
        let Some(record) = records.get(applicant_id) else {
            return PriorityScore::default();
        };

        match self.scorer.score(record) {
            Ok(score) => score,
            Err(error) => {
                warn!(applicant = %applicant_id, %error, "academic record cannot be scored");
                warnings.push(IntegrityWarning::UnscorableRecord {
                    applicant_id: applicant_id.clone(),
                    reason: error.to_string(),
                });
                PriorityScore::default()
            }
        }
    }
}

fn sort_members(members: &mut [Application]) {
    members.sort_by(|left, right| {
        left.submitted_at
            .cmp(&right.submitted_at)
            .then_with(|| left.offering_id.cmp(&right.offering_id))
            .then_with(|| left.id.cmp(&right.id))
    });
}

fn first_repeated_offering(members: &[Application]) -> Option<OfferingId> {
    members.iter().enumerate().find_map(|(index, member)| {
        members[index + 1..]
            .iter()
            .any(|other| other.offering_id == member.offering_id)
            .then(|| member.offering_id.clone())
    })
}
