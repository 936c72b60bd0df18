use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::conflicts::{
    Clock, ConflictDetector, ConflictMembersError, ConflictRecord, ConflictReport,
    ConflictResolver, ResolutionError, ResolutionOutcome, ResolutionResult, ResolveOptions,
    SystemClock,
};
use super::domain::{
    AcademicRecord, ApplicantId, Application, ApplicationId, ApplicationStatus, CycleId,
    OfferingId, OfferingRequirement, ValidationError,
};
use super::eligibility::{AdmissionsPolicy, EligibilityEvaluator, EligibilityVerdict};
use super::priority::{PriorityScore, PriorityScorer};
use super::repository::{
    AcademicRecordProvider, ApplicationStore, NotificationDispatcher, OfferingRequirementProvider,
    StoreError,
};

/// Inbound request to apply to an offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDraft {
    pub applicant_id: ApplicantId,
    pub offering_id: OfferingId,
    pub cycle: CycleId,
}

/// Submission result; an ineligible applicant is an answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    Submitted { application: Application },
    Ineligible { verdict: EligibilityVerdict },
}

/// Eligibility of one applicant for one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEligibility {
    pub offering_id: OfferingId,
    pub verdict: EligibilityVerdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum NotificationStatus {
    Delivered,
    Failed(String),
    /// Nothing changed, so nobody needs to hear about it again.
    Skipped,
}

/// Resolution plus the fate of the outbound notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionReceipt {
    pub result: ResolutionResult,
    pub notification: NotificationStatus,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("adm-{id:06}"))
}

/// Service composing the evaluator, detector and resolver over the external collaborators.
pub struct AdmissionsService<S, P, N, C = SystemClock> {
    store: Arc<S>,
    catalog: Arc<P>,
    notifier: Arc<N>,
    evaluator: EligibilityEvaluator,
    scorer: PriorityScorer,
    detector: ConflictDetector,
    resolver: ConflictResolver<S, C>,
    clock: C,
}

impl<S, P, N> AdmissionsService<S, P, N, SystemClock>
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(store: Arc<S>, catalog: Arc<P>, notifier: Arc<N>, policy: AdmissionsPolicy) -> Self {
        Self::with_clock(store, catalog, notifier, policy, SystemClock)
    }
}

impl<S, P, N, C> AdmissionsService<S, P, N, C>
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    pub fn with_clock(
        store: Arc<S>,
        catalog: Arc<P>,
        notifier: Arc<N>,
        policy: AdmissionsPolicy,
        clock: C,
    ) -> Self {
        let scorer = PriorityScorer;
        Self {
            resolver: ConflictResolver::with_clock(store.clone(), clock.clone()),
            store,
            catalog,
            notifier,
            evaluator: EligibilityEvaluator::new(policy),
            scorer,
            detector: ConflictDetector::new(scorer),
            clock,
        }
    }

    /// Gate a submission form: evaluate without creating anything.
    pub fn check_eligibility(
        &self,
        applicant: &ApplicantId,
        offering: &OfferingId,
    ) -> Result<EligibilityVerdict, AdmissionsServiceError> {
        let record = self.record_for(applicant)?;
        let requirement = self.requirement_for(offering)?;
        Ok(self.evaluator.evaluate(&record, &requirement)?)
    }

    /// Verdicts for every listed offering, fetching the applicant record once.
    pub fn eligibility_catalog(
        &self,
        applicant: &ApplicantId,
        offerings: &[OfferingId],
    ) -> Result<Vec<CatalogEligibility>, AdmissionsServiceError> {
        let record = self.record_for(applicant)?;
        offerings
            .iter()
            .map(|offering| -> Result<CatalogEligibility, AdmissionsServiceError> {
                let requirement = self.requirement_for(offering)?;
                let verdict = self.evaluator.evaluate(&record, &requirement)?;
                Ok(CatalogEligibility {
                    offering_id: offering.clone(),
                    verdict,
                })
            })
            .collect()
    }

    /// Evaluate and, when eligible, create the application with its verdict attached.
    pub fn submit(
        &self,
        draft: ApplicationDraft,
    ) -> Result<SubmissionOutcome, AdmissionsServiceError> {
        let verdict = self.check_eligibility(&draft.applicant_id, &draft.offering_id)?;
        if !verdict.is_eligible {
            info!(
                applicant = %draft.applicant_id,
                offering = %draft.offering_id,
                missing = verdict.missing_requirements.len(),
                "submission blocked by eligibility"
            );
            return Ok(SubmissionOutcome::Ineligible { verdict });
        }

        let application = Application {
            id: next_application_id(),
            applicant_id: draft.applicant_id,
            offering_id: draft.offering_id,
            cycle: draft.cycle,
            submitted_at: self.clock.now(),
            status: ApplicationStatus::Pending,
            eligibility: Some(verdict),
            resolution: None,
        };

        let stored = self.store.insert(application)?;
        Ok(SubmissionOutcome::Submitted { application: stored })
    }

    pub fn get(&self, id: &ApplicationId) -> Result<Application, AdmissionsServiceError> {
        let application = self.store.get(id)?.ok_or(StoreError::NotFound)?;
        Ok(application)
    }

    /// Detect conflicts on a fresh snapshot of the cycle.
    pub fn conflicts(&self, cycle: &CycleId) -> Result<ConflictReport, AdmissionsServiceError> {
        let applications = self.store.list_by_cycle(cycle)?;
        let records = self.records_for(&applications)?;
        Ok(self.detector.detect(&applications, &records))
    }

    /// Rebuild a conflict from application ids an operator saw earlier.
    pub fn conflict_from_members(
        &self,
        ids: &[ApplicationId],
    ) -> Result<ConflictRecord, AdmissionsServiceError> {
        let members = ids
            .iter()
            .map(|id| self.get(id))
            .collect::<Result<Vec<_>, _>>()?;

        let score = match members.first() {
            Some(first) => self.priority_of(&first.applicant_id)?,
            None => PriorityScore::default(),
        };

        Ok(ConflictRecord::from_members(members, score)?)
    }

    pub fn resolve(
        &self,
        conflict: &ConflictRecord,
        winning_offering: &OfferingId,
        options: ResolveOptions,
    ) -> Result<ResolutionReceipt, AdmissionsServiceError> {
        let result = self.resolver.resolve(conflict, winning_offering, options)?;
        Ok(self.notify(result))
    }

    /// Operator shortcut: the earliest submission wins.
    pub fn quick_resolve(
        &self,
        conflict: &ConflictRecord,
        options: ResolveOptions,
    ) -> Result<ResolutionReceipt, AdmissionsServiceError> {
        let result = self.resolver.auto_resolve(conflict, options)?;
        Ok(self.notify(result))
    }

    fn notify(&self, result: ResolutionResult) -> ResolutionReceipt {
        if result.outcome == ResolutionOutcome::AlreadyFinal {
            return ResolutionReceipt {
                result,
                notification: NotificationStatus::Skipped,
            };
        }

        let notification = match self.notifier.dispatch(&result) {
            Ok(()) => NotificationStatus::Delivered,
            Err(error) => {
                warn!(
                    applicant = %result.applicant_id,
                    %error,
                    "resolution committed but notification failed"
                );
                NotificationStatus::Failed(error.to_string())
            }
        };

        ResolutionReceipt {
            result,
            notification,
        }
    }

    fn priority_of(&self, applicant: &ApplicantId) -> Result<PriorityScore, AdmissionsServiceError> {
        match self.catalog.academic_record(applicant)? {
            Some(record) => Ok(self.scorer.score(&record).unwrap_or_else(|error| {
                warn!(
                    applicant = %applicant,
                    %error,
                    "academic record cannot be scored; using zero priority"
                );
                PriorityScore::default()
            })),
            None => Ok(PriorityScore::default()),
        }
    }

    fn records_for(
        &self,
        applications: &[Application],
    ) -> Result<BTreeMap<ApplicantId, AcademicRecord>, AdmissionsServiceError> {
        let mut records = BTreeMap::new();
        for application in applications
            .iter()
            .filter(|application| application.status.is_accepted())
        {
            if records.contains_key(&application.applicant_id) {
                continue;
            }
            if let Some(record) = self.catalog.academic_record(&application.applicant_id)? {
                records.insert(application.applicant_id.clone(), record);
            }
        }
        Ok(records)
    }

    fn record_for(&self, applicant: &ApplicantId) -> Result<AcademicRecord, AdmissionsServiceError> {
        self.catalog
            .academic_record(applicant)?
            .ok_or_else(|| AdmissionsServiceError::UnknownApplicant(applicant.clone()))
    }

    fn requirement_for(
        &self,
        offering: &OfferingId,
    ) -> Result<OfferingRequirement, AdmissionsServiceError> {
        self.catalog
            .requirement(offering)?
            .ok_or_else(|| AdmissionsServiceError::UnknownOffering(offering.clone()))
    }

}

/// Error raised by the admissions service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionsServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Members(#[from] ConflictMembersError),
    #[error("no academic record for applicant {0}")]
    UnknownApplicant(ApplicantId),
    #[error("no requirements defined for offering {0}")]
    UnknownOffering(OfferingId),
}
