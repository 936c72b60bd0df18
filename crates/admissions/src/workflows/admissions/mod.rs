//! Applicant eligibility and multi-offer conflict arbitration.
//!
//! The evaluator, scorer and detector are pure functions over immutable
//! snapshots; every write goes through the resolver, which re-reads the store
//! under a per-applicant lock before committing compare-and-swap transitions.

pub mod conflicts;
pub mod domain;
pub mod eligibility;
pub mod import;
pub mod priority;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use conflicts::{
    Clock, ConflictDetector, ConflictMembersError, ConflictRecord, ConflictReport,
    ConflictResolver, FailedTransition, IntegrityWarning, ResolutionError, ResolutionOutcome,
    ResolutionResult, ResolveOptions, SystemClock, TransitionRecord,
};
pub use domain::{
    AcademicRecord, ApplicantId, Application, ApplicationId, ApplicationStatus,
    ApplicationStatusView, CycleId, GradeScale, OfferingId, OfferingRequirement, ResolutionNote,
    SubjectRequirement, ValidationError,
};
pub use eligibility::{
    AdmissionsPolicy, EligibilityEvaluator, EligibilityVerdict, DEFAULT_CREDIT_FLOOR,
};
pub use import::{AdmissionsImporter, ImportError};
pub use priority::{PriorityScore, PriorityScorer};
pub use repository::{
    AcademicRecordProvider, ApplicationStore, NotificationDispatcher, NotificationError,
    OfferingRequirementProvider, StatusTransition, StoreError,
};
pub use router::admissions_router;
pub use service::{
    AdmissionsService, AdmissionsServiceError, ApplicationDraft, CatalogEligibility,
    NotificationStatus, ResolutionReceipt, SubmissionOutcome,
};
