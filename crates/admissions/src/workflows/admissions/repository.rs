use serde::{Deserialize, Serialize};

use super::conflicts::ResolutionResult;
use super::domain::{
    AcademicRecord, ApplicantId, Application, ApplicationId, ApplicationStatus, CycleId,
    OfferingId, OfferingRequirement, ResolutionNote,
};

/// A single status change, applied only if the row still holds `expected`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub application_id: ApplicationId,
    pub expected: ApplicationStatus,
    pub next: ApplicationStatus,
    #[serde(default)]
    pub resolution: Option<ResolutionNote>,
}

impl StatusTransition {
    /// Compare-and-swap against an in-hand row. Stores call this inside their own
    /// critical section so the check and the write cannot interleave.
    pub fn apply_to(&self, application: &mut Application) -> Result<(), StoreError> {
        if application.status != self.expected {
            return Err(StoreError::stale(
                &application.id,
                self.expected,
                application.status,
            ));
        }
        if !self.expected.can_transition_to(self.next) {
            return Err(StoreError::illegal(self.expected, self.next));
        }

        application.status = self.next;
        if let Some(note) = &self.resolution {
            application.resolution = Some(note.clone());
        }
        Ok(())
    }
}

/// Storage abstraction for application rows so the core can run against any backend.
pub trait ApplicationStore: Send + Sync {
    fn list_by_cycle(&self, cycle: &CycleId) -> Result<Vec<Application>, StoreError>;
    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;
    /// Rejects a second application by the same applicant to the same offering in a cycle.
    fn insert(&self, application: Application) -> Result<Application, StoreError>;
    fn apply_transition(&self, transition: &StatusTransition) -> Result<Application, StoreError>;
}

/// Source of applicant academic profiles.
pub trait AcademicRecordProvider: Send + Sync {
    fn academic_record(&self, applicant: &ApplicantId)
        -> Result<Option<AcademicRecord>, StoreError>;
}

/// Source of offering entry requirements.
pub trait OfferingRequirementProvider: Send + Sync {
    fn requirement(&self, offering: &OfferingId)
        -> Result<Option<OfferingRequirement>, StoreError>;
}

/// Outbound hook informing winning and losing applicants of a resolution.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, result: &ResolutionResult) -> Result<(), NotificationError>;
}

/// Error enumeration for store and provider failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("application already exists for this applicant, offering and cycle")]
    Duplicate,
    #[error("record not found")]
    NotFound,
    #[error("application {application_id} is {found}, expected {expected}")]
    StaleState {
        application_id: ApplicationId,
        expected: &'static str,
        found: &'static str,
    },
    #[error("transition from {from} to {to} is not permitted")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn stale(
        application_id: &ApplicationId,
        expected: ApplicationStatus,
        found: ApplicationStatus,
    ) -> Self {
        Self::StaleState {
            application_id: application_id.clone(),
            expected: expected.label(),
            found: found.label(),
        }
    }

    pub fn illegal(from: ApplicationStatus, to: ApplicationStatus) -> Self {
        Self::IllegalTransition {
            from: from.label(),
            to: to.label(),
        }
    }
}

/// Notification dispatch error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
