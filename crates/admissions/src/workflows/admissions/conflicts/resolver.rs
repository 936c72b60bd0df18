use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::super::domain::{
    ApplicantId, Application, ApplicationId, ApplicationStatus, OfferingId, ResolutionNote,
};
use super::super::repository::{ApplicationStore, StatusTransition, StoreError};
use super::detector::ConflictRecord;

/// Time source for resolution notes.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Allow replacing a winner that an earlier resolution already finalized.
    #[serde(default)]
    pub override_finalized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// At least one status transition was committed by this call.
    Applied,
    /// The conflict was already resolved in favour of the same offering.
    AlreadyFinal,
}

/// What changed, so the caller can notify the winning and losing applicants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub applicant_id: ApplicantId,
    pub winning_application: ApplicationId,
    pub winning_offering: OfferingId,
    pub rejected: Vec<ApplicationId>,
    pub outcome: ResolutionOutcome,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub application_id: ApplicationId,
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
}

impl From<&StatusTransition> for TransitionRecord {
    fn from(transition: &StatusTransition) -> Self {
        Self {
            application_id: transition.application_id.clone(),
            from: transition.expected,
            to: transition.next,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTransition {
    pub application_id: ApplicationId,
    pub to: ApplicationStatus,
    pub error: String,
}

/// Error raised while resolving a conflict. Every variant except
/// `PartialCommit` guarantees that no row was written.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("conflict has no applications")]
    EmptyConflict,
    #[error("offering {offering} is not part of the conflict for applicant {applicant_id}")]
    InvalidSelection {
        applicant_id: ApplicantId,
        offering: OfferingId,
    },
    #[error("conflict for applicant {applicant_id} is already resolved in favour of {finalized_offering}")]
    AlreadyResolved {
        applicant_id: ApplicantId,
        finalized_offering: OfferingId,
    },
    #[error("winning application {application_id} is {status}, not accepted")]
    WinnerNotAccepted {
        application_id: ApplicationId,
        status: &'static str,
    },
    #[error("application {application_id} no longer exists")]
    MissingMember { application_id: ApplicationId },
    #[error("application {application_id} no longer matches the conflict snapshot")]
    MemberMismatch { application_id: ApplicationId },
    #[error(
        "resolution partially committed: {} transition(s) applied, {} failed",
        .committed.len(),
        .failed.len()
    )]
    PartialCommit {
        committed: Vec<TransitionRecord>,
        failed: Vec<FailedTransition>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("resolution lock poisoned for applicant {0}")]
    LockPoisoned(ApplicantId),
}

/// Applies conflict resolutions through the store, one applicant at a time.
pub struct ConflictResolver<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    locks: Mutex<HashMap<ApplicantId, Arc<Mutex<()>>>>,
}

impl<S> ConflictResolver<S, SystemClock>
where
    S: ApplicationStore,
{
    pub fn new(store: Arc<S>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> ConflictResolver<S, C>
where
    S: ApplicationStore,
    C: Clock,
{
    pub fn with_clock(store: Arc<S>, clock: C) -> Self {
        Self {
            store,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Finalize the member for `winning_offering` and reject the other accepted members.
    pub fn resolve(
        &self,
        conflict: &ConflictRecord,
        winning_offering: &OfferingId,
        options: ResolveOptions,
    ) -> Result<ResolutionResult, ResolutionError> {
        if conflict.applications.is_empty() {
            return Err(ResolutionError::EmptyConflict);
        }
        let selected = conflict.member_for(winning_offering).ok_or_else(|| {
            ResolutionError::InvalidSelection {
                applicant_id: conflict.applicant_id.clone(),
                offering: winning_offering.clone(),
            }
        })?;

        let lock = self.lock_for(&conflict.applicant_id)?;
        let outcome = lock
            .lock()
            .map_err(|_| ResolutionError::LockPoisoned(conflict.applicant_id.clone()))
            .and_then(|_guard| self.resolve_locked(conflict, &selected.id, options));
        self.release_lock(&conflict.applicant_id, lock);
        outcome
    }

    fn resolve_locked(
        &self,
        conflict: &ConflictRecord,
        selected: &ApplicationId,
        options: ResolveOptions,
    ) -> Result<ResolutionResult, ResolutionError> {
        let current = self.reload(conflict, selected)?;
        let winner = current
            .iter()
            .find(|application| &application.id == selected)
            .ok_or_else(|| ResolutionError::MissingMember {
                application_id: selected.clone(),
            })?;

        if let Some(previous) = current
            .iter()
            .find(|application| application.id != winner.id && application.status.is_finalized())
        {
            if !options.override_finalized {
                return Err(ResolutionError::AlreadyResolved {
                    applicant_id: conflict.applicant_id.clone(),
                    finalized_offering: previous.offering_id.clone(),
                });
            }
            info!(
                applicant = %conflict.applicant_id,
                previous = %previous.offering_id,
                replacement = %winner.offering_id,
                "overriding finalized conflict resolution"
            );
        }

        if !winner.status.is_accepted() {
            return Err(ResolutionError::WinnerNotAccepted {
                application_id: winner.id.clone(),
                status: winner.status.label(),
            });
        }

        let note = match (&winner.resolution, winner.status.is_finalized()) {
            (Some(note), true) if note.winning_offering == winner.offering_id => note.clone(),
            _ => ResolutionNote {
                winning_offering: winner.offering_id.clone(),
                reason: format!("offer conflict resolved in favour of {}", winner.offering_id),
                resolved_at: self.clock.now(),
            },
        };

        let mut committed = Vec::new();
        if !winner.status.is_finalized() {
            let transition = StatusTransition {
                application_id: winner.id.clone(),
                expected: winner.status,
                next: ApplicationStatus::Accepted { finalized: true },
                resolution: Some(note.clone()),
            };
            self.store.apply_transition(&transition)?;
            committed.push(TransitionRecord::from(&transition));
        }

        let mut rejected = Vec::new();
        let mut failed = Vec::new();
        for loser in current.iter().filter(|application| application.id != winner.id) {
            match loser.status {
                ApplicationStatus::Accepted { .. } => {
                    let transition = StatusTransition {
                        application_id: loser.id.clone(),
                        expected: loser.status,
                        next: ApplicationStatus::Rejected,
                        resolution: Some(note.clone()),
                    };
                    match self.store.apply_transition(&transition) {
                        Ok(_) => {
                            committed.push(TransitionRecord::from(&transition));
                            rejected.push(loser.id.clone());
                        }
                        Err(error) => failed.push(FailedTransition {
                            application_id: loser.id.clone(),
                            to: ApplicationStatus::Rejected,
                            error: error.to_string(),
                        }),
                    }
                }
                ApplicationStatus::Rejected if rejected_in_favour_of(loser, &winner.offering_id) => {
                    rejected.push(loser.id.clone());
                }
                _ => {}
            }
        }

        if !failed.is_empty() {
            warn!(
                applicant = %conflict.applicant_id,
                committed = committed.len(),
                failed = failed.len(),
                "conflict resolution partially committed"
            );
            return Err(ResolutionError::PartialCommit { committed, failed });
        }

        let outcome = if committed.is_empty() {
            ResolutionOutcome::AlreadyFinal
        } else {
            ResolutionOutcome::Applied
        };

        info!(
            applicant = %conflict.applicant_id,
            winner = %winner.id,
            offering = %winner.offering_id,
            rejected = rejected.len(),
            ?outcome,
            "offer conflict resolved"
        );

        Ok(ResolutionResult {
            applicant_id: conflict.applicant_id.clone(),
            winning_application: winner.id.clone(),
            winning_offering: winner.offering_id.clone(),
            rejected,
            outcome,
            resolved_at: note.resolved_at,
        })
    }

    /// Resolve in favour of the earliest submission among the members.
    pub fn auto_resolve(
        &self,
        conflict: &ConflictRecord,
        options: ResolveOptions,
    ) -> Result<ResolutionResult, ResolutionError> {
        let offering = conflict
            .earliest_submission()
            .map(|application| application.offering_id.clone())
            .ok_or(ResolutionError::EmptyConflict)?;
        self.resolve(conflict, &offering, options)
    }

    fn lock_for(&self, applicant: &ApplicantId) -> Result<Arc<Mutex<()>>, ResolutionError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| ResolutionError::LockPoisoned(applicant.clone()))?;
        Ok(locks.entry(applicant.clone()).or_default().clone())
    }

    /// Drop the applicant's lock entry once no other resolution holds or waits on it.
    fn release_lock(&self, applicant: &ApplicantId, lock: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        drop(lock);
        if locks
            .get(applicant)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(applicant);
        }
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    /// Current rows for the snapshot members, followed by every other row the
    /// applicant holds in the winner's cycle, so acceptances recorded after
    /// detection are resolved too.
    fn reload(
        &self,
        conflict: &ConflictRecord,
        selected: &ApplicationId,
    ) -> Result<Vec<Application>, ResolutionError> {
        let mut current = conflict
            .applications
            .iter()
            .map(|snapshot| -> Result<Application, ResolutionError> {
                let current = self.store.get(&snapshot.id)?.ok_or_else(|| {
                    ResolutionError::MissingMember {
                        application_id: snapshot.id.clone(),
                    }
                })?;
                if current.applicant_id != conflict.applicant_id
                    || current.offering_id != snapshot.offering_id
                {
                    return Err(ResolutionError::MemberMismatch {
                        application_id: snapshot.id.clone(),
                    });
                }
                Ok(current)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cycle = current
            .iter()
            .find(|application| &application.id == selected)
            .map(|application| application.cycle.clone())
            .ok_or_else(|| ResolutionError::MissingMember {
                application_id: selected.clone(),
            })?;
        let mut extras: Vec<Application> = self
            .store
            .list_by_cycle(&cycle)?
            .into_iter()
            .filter(|application| {
                application.applicant_id == conflict.applicant_id
                    && !current.iter().any(|known| known.id == application.id)
            })
            .collect();
        if extras.iter().any(|application| application.status.is_accepted()) {
            debug!(
                applicant = %conflict.applicant_id,
                extra = extras.len(),
                "resolving acceptances recorded after detection"
            );
        }
        extras.sort_by(|left, right| {
            left.submitted_at
                .cmp(&right.submitted_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        current.extend(extras);
        Ok(current)
    }
}

fn rejected_in_favour_of(application: &Application, offering: &OfferingId) -> bool {
    application
        .resolution
        .as_ref()
        .map(|note| &note.winning_offering == offering)
        .unwrap_or(false)
}
