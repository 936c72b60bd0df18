use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::admissions::conflicts::{
    Clock, ConflictDetector, ConflictRecord, ConflictResolver, ResolutionResult,
};
use crate::workflows::admissions::domain::{
    AcademicRecord, ApplicantId, Application, ApplicationId, ApplicationStatus, CycleId,
    OfferingId, OfferingRequirement,
};
use crate::workflows::admissions::eligibility::AdmissionsPolicy;
use crate::workflows::admissions::repository::{
    AcademicRecordProvider, ApplicationStore, NotificationDispatcher, NotificationError,
    OfferingRequirementProvider, StatusTransition, StoreError,
};
use crate::workflows::admissions::service::AdmissionsService;

pub(super) const CYCLE: &str = "2026-intake";

pub(super) fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn applicant(id: &str) -> ApplicantId {
    ApplicantId(id.to_string())
}

pub(super) fn offering(n: u32) -> OfferingId {
    OfferingId::new("Northfield University", "Science", format!("Offering-{n}"))
}

pub(super) fn application(
    id: &str,
    applicant_id: &str,
    offering_id: OfferingId,
    submitted_at: DateTime<Utc>,
    status: ApplicationStatus,
) -> Application {
    Application {
        id: ApplicationId(id.to_string()),
        applicant_id: applicant(applicant_id),
        offering_id,
        cycle: CycleId(CYCLE.to_string()),
        submitted_at,
        status,
        eligibility: None,
        resolution: None,
    }
}

pub(super) fn accepted(
    id: &str,
    applicant_id: &str,
    offering_id: OfferingId,
    submitted_at: DateTime<Utc>,
) -> Application {
    application(
        id,
        applicant_id,
        offering_id,
        submitted_at,
        ApplicationStatus::Accepted { finalized: false },
    )
}

/// Scenario A's record: 120 credits, 6 passes, GPA 3.5.
pub(super) fn strong_record(applicant_id: &str) -> AcademicRecord {
    AcademicRecord::new(applicant(applicant_id))
        .with_credits(120.0)
        .with_passes(6)
        .with_gpa(3.5)
}

pub(super) fn requirement(n: u32, min_credits: u32) -> OfferingRequirement {
    OfferingRequirement::new(offering(n), min_credits)
}

/// Two accepted offers for `stu-1`, Offering-1 submitted first.
pub(super) fn two_way_conflict() -> Vec<Application> {
    vec![
        accepted("app-1", "stu-1", offering(1), at(10, 9)),
        accepted("app-2", "stu-1", offering(2), at(12, 9)),
    ]
}

pub(super) fn detect_single(applications: &[Application]) -> ConflictRecord {
    let report = ConflictDetector::default().detect(applications, &BTreeMap::new());
    assert_eq!(report.conflicts.len(), 1, "expected exactly one conflict");
    report.conflicts.into_iter().next().expect("conflict present")
}

#[derive(Debug, Clone)]
pub(super) struct FixedClock(pub(super) DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

pub(super) fn resolution_time() -> DateTime<Utc> {
    at(20, 15)
}

pub(super) fn resolver(store: Arc<MemoryStore>) -> ConflictResolver<MemoryStore, FixedClock> {
    ConflictResolver::with_clock(store, FixedClock(resolution_time()))
}

#[derive(Default)]
pub(super) struct MemoryStore {
    rows: Mutex<BTreeMap<ApplicationId, Application>>,
    failing: Mutex<BTreeSet<ApplicationId>>,
    writes: Mutex<Vec<StatusTransition>>,
}

impl MemoryStore {
    pub(super) fn with(applications: Vec<Application>) -> Self {
        let store = Self::default();
        {
            let mut rows = store.rows.lock().expect("store mutex poisoned");
            for application in applications {
                rows.insert(application.id.clone(), application);
            }
        }
        store
    }

    pub(super) fn fail_transitions_for(&self, id: &str) {
        self.failing
            .lock()
            .expect("store mutex poisoned")
            .insert(ApplicationId(id.to_string()));
    }

    pub(super) fn heal(&self) {
        self.failing.lock().expect("store mutex poisoned").clear();
    }

    pub(super) fn row(&self, id: &str) -> Application {
        self.rows
            .lock()
            .expect("store mutex poisoned")
            .get(&ApplicationId(id.to_string()))
            .cloned()
            .expect("row present")
    }

    pub(super) fn status_of(&self, id: &str) -> ApplicationStatus {
        self.row(id).status
    }

    pub(super) fn snapshot(&self) -> Vec<Application> {
        self.rows
            .lock()
            .expect("store mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub(super) fn write_count(&self) -> usize {
        self.writes.lock().expect("store mutex poisoned").len()
    }
}

impl ApplicationStore for MemoryStore {
    fn list_by_cycle(&self, cycle: &CycleId) -> Result<Vec<Application>, StoreError> {
        let rows = self.rows.lock().expect("store mutex poisoned");
        Ok(rows
            .values()
            .filter(|application| &application.cycle == cycle)
            .cloned()
            .collect())
    }

    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let rows = self.rows.lock().expect("store mutex poisoned");
        Ok(rows.get(id).cloned())
    }

    fn insert(&self, application: Application) -> Result<Application, StoreError> {
        let mut rows = self.rows.lock().expect("store mutex poisoned");
        let duplicate = rows.values().any(|existing| {
            existing.applicant_id == application.applicant_id
                && existing.offering_id == application.offering_id
                && existing.cycle == application.cycle
        });
        if duplicate || rows.contains_key(&application.id) {
            return Err(StoreError::Duplicate);
        }
        rows.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn apply_transition(&self, transition: &StatusTransition) -> Result<Application, StoreError> {
        if self
            .failing
            .lock()
            .expect("store mutex poisoned")
            .contains(&transition.application_id)
        {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut rows = self.rows.lock().expect("store mutex poisoned");
        let row = rows
            .get_mut(&transition.application_id)
            .ok_or(StoreError::NotFound)?;
        transition.apply_to(row)?;
        self.writes
            .lock()
            .expect("store mutex poisoned")
            .push(transition.clone());
        Ok(row.clone())
    }
}

#[derive(Default)]
pub(super) struct MemoryCatalog {
    records: Mutex<HashMap<ApplicantId, AcademicRecord>>,
    requirements: Mutex<HashMap<OfferingId, OfferingRequirement>>,
}

impl MemoryCatalog {
    pub(super) fn add_record(&self, record: AcademicRecord) {
        self.records
            .lock()
            .expect("catalog mutex poisoned")
            .insert(record.applicant_id.clone(), record);
    }

    pub(super) fn add_requirement(&self, requirement: OfferingRequirement) {
        self.requirements
            .lock()
            .expect("catalog mutex poisoned")
            .insert(requirement.offering_id.clone(), requirement);
    }
}

impl AcademicRecordProvider for MemoryCatalog {
    fn academic_record(
        &self,
        applicant: &ApplicantId,
    ) -> Result<Option<AcademicRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .expect("catalog mutex poisoned")
            .get(applicant)
            .cloned())
    }
}

impl OfferingRequirementProvider for MemoryCatalog {
    fn requirement(
        &self,
        offering: &OfferingId,
    ) -> Result<Option<OfferingRequirement>, StoreError> {
        Ok(self
            .requirements
            .lock()
            .expect("catalog mutex poisoned")
            .get(offering)
            .cloned())
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    events: Mutex<Vec<ResolutionResult>>,
    offline: Mutex<bool>,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<ResolutionResult> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn go_offline(&self) {
        *self.offline.lock().expect("notifier mutex poisoned") = true;
    }
}

impl NotificationDispatcher for MemoryNotifier {
    fn dispatch(&self, result: &ResolutionResult) -> Result<(), NotificationError> {
        if *self.offline.lock().expect("notifier mutex poisoned") {
            return Err(NotificationError::Transport("mail relay offline".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(result.clone());
        Ok(())
    }
}

pub(super) type TestService = AdmissionsService<MemoryStore, MemoryCatalog, MemoryNotifier, FixedClock>;

pub(super) fn build_service(
    applications: Vec<Application>,
) -> (
    TestService,
    Arc<MemoryStore>,
    Arc<MemoryCatalog>,
    Arc<MemoryNotifier>,
) {
    let store = Arc::new(MemoryStore::with(applications));
    let catalog = Arc::new(MemoryCatalog::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let service = AdmissionsService::with_clock(
        store.clone(),
        catalog.clone(),
        notifier.clone(),
        AdmissionsPolicy::default(),
        FixedClock(resolution_time()),
    );
    (service, store, catalog, notifier)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
