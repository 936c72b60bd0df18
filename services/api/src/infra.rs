use admissions::workflows::admissions::{
    AcademicRecord, AcademicRecordProvider, ApplicantId, Application, ApplicationId,
    ApplicationStore, CycleId, NotificationDispatcher, NotificationError, OfferingId,
    OfferingRequirement, OfferingRequirementProvider, ResolutionResult, StatusTransition,
    StoreError, SubjectRequirement,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryApplicationStore {
    rows: Arc<Mutex<BTreeMap<ApplicationId, Application>>>,
}

impl InMemoryApplicationStore {
    /// Load exported rows as-is. Duplicate acceptances are kept so the detector
    /// can report them; a repeated application id keeps the last row.
    pub(crate) fn from_export(applications: Vec<Application>) -> Self {
        let rows = applications
            .into_iter()
            .map(|application| (application.id.clone(), application))
            .collect();
        Self {
            rows: Arc::new(Mutex::new(rows)),
        }
    }

    fn rows(&self) -> Result<MutexGuard<'_, BTreeMap<ApplicationId, Application>>, StoreError> {
        self.rows.lock().map_err(poisoned)
    }
}

impl ApplicationStore for InMemoryApplicationStore {
    fn list_by_cycle(&self, cycle: &CycleId) -> Result<Vec<Application>, StoreError> {
        Ok(self
            .rows()?
            .values()
            .filter(|application| &application.cycle == cycle)
            .cloned()
            .collect())
    }

    fn get(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        Ok(self.rows()?.get(id).cloned())
    }

    fn insert(&self, application: Application) -> Result<Application, StoreError> {
        let mut rows = self.rows()?;
        let duplicate = rows.contains_key(&application.id)
            || rows.values().any(|existing| {
                existing.applicant_id == application.applicant_id
                    && existing.offering_id == application.offering_id
                    && existing.cycle == application.cycle
            });
        if duplicate {
            return Err(StoreError::Duplicate);
        }
        rows.insert(application.id.clone(), application.clone());
        Ok(application)
    }

    fn apply_transition(&self, transition: &StatusTransition) -> Result<Application, StoreError> {
        let mut rows = self.rows()?;
        let row = rows
            .get_mut(&transition.application_id)
            .ok_or(StoreError::NotFound)?;
        transition.apply_to(row)?;
        Ok(row.clone())
    }
}

/// Academic records and offering requirements held in memory.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCatalog {
    records: Arc<Mutex<HashMap<ApplicantId, AcademicRecord>>>,
    requirements: Arc<Mutex<HashMap<OfferingId, OfferingRequirement>>>,
}

impl InMemoryCatalog {
    pub(crate) fn with_records(self, records: impl IntoIterator<Item = AcademicRecord>) -> Self {
        if let Ok(mut guard) = self.records.lock() {
            for record in records {
                guard.insert(record.applicant_id.clone(), record);
            }
        }
        self
    }

    pub(crate) fn with_requirements(
        self,
        requirements: impl IntoIterator<Item = OfferingRequirement>,
    ) -> Self {
        if let Ok(mut guard) = self.requirements.lock() {
            for requirement in requirements {
                guard.insert(requirement.offering_id.clone(), requirement);
            }
        }
        self
    }
}

impl AcademicRecordProvider for InMemoryCatalog {
    fn academic_record(
        &self,
        applicant: &ApplicantId,
    ) -> Result<Option<AcademicRecord>, StoreError> {
        Ok(self.records.lock().map_err(poisoned)?.get(applicant).cloned())
    }
}

impl OfferingRequirementProvider for InMemoryCatalog {
    fn requirement(
        &self,
        offering: &OfferingId,
    ) -> Result<Option<OfferingRequirement>, StoreError> {
        Ok(self
            .requirements
            .lock()
            .map_err(poisoned)?
            .get(offering)
            .cloned())
    }
}

/// Records resolution notices in memory and logs them; delivery is external.
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotifier {
    events: Arc<Mutex<Vec<ResolutionResult>>>,
}

impl NotificationDispatcher for InMemoryNotifier {
    fn dispatch(&self, result: &ResolutionResult) -> Result<(), NotificationError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|_| NotificationError::Transport("notifier lock poisoned".to_string()))?;
        info!(
            applicant = %result.applicant_id,
            offering = %result.winning_offering,
            rejected = result.rejected.len(),
            "queued conflict resolution notice"
        );
        guard.push(result.clone());
        Ok(())
    }
}

impl InMemoryNotifier {
    pub(crate) fn events(&self) -> Vec<ResolutionResult> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Offerings available to the server and demo out of the box.
pub(crate) fn default_requirements() -> Vec<OfferingRequirement> {
    vec![
        OfferingRequirement::new(
            OfferingId::new("Lakeside University", "Science", "Physics"),
            100,
        )
        .with_subject(SubjectRequirement::new("Mathematics", "C"))
        .with_description("BSc Physics"),
        OfferingRequirement::new(
            OfferingId::new("Harbour Polytechnic", "Engineering", "Civil Engineering"),
            90,
        )
        .with_description("Diploma in Civil Engineering"),
        OfferingRequirement::new(
            OfferingId::new("Lakeside University", "Commerce", "Accounting"),
            100,
        )
        .with_description("BCom Accounting"),
    ]
}

/// Parse `Institution/Faculty/Course`.
pub(crate) fn parse_offering(raw: &str) -> Result<OfferingId, String> {
    let parts: Vec<&str> = raw.split('/').map(str::trim).collect();
    match parts.as_slice() {
        [institution, faculty, course]
            if !institution.is_empty() && !faculty.is_empty() && !course.is_empty() =>
        {
            Ok(OfferingId::new(*institution, *faculty, *course))
        }
        _ => Err(format!(
            "expected offering as Institution/Faculty/Course, got '{raw}'"
        )),
    }
}

/// Parse `Subject=Grade`.
pub(crate) fn parse_subject(raw: &str) -> Result<SubjectRequirement, String> {
    match raw.split_once('=') {
        Some((subject, grade)) if !subject.trim().is_empty() && !grade.trim().is_empty() => {
            Ok(SubjectRequirement::new(subject.trim(), grade.trim()))
        }
        _ => Err(format!("expected subject requirement as Subject=Grade, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use admissions::workflows::admissions::ApplicationStatus;
    use chrono::{TimeZone, Utc};

    fn accepted(id: &str, course: &str) -> Application {
        Application {
            id: ApplicationId(id.to_string()),
            applicant_id: ApplicantId("stu-1".to_string()),
            offering_id: OfferingId::new("Lakeside University", "Science", course),
            cycle: CycleId("2026".to_string()),
            submitted_at: Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap(),
            status: ApplicationStatus::Accepted { finalized: false },
            eligibility: None,
            resolution: None,
        }
    }

    #[test]
    fn store_rejects_second_application_to_same_offering() {
        let store = InMemoryApplicationStore::default();
        store.insert(accepted("app-1", "Physics")).expect("first insert");

        let result = store.insert(accepted("app-2", "Physics"));

        assert!(matches!(result, Err(StoreError::Duplicate)));
        assert_eq!(
            store
                .list_by_cycle(&CycleId("2026".to_string()))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn store_enforces_expected_status_on_transitions() {
        let store = InMemoryApplicationStore::from_export(vec![accepted("app-1", "Physics")]);
        let transition = StatusTransition {
            application_id: ApplicationId("app-1".to_string()),
            expected: ApplicationStatus::Pending,
            next: ApplicationStatus::UnderReview,
            resolution: None,
        };

        let result = store.apply_transition(&transition);

        assert!(matches!(result, Err(StoreError::StaleState { .. })));
    }

    #[test]
    fn parses_offering_and_subject_arguments() {
        assert_eq!(
            parse_offering("Lakeside University / Science / Physics").unwrap(),
            OfferingId::new("Lakeside University", "Science", "Physics")
        );
        assert!(parse_offering("Physics").is_err());
        assert_eq!(
            parse_subject("Mathematics=C").unwrap(),
            SubjectRequirement::new("Mathematics", "C")
        );
        assert!(parse_subject("Mathematics").is_err());
    }
}
