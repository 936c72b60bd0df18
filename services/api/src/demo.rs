use crate::infra::{
    default_requirements, parse_offering, parse_subject, InMemoryApplicationStore,
    InMemoryCatalog, InMemoryNotifier,
};
use admissions::config::AppConfig;
use admissions::error::AppError;
use admissions::workflows::admissions::{
    AcademicRecord, AdmissionsImporter, AdmissionsPolicy, AdmissionsService, ApplicantId,
    Application, ApplicationDraft, ApplicationId, ApplicationStatus, ApplicationStore,
    ConflictReport, CycleId, IntegrityWarning, NotificationStatus, OfferingId,
    OfferingRequirement, PriorityScorer, ResolutionReceipt, ResolveOptions, StatusTransition,
    StoreError, SubjectRequirement, SubmissionOutcome,
};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

type DemoService = AdmissionsService<InMemoryApplicationStore, InMemoryCatalog, InMemoryNotifier>;

#[derive(Args, Debug)]
pub(crate) struct EligibilityCheckArgs {
    /// Academic records export (CSV)
    #[arg(long)]
    pub(crate) records: PathBuf,
    /// Applicant id as it appears in the records export
    #[arg(long)]
    pub(crate) applicant: String,
    /// Offering as Institution/Faculty/Course
    #[arg(long, value_parser = parse_offering)]
    pub(crate) offering: OfferingId,
    /// Minimum credits the offering demands
    #[arg(long)]
    pub(crate) min_credits: u32,
    /// Subject requirement as Subject=Grade (repeatable)
    #[arg(long = "subject", value_parser = parse_subject)]
    pub(crate) subjects: Vec<SubjectRequirement>,
}

#[derive(Args, Debug)]
pub(crate) struct ConflictDetectArgs {
    /// Applications export (CSV)
    #[arg(long)]
    pub(crate) applications: PathBuf,
    /// Academic records export (CSV) used for priority ordering
    #[arg(long)]
    pub(crate) records: PathBuf,
    /// Resolve every conflict in favour of the earliest submission
    #[arg(long)]
    pub(crate) resolve_earliest: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Admissions cycle used for the demo applications
    #[arg(long, default_value = "2026-intake")]
    pub(crate) cycle: String,
    /// Stop after the eligibility scenarios
    #[arg(long)]
    pub(crate) skip_conflicts: bool,
}

pub(crate) fn run_eligibility_check(args: EligibilityCheckArgs) -> Result<(), AppError> {
    let EligibilityCheckArgs {
        records,
        applicant,
        offering,
        min_credits,
        subjects,
    } = args;

    let policy = AppConfig::load()?.admissions;
    let records = AdmissionsImporter::records_from_path(records)?;
    let requirement = subjects
        .into_iter()
        .fold(OfferingRequirement::new(offering, min_credits), |requirement, subject| {
            requirement.with_subject(subject)
        });

    let catalog = InMemoryCatalog::default()
        .with_records(records.into_values())
        .with_requirements([requirement.clone()]);
    let service = AdmissionsService::new(
        Arc::new(InMemoryApplicationStore::default()),
        Arc::new(catalog),
        Arc::new(InMemoryNotifier::default()),
        policy,
    );

    let verdict = service.check_eligibility(&ApplicantId(applicant.clone()), &requirement.offering_id)?;
    println!("Eligibility of {} for {}", applicant, requirement.offering_id);
    println!("- {}", verdict.message);
    for missing in &verdict.missing_requirements {
        println!("  - {}", missing);
    }

    Ok(())
}

pub(crate) fn run_conflict_detection(args: ConflictDetectArgs) -> Result<(), AppError> {
    let ConflictDetectArgs {
        applications,
        records,
        resolve_earliest,
    } = args;

    let policy = AppConfig::load()?.admissions;
    let applications = AdmissionsImporter::applications_from_path(applications)?;
    let records = AdmissionsImporter::records_from_path(records)?;
    let cycles: BTreeSet<CycleId> = applications
        .iter()
        .map(|application| application.cycle.clone())
        .collect();

    let service = AdmissionsService::new(
        Arc::new(InMemoryApplicationStore::from_export(applications)),
        Arc::new(InMemoryCatalog::default().with_records(records.into_values())),
        Arc::new(InMemoryNotifier::default()),
        policy,
    );

    for cycle in cycles {
        let report = service.conflicts(&cycle)?;
        render_conflict_report(&cycle, &report);

        if !resolve_earliest {
            continue;
        }
        for conflict in &report.conflicts {
            match service.quick_resolve(conflict, ResolveOptions::default()) {
                Ok(receipt) => render_receipt(&receipt),
                Err(err) => println!(
                    "  Resolution for {} failed: {}",
                    conflict.applicant_id, err
                ),
            }
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        cycle,
        skip_conflicts,
    } = args;
    let cycle = CycleId(cycle);

    println!("Admissions arbitration demo");
    let catalog = InMemoryCatalog::default()
        .with_requirements(default_requirements())
        .with_records(demo_records());
    let store = Arc::new(InMemoryApplicationStore::default());
    let notifier = Arc::new(InMemoryNotifier::default());
    let service = AdmissionsService::new(
        store.clone(),
        Arc::new(catalog),
        notifier.clone(),
        AdmissionsPolicy::default(),
    );

    let physics = OfferingId::new("Lakeside University", "Science", "Physics");
    let civil = OfferingId::new("Harbour Polytechnic", "Engineering", "Civil Engineering");
    let accounting = OfferingId::new("Lakeside University", "Commerce", "Accounting");

    println!("\nScenario A: strong applicant");
    let amara = ApplicantId("amara".to_string());
    let verdict = service.check_eligibility(&amara, &physics)?;
    println!("- {} for {}: {}", amara, physics, verdict.message);
    if let Some(record) = demo_records().into_iter().find(|record| record.applicant_id == amara) {
        match PriorityScorer.score(&record) {
            Ok(score) => println!("  Priority score: {}", score.value()),
            Err(err) => println!("  Priority score unavailable: {}", err),
        }
    }
    match service.submit(ApplicationDraft {
        applicant_id: amara.clone(),
        offering_id: physics.clone(),
        cycle: cycle.clone(),
    })? {
        SubmissionOutcome::Submitted { application } => {
            match serde_json::to_string_pretty(&application.status_view()) {
                Ok(json) => println!("  Public status payload:\n{}", json),
                Err(err) => println!("  Public status payload unavailable: {}", err),
            }
        }
        SubmissionOutcome::Ineligible { verdict } => {
            println!("  Submission refused: {}", verdict.summary())
        }
    }

    println!("\nScenario B: credit shortfall");
    let bongani = ApplicantId("bongani".to_string());
    let verdict = service.check_eligibility(&bongani, &accounting)?;
    println!("- {} for {}: {}", bongani, accounting, verdict.summary());

    println!("\nCatalog badges for bongani");
    for entry in service.eligibility_catalog(&bongani, &[physics.clone(), civil.clone(), accounting.clone()])? {
        let badge = if entry.verdict.is_eligible { "eligible" } else { "not eligible" };
        println!("- {}: {}", entry.offering_id, badge);
    }

    if skip_conflicts {
        return Ok(());
    }

    let opened = Utc::now();
    for application in [
        offer("demo-c1", "amara", &civil, &cycle, opened + Duration::hours(2)),
        offer("demo-d1", "chipo", &civil, &cycle, opened),
        offer("demo-d2", "chipo", &physics, &cycle, opened + Duration::hours(5)),
    ] {
        store.insert(application).map_err(store_error)?;
    }
    accept_submitted(&service, &store, &cycle, &amara)?;

    let report = service.conflicts(&cycle)?;
    render_conflict_report(&cycle, &report);

    println!("\nScenario C: operator keeps {} for amara", physics);
    if let Some(conflict) = report.conflicts.iter().find(|conflict| conflict.applicant_id == amara) {
        let receipt = service.resolve(conflict, &physics, ResolveOptions::default())?;
        render_receipt(&receipt);
    }

    println!("\nScenario D: earliest submission wins for chipo");
    let chipo = ApplicantId("chipo".to_string());
    if let Some(conflict) = report.conflicts.iter().find(|conflict| conflict.applicant_id == chipo) {
        let receipt = service.quick_resolve(conflict, ResolveOptions::default())?;
        render_receipt(&receipt);

        let retry = service.quick_resolve(conflict, ResolveOptions::default())?;
        println!(
            "  Retry outcome: {:?} (notification {})",
            retry.result.outcome,
            notification_label(&retry.notification)
        );
    }

    println!("\nQueued notices: {}", notifier.events().len());
    Ok(())
}

fn demo_records() -> Vec<AcademicRecord> {
    vec![
        AcademicRecord::new(ApplicantId("amara".to_string()))
            .with_credits(120.0)
            .with_passes(6)
            .with_gpa(3.5)
            .with_grade("Mathematics", "B"),
        AcademicRecord::new(ApplicantId("bongani".to_string())).with_credits(80.0),
        AcademicRecord::new(ApplicantId("chipo".to_string()))
            .with_credits(140.0)
            .with_passes(7)
            .with_gpa(3.1)
            .with_grade("Mathematics", "A"),
    ]
}

/// An offer already decided by the institution.
fn offer(
    id: &str,
    applicant: &str,
    offering: &OfferingId,
    cycle: &CycleId,
    submitted_at: DateTime<Utc>,
) -> Application {
    Application {
        id: ApplicationId(id.to_string()),
        applicant_id: ApplicantId(applicant.to_string()),
        offering_id: offering.clone(),
        cycle: cycle.clone(),
        submitted_at,
        status: ApplicationStatus::Accepted { finalized: false },
        eligibility: None,
        resolution: None,
    }
}

/// Walk the applicant's pending submissions through review to acceptance.
fn accept_submitted(
    service: &DemoService,
    store: &InMemoryApplicationStore,
    cycle: &CycleId,
    applicant: &ApplicantId,
) -> Result<(), AppError> {
    let pending: Vec<Application> = store
        .list_by_cycle(cycle)
        .map_err(store_error)?
        .into_iter()
        .filter(|application| {
            &application.applicant_id == applicant && application.status == ApplicationStatus::Pending
        })
        .collect();

    for application in pending {
        for (expected, next) in [
            (ApplicationStatus::Pending, ApplicationStatus::UnderReview),
            (
                ApplicationStatus::UnderReview,
                ApplicationStatus::Accepted { finalized: false },
            ),
        ] {
            store
                .apply_transition(&StatusTransition {
                    application_id: application.id.clone(),
                    expected,
                    next,
                    resolution: None,
                })
                .map_err(store_error)?;
        }
        let accepted = service.get(&application.id)?;
        println!("- {} accepted by {}", accepted.id, accepted.offering_id);
    }

    Ok(())
}

fn store_error(err: StoreError) -> AppError {
    AppError::Admissions(err.into())
}

fn render_conflict_report(cycle: &CycleId, report: &ConflictReport) {
    println!("\nOffer conflicts for cycle {}", cycle);
    if report.conflicts.is_empty() {
        println!("- none");
    }
    for conflict in &report.conflicts {
        println!(
            "- {} (priority {}): {}",
            conflict.applicant_id,
            conflict.priority_score.value(),
            conflict
                .offerings()
                .map(|offering| offering.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    for warning in &report.warnings {
        match warning {
            IntegrityWarning::DuplicateAcceptance {
                applicant_id,
                offering_id,
                application_ids,
            } => println!(
                "  ! {} holds {} accepted rows for {}",
                applicant_id,
                application_ids.len(),
                offering_id
            ),
            IntegrityWarning::UnscorableRecord {
                applicant_id,
                reason,
            } => println!("  ! record for {} scored as 0: {}", applicant_id, reason),
        }
    }
}

fn render_receipt(receipt: &ResolutionReceipt) {
    let result = &receipt.result;
    println!(
        "- {} keeps {} ({}) | rejected {} | {:?}",
        result.applicant_id,
        result.winning_offering,
        result.winning_application,
        result.rejected.len(),
        result.outcome
    );
    println!("  Notification: {}", notification_label(&receipt.notification));
}

fn notification_label(status: &NotificationStatus) -> String {
    match status {
        NotificationStatus::Delivered => "delivered".to_string(),
        NotificationStatus::Failed(reason) => format!("failed ({reason})"),
        NotificationStatus::Skipped => "skipped".to_string(),
    }
}
