use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::conflicts::{Clock, ResolutionError, ResolveOptions};
use super::domain::{ApplicantId, ApplicationId, CycleId, OfferingId};
use super::repository::{
    AcademicRecordProvider, ApplicationStore, NotificationDispatcher, OfferingRequirementProvider,
    StoreError,
};
use super::service::{AdmissionsService, AdmissionsServiceError, ApplicationDraft, SubmissionOutcome};

type SharedService<S, P, N, C> = Arc<AdmissionsService<S, P, N, C>>;

#[derive(Debug, Deserialize)]
pub(crate) struct EligibilityRequest {
    pub(crate) applicant_id: ApplicantId,
    pub(crate) offering_id: OfferingId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CatalogRequest {
    pub(crate) applicant_id: ApplicantId,
    pub(crate) offerings: Vec<OfferingId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResolveRequest {
    pub(crate) applications: Vec<ApplicationId>,
    /// Absent means "quick resolve": the earliest submission wins.
    #[serde(default)]
    pub(crate) winning_offering: Option<OfferingId>,
    #[serde(default)]
    pub(crate) override_finalized: bool,
}

/// Router builder exposing eligibility, submission and conflict endpoints.
pub fn admissions_router<S, P, N, C>(service: SharedService<S, P, N, C>) -> Router
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    Router::new()
        .route(
            "/api/v1/admissions/eligibility",
            post(eligibility_handler::<S, P, N, C>),
        )
        .route(
            "/api/v1/admissions/eligibility/catalog",
            post(catalog_handler::<S, P, N, C>),
        )
        .route(
            "/api/v1/admissions/applications",
            post(submit_handler::<S, P, N, C>),
        )
        .route(
            "/api/v1/admissions/applications/:application_id",
            get(status_handler::<S, P, N, C>),
        )
        .route(
            "/api/v1/admissions/cycles/:cycle/conflicts",
            get(conflicts_handler::<S, P, N, C>),
        )
        .route(
            "/api/v1/admissions/conflicts/resolve",
            post(resolve_handler::<S, P, N, C>),
        )
        .with_state(service)
}

pub(crate) async fn eligibility_handler<S, P, N, C>(
    State(service): State<SharedService<S, P, N, C>>,
    axum::Json(request): axum::Json<EligibilityRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    match service.check_eligibility(&request.applicant_id, &request.offering_id) {
        Ok(verdict) => (StatusCode::OK, axum::Json(verdict)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn catalog_handler<S, P, N, C>(
    State(service): State<SharedService<S, P, N, C>>,
    axum::Json(request): axum::Json<CatalogRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    match service.eligibility_catalog(&request.applicant_id, &request.offerings) {
        Ok(entries) => (StatusCode::OK, axum::Json(entries)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<S, P, N, C>(
    State(service): State<SharedService<S, P, N, C>>,
    axum::Json(draft): axum::Json<ApplicationDraft>,
) -> Response
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    match service.submit(draft) {
        Ok(SubmissionOutcome::Submitted { application }) => {
            (StatusCode::CREATED, axum::Json(application.status_view())).into_response()
        }
        Ok(SubmissionOutcome::Ineligible { verdict }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(verdict)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<S, P, N, C>(
    State(service): State<SharedService<S, P, N, C>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    match service.get(&ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, axum::Json(application.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn conflicts_handler<S, P, N, C>(
    State(service): State<SharedService<S, P, N, C>>,
    Path(cycle): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    match service.conflicts(&CycleId(cycle)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn resolve_handler<S, P, N, C>(
    State(service): State<SharedService<S, P, N, C>>,
    axum::Json(request): axum::Json<ResolveRequest>,
) -> Response
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    let conflict = match service.conflict_from_members(&request.applications) {
        Ok(conflict) => conflict,
        Err(error) => return error_response(error),
    };
    let options = ResolveOptions {
        override_finalized: request.override_finalized,
    };

    let outcome = match &request.winning_offering {
        Some(offering) => service.resolve(&conflict, offering, options),
        None => service.quick_resolve(&conflict, options),
    };

    match outcome {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: AdmissionsServiceError) -> Response {
    let status = match &error {
        AdmissionsServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdmissionsServiceError::UnknownApplicant(_)
        | AdmissionsServiceError::UnknownOffering(_)
        | AdmissionsServiceError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        AdmissionsServiceError::Store(StoreError::Duplicate)
        | AdmissionsServiceError::Store(StoreError::StaleState { .. }) => StatusCode::CONFLICT,
        AdmissionsServiceError::Members(_) => StatusCode::BAD_REQUEST,
        AdmissionsServiceError::Resolution(resolution) => match resolution {
            ResolutionError::EmptyConflict | ResolutionError::InvalidSelection { .. } => {
                StatusCode::BAD_REQUEST
            }
            ResolutionError::AlreadyResolved { .. }
            | ResolutionError::WinnerNotAccepted { .. }
            | ResolutionError::MissingMember { .. }
            | ResolutionError::MemberMismatch { .. }
            | ResolutionError::PartialCommit { .. }
            | ResolutionError::Store(StoreError::StaleState { .. }) => StatusCode::CONFLICT,
            ResolutionError::Store(_) | ResolutionError::LockPoisoned(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        AdmissionsServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = match &error {
        AdmissionsServiceError::Resolution(ResolutionError::PartialCommit { committed, failed }) => {
            json!({
                "error": error.to_string(),
                "committed": committed,
                "failed": failed,
            })
        }
        _ => json!({ "error": error.to_string() }),
    };

    (status, axum::Json(payload)).into_response()
}
