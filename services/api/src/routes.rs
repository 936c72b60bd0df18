use crate::infra::AppState;
use admissions::error::AppError;
use admissions::workflows::admissions::{
    admissions_router, AcademicRecordProvider, AdmissionsImporter, AdmissionsService,
    ApplicationStore, Clock, ConflictDetector, ConflictReport, NotificationDispatcher,
    OfferingRequirementProvider,
};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use std::sync::Arc;

/// Portal exports pasted into a request, for a dry-run conflict listing.
#[derive(Debug, Deserialize)]
pub(crate) struct ConflictPreviewRequest {
    pub(crate) applications_csv: String,
    #[serde(default)]
    pub(crate) records_csv: Option<String>,
}

pub(crate) fn with_admissions_routes<S, P, N, C>(
    service: Arc<AdmissionsService<S, P, N, C>>,
) -> axum::Router
where
    S: ApplicationStore + 'static,
    P: AcademicRecordProvider + OfferingRequirementProvider + 'static,
    N: NotificationDispatcher + 'static,
    C: Clock + Clone + 'static,
{
    admissions_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/admissions/conflicts/preview",
            axum::routing::post(conflict_preview_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Detect conflicts over uploaded exports without touching the live store.
pub(crate) async fn conflict_preview_endpoint(
    Json(payload): Json<ConflictPreviewRequest>,
) -> Result<Json<ConflictReport>, AppError> {
    let applications =
        AdmissionsImporter::applications_from_reader(Cursor::new(payload.applications_csv))?;
    let records = match payload.records_csv {
        Some(csv) => AdmissionsImporter::records_from_reader(Cursor::new(csv))?,
        None => Default::default(),
    };

    Ok(Json(ConflictDetector::default().detect(&applications, &records)))
}
