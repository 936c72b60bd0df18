use crate::cli::ServeArgs;
use crate::infra::{
    default_requirements, AppState, InMemoryApplicationStore, InMemoryCatalog, InMemoryNotifier,
};
use crate::routes::with_admissions_routes;
use admissions::config::AppConfig;
use admissions::error::AppError;
use admissions::telemetry;
use admissions::workflows::admissions::{AdmissionsImporter, AdmissionsService};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let (store, catalog) = seeded_adapters(&args)?;
    let store = Arc::new(store);
    let catalog = Arc::new(catalog);
    let notifier = Arc::new(InMemoryNotifier::default());
    let service = Arc::new(AdmissionsService::new(
        store,
        catalog,
        notifier,
        config.admissions.clone(),
    ));

    let app = with_admissions_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        credit_floor = config.admissions.credit_floor(),
        "admissions service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// In-memory adapters loaded from the optional portal exports passed to `serve`.
pub(crate) fn seeded_adapters(
    args: &ServeArgs,
) -> Result<(InMemoryApplicationStore, InMemoryCatalog), AppError> {
    let applications = match &args.applications {
        Some(path) => AdmissionsImporter::applications_from_path(path)?,
        None => Vec::new(),
    };
    let records = match &args.records {
        Some(path) => AdmissionsImporter::records_from_path(path)?,
        None => Default::default(),
    };

    info!(
        applications = applications.len(),
        records = records.len(),
        "seeding in-memory admissions data"
    );

    let catalog = InMemoryCatalog::default()
        .with_records(records.into_values())
        .with_requirements(default_requirements());
    Ok((InMemoryApplicationStore::from_export(applications), catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use admissions::workflows::admissions::AdmissionsPolicy;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use tower::ServiceExt;

    const APPLICATIONS: &str = "Application ID,Applicant ID,Cycle,Institution,Faculty,Course,Submitted At,Status\n\
app-1,amara,2026-intake,Lakeside University,Science,Physics,2026-01-10,Accepted\n\
app-2,amara,2026-intake,Harbour Polytechnic,Engineering,Civil Engineering,2026-01-12,Accepted\n";

    const RECORDS: &str = "Applicant ID,Credits,Passes,GPA,Grades\n\
amara,120,6,3.5,Mathematics=B\n";

    fn write_export(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "admissions-serve-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, contents).expect("write export");
        path
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    #[tokio::test]
    async fn serve_exposes_seeded_exports() {
        let args = ServeArgs {
            applications: Some(write_export("applications.csv", APPLICATIONS)),
            records: Some(write_export("records.csv", RECORDS)),
            ..ServeArgs::default()
        };
        let (store, catalog) = seeded_adapters(&args).expect("exports load");
        let service = Arc::new(AdmissionsService::new(
            Arc::new(store),
            Arc::new(catalog),
            Arc::new(InMemoryNotifier::default()),
            AdmissionsPolicy::default(),
        ));
        let app = with_admissions_routes(service);

        let eligibility = app
            .clone()
            .oneshot(
                Request::post("/api/v1/admissions/eligibility")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({
                            "applicant_id": "amara",
                            "offering_id": {
                                "institution": "Lakeside University",
                                "faculty": "Science",
                                "course": "Physics"
                            }
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(eligibility.status(), StatusCode::OK);
        assert_eq!(json_body(eligibility).await["is_eligible"], json!(true));

        let conflicts = app
            .oneshot(
                Request::get("/api/v1/admissions/cycles/2026-intake/conflicts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(conflicts.status(), StatusCode::OK);
        let body = json_body(conflicts).await;
        assert_eq!(body["conflicts"][0]["applicant_id"], json!("amara"));
        assert_eq!(body["conflicts"][0]["priority_score"], json!(530.0));

        for path in [args.applications, args.records].into_iter().flatten() {
            let _ = std::fs::remove_file(path);
        }
    }

    #[test]
    fn missing_export_is_reported() {
        let args = ServeArgs {
            records: Some(PathBuf::from("/nonexistent/records.csv")),
            ..ServeArgs::default()
        };

        assert!(matches!(seeded_adapters(&args), Err(AppError::Import(_))));
    }
}
