use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json},
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use campaign_core::backends::LocalBackend;
use campaign_core::config::{default_device_id, page_size_from_env_value};
use campaign_core::export::{export_file_name, visits_to_csv};
use campaign_core::{
    CampaignConfig, DEFAULT_DATA_DIR, FileKeyValueStore, StoredVisit, VisitQuery, VisitStore,
};

type Backend = LocalBackend<Arc<FileKeyValueStore>>;

/// Application state shared across REST API handlers
#[derive(Clone)]
struct AppState {
    backend: Arc<Backend>,
    page_size: u32,
}

#[derive(Serialize, Deserialize, ToSchema)]
struct HealthRes {
    ok: bool,
    message: String,
}

/// One visit as shown in the admin list.
#[derive(Serialize, Deserialize, ToSchema)]
struct VisitSummary {
    id: String,
    created_at: String,
    full_name: String,
    father_name: String,
    sex: String,
    age_years: u8,
    bp: String,
    pulse_rate: u16,
    temperature_c: f64,
    spo2: Option<u16>,
    glucose_value: Option<f64>,
    bmi: Option<f64>,
    bmi_category: Option<String>,
    bp_category: String,
    site_id: String,
    campaign_id: String,
    location_id: String,
}

impl From<&StoredVisit> for VisitSummary {
    fn from(visit: &StoredVisit) -> Self {
        let row = &visit.row;
        Self {
            id: visit.id.to_string(),
            created_at: visit.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            full_name: row.full_name.clone(),
            father_name: row.father_name.clone(),
            sex: row.sex.to_string(),
            age_years: row.age_years,
            bp: row.blood_pressure(),
            pulse_rate: row.pulse_rate,
            temperature_c: row.temperature_c,
            spo2: row.spo2,
            glucose_value: row.glucose_value,
            bmi: row.bmi,
            bmi_category: row.bmi_category.map(|c| c.to_string()),
            bp_category: row.bp_category.to_string(),
            site_id: row.site_id.clone(),
            campaign_id: row.campaign_id.clone(),
            location_id: row.location_id.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
struct ListVisitsRes {
    visits: Vec<VisitSummary>,
    total: u64,
    page: u32,
    page_size: u32,
    page_count: u32,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
struct VisitsParams {
    /// Case-insensitive filter on the patient's name
    q: Option<String>,
    /// Page number, starting at 1
    page: Option<u32>,
}

#[derive(OpenApi)]
#[openapi(
    paths(health, list_visits, export_visits),
    components(schemas(HealthRes, VisitSummary, ListVisitsRes))
)]
struct ApiDoc;

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/visits", get(list_visits))
        .route("/visits/export", get(export_visits))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Main entry point for the campaign admin REST server
///
/// Serves the visit list and CSV export over the local data directory.
///
/// # Environment Variables
/// - `CAMPAIGN_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CAMPAIGN_DATA_DIR`: Campaign data directory (default: "campaign_data")
/// - `CAMPAIGN_PAGE_SIZE`: Rows per admin page (default: 25)
/// - `CAMPAIGN_DEVICE_ID`: Client identifier (default: "campaign-run/<version>")
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("campaign_run=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CAMPAIGN_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir = std::env::var("CAMPAIGN_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into());
    let device_id = std::env::var("CAMPAIGN_DEVICE_ID")
        .unwrap_or_else(|_| default_device_id("campaign-run", env!("CARGO_PKG_VERSION")));
    let page_size = page_size_from_env_value(std::env::var("CAMPAIGN_PAGE_SIZE").ok())?;

    let config = CampaignConfig::new(PathBuf::from(data_dir), device_id, page_size)?;
    let store = Arc::new(FileKeyValueStore::open(config.local_storage_dir())?);
    let backend = LocalBackend::open(&config, store)?;

    tracing::info!("++ Starting campaign REST on {}", rest_addr);
    tracing::info!("++ Serving visits from {}", config.visits_dir().display());

    let state = AppState {
        backend: Arc::new(backend),
        page_size: config.page_size(),
    };

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Campaign REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/visits",
    params(VisitsParams),
    responses(
        (status = 200, description = "Page of visits, newest first", body = ListVisitsRes),
        (status = 500, description = "Internal server error")
    )
)]
/// List recorded visits
///
/// Newest first, optionally filtered by a case-insensitive substring of the patient's name.
/// The response carries the exact number of matching visits.
async fn list_visits(
    State(state): State<AppState>,
    Query(params): Query<VisitsParams>,
) -> Result<Json<ListVisitsRes>, (StatusCode, &'static str)> {
    let query = VisitQuery::new(params.q, params.page.unwrap_or(1), state.page_size);
    match state.backend.query(&query).await {
        Ok(page) => Ok(Json(ListVisitsRes {
            visits: page.rows.iter().map(VisitSummary::from).collect(),
            total: page.total,
            page: page.page,
            page_size: page.page_size,
            page_count: page.page_count(),
        })),
        Err(e) => {
            tracing::error!("List visits error: {:?}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Internal error"))
        }
    }
}

#[utoipa::path(
    get,
    path = "/visits/export",
    params(VisitsParams),
    responses(
        (status = 200, description = "CSV of all matching visits", content_type = "text/csv", body = String),
        (status = 500, description = "Internal server error")
    )
)]
/// Export every visit matching the filter as CSV
///
/// The `page` parameter is ignored; the export always covers the full filtered result, not
/// just the page the admin list is showing.
async fn export_visits(
    State(state): State<AppState>,
    Query(params): Query<VisitsParams>,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    let page = state
        .backend
        .query(&VisitQuery::all(params.q))
        .await
        .map_err(|e| {
            tracing::error!("Export visits error: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
        })?;

    let csv = visits_to_csv(&page.rows).map_err(|e| {
        tracing::error!("Export visits error: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })?;
    let file_name = export_file_name(Utc::now());
    tracing::info!("exporting {} visit(s) as {}", page.rows.len(), file_name);

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        csv,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use campaign_core::intake::demographics::DemographicsForm;
    use campaign_core::intake::staging::MemoryStaging;
    use campaign_core::intake::vitals::VitalsForm;
    use campaign_core::{IntakeWorkflow, SiteSession, SubmitOutcome, SystemClock};
    use chrono::Duration;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn session() -> SiteSession {
        let now = Utc::now();
        SiteSession {
            site_id: "site-1".into(),
            site_name: "Lafto Site 1".into(),
            identity_id: Some("user-1".into()),
            campaign_id: Some("campaign-1".into()),
            location_id: Some("location-1".into()),
            issued_at: now,
            expires_at: now + Duration::hours(12),
        }
    }

    async fn record_visit(backend: &Backend, given_name: &str) {
        let workflow = IntakeWorkflow::new(
            MemoryStaging::new(),
            backend,
            SystemClock,
            "campaign-run/test",
        );
        workflow
            .submit_demographics(&DemographicsForm {
                given_name: given_name.into(),
                father_name: "Bekele".into(),
                grandfather_name: "Tadesse".into(),
                sex: "Female".into(),
                age_years: "34".into(),
                woreda: "03".into(),
                ..DemographicsForm::default()
            })
            .expect("demographics should validate");

        let outcome = workflow
            .submit_vitals(
                &VitalsForm {
                    bp_systolic: "128".into(),
                    bp_diastolic: "82".into(),
                    bp_time: "09:45".into(),
                    pulse_rate: "76".into(),
                    temperature_c: "36.8".into(),
                    weight_kg: "70".into(),
                    height_cm: "170".into(),
                    ..VitalsForm::default()
                },
                Some(&session()),
            )
            .await
            .expect("vitals should be recorded");
        assert!(matches!(outcome, SubmitOutcome::Submitted(_)));
    }

    async fn test_state(temp_dir: &TempDir, page_size: u32) -> AppState {
        let config = CampaignConfig::new(
            temp_dir.path().to_path_buf(),
            "campaign-run/test".into(),
            page_size,
        )
        .expect("CampaignConfig::new should succeed");
        let store = Arc::new(
            FileKeyValueStore::open(config.local_storage_dir()).expect("Failed to open store"),
        );
        let backend = LocalBackend::open(&config, store).expect("Failed to open backend");

        for name in ["Abebe", "Almaz", "Kebede"] {
            record_visit(&backend, name).await;
        }

        AppState {
            backend: Arc::new(backend),
            page_size,
        }
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let response = app(test_state(&temp_dir, 25).await)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(health.ok);
    }

    #[tokio::test]
    async fn test_list_visits_paginates_with_exact_total() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let router = app(test_state(&temp_dir, 2).await);

        let response = router
            .clone()
            .oneshot(Request::get("/visits").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first: ListVisitsRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.visits.len(), 2);
        assert_eq!(first.page_count, 2);

        let response = router
            .oneshot(Request::get("/visits?page=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let second: ListVisitsRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(second.page, 2);
        assert_eq!(second.visits.len(), 1);
    }

    #[tokio::test]
    async fn test_list_visits_filters_by_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let response = app(test_state(&temp_dir, 25).await)
            .oneshot(Request::get("/visits?q=ALM").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let res: ListVisitsRes = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(res.total, 1);
        assert_eq!(res.visits[0].full_name, "Almaz");
        assert_eq!(res.visits[0].bp, "128/82");
        assert_eq!(res.visits[0].bp_category, "Stage 1");
        assert_eq!(res.visits[0].bmi, Some(24.2));
    }

    #[tokio::test]
    async fn test_export_returns_csv_attachment() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let response = app(test_state(&temp_dir, 1).await)
            .oneshot(Request::get("/visits/export?q=e").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"visits_export_"));
        assert!(disposition.ends_with(".csv\""));

        let csv = String::from_utf8(body_bytes(response).await).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert!(lines[0].starts_with("\"Created At\",\"Full Name\""));
        assert_eq!(lines.len(), 3, "header plus Abebe and Kebede");
    }

    #[tokio::test]
    async fn test_export_ignores_page_and_covers_every_match() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let response = app(test_state(&temp_dir, 1).await)
            .oneshot(Request::get("/visits/export?page=2").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let csv = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(!csv.ends_with('\n'));
        assert_eq!(csv.lines().count(), 4, "header plus all three visits");
    }
}
