/**
 * API REST BANDWATCH - Contrat de présentation du moniteur
 *
 * RÔLE :
 * Expose le moniteur aux interfaces (dashboard, CLI, scripts) sans leur
 * donner accès à l'état interne : lectures = snapshots, écritures = commandes.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum (port 8080 par défaut)
 * - Routes : /health, /system, /targets, /history, /alerts, /samples, /monitor, /export, /interfaces
 * - Les erreurs du cœur sont traduites en statuts HTTP (400 cible invalide,
 *   404 cible inconnue, 409 démarrage sans cible active, 500 sinon)
 * - Les accès au sink et au disque passent par spawn_blocking
 * - Les adresses renvoyées sont toujours sous forme canonique
 *
 * RAFRAÎCHISSEMENT :
 * Le client interroge /samples/drain et /targets/{ip}/aggregates à la
 * cadence annoncée par GET /monitor (refresh_interval_secs).
 */

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bandwatch_core::models::parse_target_id;
use bandwatch_core::{
    local_interfaces, Alert, LocalInterface, Monitor, MonitorError, MonitorState, MonitorStats, Sample, Target,
    TargetAggregates,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::error;

use crate::health::{HealthTracker, KernelHealth};

const DEFAULT_HOURS: u32 = 24;

#[derive(Clone)]
pub struct AppState {
    pub monitor: Monitor,
    pub health_tracker: HealthTracker,
    pub export_dir: PathBuf,
    pub refresh_interval_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error("Unknown target {0}")]
    UnknownTarget(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Monitor(MonitorError::InvalidTarget(_)) => StatusCode::BAD_REQUEST,
            ApiError::Monitor(MonitorError::EmptyTargetSet) => StatusCode::CONFLICT,
            ApiError::UnknownTarget(_) => StatusCode::NOT_FOUND,
            ApiError::Monitor(e) => {
                error!("Request failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Task(e) => {
                error!("Request task failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Exécute un accès SQLite / fichier hors de l'exécuteur async
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, MonitorError> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// Adresse valide ET enregistrée, sinon 400 / 404
fn known_target(app: &AppState, ip: &str) -> Result<IpAddr, ApiError> {
    let id = parse_target_id(ip)?;
    app.monitor
        .target(id)
        .map(|t| t.id)
        .ok_or_else(|| ApiError::UnknownTarget(ip.to_string()))
}

#[derive(Debug, Deserialize)]
struct HoursParams {
    hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct NewTarget {
    ip: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActiveParams {
    active: bool,
}

#[derive(Debug, Serialize)]
struct MonitorView {
    state: MonitorState,
    sampler: &'static str,
    tick_interval_secs: u64,
    refresh_interval_secs: u64,
    stats: MonitorStats,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/targets", get(list_targets).post(add_target))
        .route("/targets/{ip}", delete(remove_target))
        .route("/targets/{ip}/active", post(set_target_active))
        .route("/targets/{ip}/aggregates", get(get_aggregates))
        .route("/targets/{ip}/history", get(get_target_history))
        .route("/history", get(get_history))
        .route("/alerts", get(get_alerts))
        .route("/samples/drain", post(drain_samples))
        .route("/monitor", get(get_monitor))
        .route("/monitor/start", post(start_monitor))
        .route("/monitor/stop", post(stop_monitor))
        .route("/monitor/clear", post(clear_monitor))
        .route("/export", post(export_data))
        .route("/interfaces", get(list_interfaces))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.monitor))
}

// GET /targets
async fn list_targets(State(app): State<AppState>) -> Json<Vec<Target>> {
    Json(app.monitor.list_targets())
}

// POST /targets {ip, description?}
async fn add_target(State(app): State<AppState>, Json(body): Json<NewTarget>) -> ApiResult<serde_json::Value> {
    let id = parse_target_id(&body.ip)?;
    let monitor = app.monitor.clone();
    let added = blocking(move || monitor.register_target(&body.ip, body.description)).await?;
    Ok(Json(serde_json::json!({ "ip": id.to_string(), "added": added })))
}

// DELETE /targets/{ip} (cible inconnue : removed = false)
async fn remove_target(State(app): State<AppState>, Path(ip): Path<String>) -> ApiResult<serde_json::Value> {
    let id = parse_target_id(&ip)?;
    let monitor = app.monitor.clone();
    let removed = blocking(move || monitor.unregister_target(&ip)).await?;
    Ok(Json(serde_json::json!({ "ip": id.to_string(), "removed": removed })))
}

// POST /targets/{ip}/active {active}
async fn set_target_active(
    State(app): State<AppState>,
    Path(ip): Path<String>,
    Json(body): Json<ActiveParams>,
) -> ApiResult<serde_json::Value> {
    let id = known_target(&app, &ip)?;
    let monitor = app.monitor.clone();
    let active = body.active;
    let changed = blocking(move || monitor.set_target_active(&ip, active)).await?;
    Ok(Json(serde_json::json!({ "ip": id.to_string(), "active": active, "changed": changed })))
}

// GET /targets/{ip}/aggregates
async fn get_aggregates(State(app): State<AppState>, Path(ip): Path<String>) -> ApiResult<TargetAggregates> {
    let id = known_target(&app, &ip)?;
    Ok(Json(app.monitor.latest_aggregates(id)))
}

// GET /targets/{ip}/history?hours=
async fn get_target_history(
    State(app): State<AppState>,
    Path(ip): Path<String>,
    Query(params): Query<HoursParams>,
) -> ApiResult<Vec<Sample>> {
    let id = known_target(&app, &ip)?;
    let hours = params.hours.unwrap_or(DEFAULT_HOURS);
    let monitor = app.monitor.clone();
    Ok(Json(blocking(move || monitor.history(Some(id), hours)).await?))
}

// GET /history?hours=
async fn get_history(State(app): State<AppState>, Query(params): Query<HoursParams>) -> ApiResult<Vec<Sample>> {
    let hours = params.hours.unwrap_or(DEFAULT_HOURS);
    let monitor = app.monitor.clone();
    Ok(Json(blocking(move || monitor.history(None, hours)).await?))
}

// GET /alerts?hours=
async fn get_alerts(State(app): State<AppState>, Query(params): Query<HoursParams>) -> Json<Vec<Alert>> {
    Json(app.monitor.recent_alerts(params.hours.unwrap_or(DEFAULT_HOURS)))
}

// POST /samples/drain
async fn drain_samples(State(app): State<AppState>) -> Json<Vec<Sample>> {
    Json(app.monitor.drain_new_samples())
}

fn monitor_view(app: &AppState) -> MonitorView {
    MonitorView {
        state: app.monitor.state(),
        sampler: app.monitor.sampler_name(),
        tick_interval_secs: app.monitor.settings().tick_interval.as_secs(),
        refresh_interval_secs: app.refresh_interval_secs,
        stats: app.monitor.stats(),
    }
}

// GET /monitor
async fn get_monitor(State(app): State<AppState>) -> Json<MonitorView> {
    Json(monitor_view(&app))
}

// POST /monitor/start (409 si aucune cible active)
async fn start_monitor(State(app): State<AppState>) -> ApiResult<MonitorView> {
    app.monitor.start().await?;
    Ok(Json(monitor_view(&app)))
}

// POST /monitor/stop
async fn stop_monitor(State(app): State<AppState>) -> Json<MonitorView> {
    app.monitor.stop().await;
    Json(monitor_view(&app))
}

// POST /monitor/clear
async fn clear_monitor(State(app): State<AppState>) -> StatusCode {
    app.monitor.clear();
    StatusCode::NO_CONTENT
}

// POST /export
async fn export_data(State(app): State<AppState>) -> ApiResult<serde_json::Value> {
    let monitor = app.monitor.clone();
    let dir = app.export_dir.clone();
    let path = blocking(move || monitor.export(&dir)).await?;
    Ok(Json(serde_json::json!({ "path": path })))
}

// GET /interfaces
async fn list_interfaces() -> ApiResult<Vec<LocalInterface>> {
    let interfaces = blocking(|| local_interfaces().map_err(MonitorError::from)).await?;
    Ok(Json(interfaces))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use bandwatch_devkit::TestHarness;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_for(harness: &TestHarness) -> Router {
        build_router(AppState {
            monitor: harness.monitor.clone(),
            health_tracker: HealthTracker::new(),
            export_dir: harness.export_dir.path().to_path_buf(),
            refresh_interval_secs: 3,
        })
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                req = req.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_liveness() {
        let harness = TestHarness::new().unwrap();
        let res = app_for(&harness)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_register_list_and_remove_targets() {
        let harness = TestHarness::new().unwrap();
        let app = app_for(&harness);

        let (status, body) = call(&app, "POST", "/targets", Some(serde_json::json!({"ip": "10.0.0.5", "description": "nas"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ip"], "10.0.0.5");
        assert_eq!(body["added"], true);

        let (_, body) = call(&app, "POST", "/targets", Some(serde_json::json!({"ip": "10.0.0.5"}))).await;
        assert_eq!(body["added"], false);

        let (status, body) = call(&app, "GET", "/targets", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["description"], "nas");

        let (status, body) = call(&app, "DELETE", "/targets/10.0.0.5", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], true);

        let (_, body) = call(&app, "DELETE", "/targets/10.0.0.5", None).await;
        assert_eq!(body["removed"], false);
    }

    #[tokio::test]
    async fn test_registered_address_is_echoed_canonical() {
        let harness = TestHarness::new().unwrap();
        let app = app_for(&harness);

        let (status, body) = call(&app, "POST", "/targets", Some(serde_json::json!({"ip": "0:0:0:0:0:0:0:1"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ip"], "::1");
        assert_eq!(body["added"], true);

        // même cible, autre écriture
        let (_, body) = call(&app, "POST", "/targets", Some(serde_json::json!({"ip": "::1"}))).await;
        assert_eq!(body["added"], false);

        let (status, body) = call(&app, "POST", "/targets", Some(serde_json::json!({"ip": " 10.0.0.1 "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains(" 10.0.0.1 "));
        assert_eq!(harness.monitor.list_targets().len(), 1);

        let (status, body) = call(&app, "DELETE", "/targets/0:0:0:0:0:0:0:1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ip"], "::1");
        assert_eq!(body["removed"], true);
    }

    #[tokio::test]
    async fn test_invalid_target_is_bad_request() {
        let harness = TestHarness::new().unwrap();
        let app = app_for(&harness);

        let (status, body) = call(&app, "POST", "/targets", Some(serde_json::json!({"ip": "999.999.999.999"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("999.999.999.999"));
        assert!(harness.monitor.list_targets().is_empty());

        let (status, _) = call(&app, "GET", "/targets/not-an-ip/aggregates", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_without_targets_conflicts() {
        let harness = TestHarness::new().unwrap();
        let app = app_for(&harness);

        let (status, _) = call(&app, "POST", "/monitor/start", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = call(&app, "GET", "/monitor", None).await;
        assert_eq!(body["state"], "idle");
        assert_eq!(body["refresh_interval_secs"], 3);
    }

    #[tokio::test]
    async fn test_start_stop_roundtrip() {
        let harness = TestHarness::new().unwrap();
        harness.add_targets(&["10.0.0.1"]).unwrap();
        let app = app_for(&harness);

        let (status, body) = call(&app, "POST", "/monitor/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "running");

        harness.wait_for_ticks(2, 2_000).await.unwrap();

        let (_, body) = call(&app, "POST", "/monitor/stop", None).await;
        assert_eq!(body["state"], "idle");

        let (_, drained) = call(&app, "POST", "/samples/drain", None).await;
        assert!(!drained.as_array().unwrap().is_empty());
        let (_, drained) = call(&app, "POST", "/samples/drain", None).await;
        assert!(drained.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_aggregates_history_and_alerts() {
        let harness = TestHarness::new().unwrap();
        harness.add_targets(&["10.0.0.1"]).unwrap();
        harness.sampler.push([(100, 200, 1, 1), (300, 400, 1, 1)]);
        harness.monitor.tick();
        harness.monitor.tick();
        let app = app_for(&harness);

        let (status, body) = call(&app, "GET", "/targets/10.0.0.1/aggregates", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["samples"], 2);
        assert_eq!(body["total_sent"], 400);
        assert_eq!(body["peak_received"], 400);
        assert_eq!(body["total_packets_sent"], 2);
        assert_eq!(body["total_packets_received"], 2);
        assert_eq!(body["peak_packets_sent"], 1);
        assert_eq!(body["peak_packets_received"], 1);

        let (status, _) = call(&app, "GET", "/targets/10.0.0.2/aggregates", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", "/targets/10.0.0.2/history", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "GET", "/targets/nope/history", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, history) = call(&app, "GET", "/targets/10.0.0.1/history?hours=1", None).await;
        assert_eq!(history.as_array().unwrap().len(), 2);
        // plus récent d'abord
        assert_eq!(history[0]["bytes_sent"], 300);

        let (_, all) = call(&app, "GET", "/history", None).await;
        assert_eq!(all.as_array().unwrap().len(), 2);

        let (status, alerts) = call(&app, "GET", "/alerts?hours=24", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(alerts.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pause_unknown_target_is_not_found() {
        let harness = TestHarness::new().unwrap();
        harness.add_targets(&["10.0.0.1"]).unwrap();
        let app = app_for(&harness);

        let (status, body) = call(&app, "POST", "/targets/10.0.0.1/active", Some(serde_json::json!({"active": false}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        assert!(harness.monitor.active_targets().is_empty());

        let (status, _) = call(&app, "POST", "/targets/10.9.9.9/active", Some(serde_json::json!({"active": true}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_clear_and_export() {
        let harness = TestHarness::new().unwrap();
        harness.add_targets(&["10.0.0.1"]).unwrap();
        harness.monitor.tick();
        let app = app_for(&harness);

        let (status, body) = call(&app, "POST", "/export", None).await;
        assert_eq!(status, StatusCode::OK);
        let path = PathBuf::from(body["path"].as_str().unwrap());
        let doc: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(doc["10.0.0.1"]["bandwidth_sent"], serde_json::json!([1000]));

        let (status, _) = call(&app, "POST", "/monitor/clear", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(harness.monitor.latest_aggregates("10.0.0.1".parse().unwrap()).samples, 0);
    }

    #[tokio::test]
    async fn test_system_health() {
        let harness = TestHarness::new().unwrap();
        harness.add_targets(&["10.0.0.1"]).unwrap();
        let app = app_for(&harness);

        let (status, body) = call(&app, "GET", "/system/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["targets_tracked"], 1);
        assert_eq!(body["monitor_state"], "idle");
    }
}
