use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    batch::{self, BatchScheduler, ScanProgress},
    catalog,
    prober::Prober,
    types::{Endpoint, ScanReport},
};

#[derive(Clone)]
pub struct AppState {
    prober: Prober,
    scheduler: BatchScheduler,
    catalog: Arc<Vec<Endpoint>>,
    inner: Arc<RwLock<ScanState>>,
}

#[derive(Debug, Default)]
struct ScanState {
    status: Status,
    report: Option<ScanReport>,
    progress: Option<ScanProgress>,
}

impl ScanState {
    /// Stored status with the counters of a running scan merged in.
    fn live_status(&self) -> Status {
        let mut out = self.status.clone();
        if let Some(p) = self.progress.as_ref() {
            out.scanned = p.done.load(Ordering::Relaxed);
            out.online = p.online.load(Ordering::Relaxed);
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Status {
    pub total: u64,
    pub scanned: u64,
    pub online: u64,
    pub state: ScanPhase,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    #[default]
    Idle,
    Running,
    Done,
}

#[derive(Debug, Deserialize)]
pub struct TestRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ScanRequest {
    /// Ad-hoc addresses; empty means scan the loaded catalog.
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl AppState {
    pub fn new(prober: Prober, scheduler: BatchScheduler, catalog: Vec<Endpoint>) -> Self {
        Self {
            prober,
            scheduler,
            catalog: Arc::new(catalog),
            inner: Arc::new(RwLock::new(ScanState::default())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/test", post(post_test))
        .route("/servers", get(get_servers))
        .route("/scan", post(post_scan))
        .route("/status", get(get_status))
        .route("/results", get(get_results))
        .with_state(state);

    Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("serving API on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn post_test(State(app): State<AppState>, Json(req): Json<TestRequest>) -> impl IntoResponse {
    let Some(url) = req.url.filter(|u| !u.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "URL is required" }))).into_response();
    };
    let result = app.prober.probe(&url).await;
    (StatusCode::OK, Json(result)).into_response()
}

async fn get_servers(State(app): State<AppState>) -> impl IntoResponse {
    Json(app.catalog.as_ref().clone())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    (StatusCode::OK, Json(s.live_status()))
}

async fn get_results(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(report) = s.report.as_ref() {
        (StatusCode::OK, Json(report.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn post_scan(State(app): State<AppState>, body: Option<Json<ScanRequest>>) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let endpoints = if req.addresses.is_empty() {
        app.catalog.as_ref().clone()
    } else {
        catalog::endpoints_from_addresses(&req.addresses)
    };
    let total = endpoints.len() as u64;

    let progress = ScanProgress::new();
    {
        let mut s = app.inner.write().await;
        if s.status.state == ScanPhase::Running {
            return (StatusCode::CONFLICT, Json(s.live_status())).into_response();
        }
        s.status = Status { total, scanned: 0, online: 0, state: ScanPhase::Running };
        s.report = None;
        s.progress = Some(progress.clone());
    }

    let app2 = app.clone();
    tokio::spawn(async move {
        let res = batch::scan_endpoints(&app2.scheduler, &endpoints, progress).await;

        let mut s = app2.inner.write().await;
        s.progress = None;
        match res {
            Ok(report) => {
                s.status.scanned = report.done;
                s.status.online = report.online;
                s.status.state = ScanPhase::Done;
                s.report = Some(report);
            }
            Err(e) => {
                s.status.state = ScanPhase::Idle;
                error!("scan error: {e:#}");
            }
        }
    });

    let status = Status { total, scanned: 0, online: 0, state: ScanPhase::Running };
    (StatusCode::ACCEPTED, Json(status)).into_response()
}
