use std::time::Duration;

use tokio::net::TcpListener;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use mirror_probe::batch::{BatchConfig, BatchScheduler};
use mirror_probe::prober::{ProbeConfig, Prober};
use mirror_probe::server::{router, AppState, ScanPhase, Status};
use mirror_probe::types::{CheckResult, Endpoint, ScanReport, StatusLabel};
use tower::ServiceExt;

fn app(catalog: Vec<Endpoint>) -> Router {
    app_with(ProbeConfig::default(), catalog)
}

fn app_with(config: ProbeConfig, catalog: Vec<Endpoint>) -> Router {
    let prober = Prober::new(config).unwrap();
    let scheduler = BatchScheduler::new(
        prober.clone(),
        BatchConfig {
            max_size: 10,
            max_wait: Duration::from_millis(10),
        },
    );
    router(AppState::new(prober, scheduler, catalog))
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_endpoint_requires_url() {
    let resp = app(vec![])
        .oneshot(json_request("POST", "/api/test", "{}"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v: serde_json::Value = body_json(resp).await;
    assert_eq!(v["error"], "URL is required");
}

#[tokio::test]
async fn test_endpoint_returns_check_result() {
    let resp = app(vec![])
        .oneshot(json_request("POST", "/api/test", r#"{"url": "not a url"}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let r: CheckResult = body_json(resp).await;
    assert_eq!(r.status, StatusLabel::InvalidAddress);
    assert!(!r.reachable);
}

#[tokio::test]
async fn servers_lists_catalog() {
    let resp = app(vec![Endpoint::new("ftp-1", "http://10.0.0.5/")])
        .oneshot(Request::get("/api/servers").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let eps: Vec<Endpoint> = body_json(resp).await;
    assert_eq!(eps, vec![Endpoint::new("ftp-1", "http://10.0.0.5/")]);
}

#[tokio::test]
async fn results_empty_before_any_scan() {
    let resp = app(vec![])
        .oneshot(Request::get("/api/results").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn background_scan_completes() {
    let app = app(vec![]);
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/scan",
            r#"{"addresses": ["bad one", "bad two"]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let s: Status = body_json(resp).await;
    assert_eq!(s.total, 2);
    assert_eq!(s.state, ScanPhase::Running);

    let mut status = s;
    for _ in 0..100 {
        let resp = app
            .clone()
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        status = body_json(resp).await;
        if status.state == ScanPhase::Done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status.state, ScanPhase::Done);
    assert_eq!(status.scanned, 2);
    assert_eq!(status.online, 0);

    let resp = app
        .oneshot(Request::get("/api/results").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let report: ScanReport = body_json(resp).await;
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.offline, 2);
}

#[tokio::test]
async fn conflicting_scan_reports_live_progress() {
    // Silent control port keeps one check in flight for the whole timeout.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    let app = app_with(
        ProbeConfig {
            timeout: Duration::from_secs(2),
            control_port: addr.port(),
            ..ProbeConfig::default()
        },
        vec![],
    );

    let body = format!(r#"{{"addresses": ["not a url", "ftp://{addr}"]}}"#);
    let resp = app
        .clone()
        .oneshot(json_request("POST", "/api/scan", &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    // Wait until the invalid address has been counted.
    let mut status = Status::default();
    for _ in 0..50 {
        let resp = app
            .clone()
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        status = body_json(resp).await;
        if status.scanned == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status.scanned, 1);
    assert_eq!(status.state, ScanPhase::Running);

    let resp = app
        .oneshot(json_request("POST", "/api/scan", r#"{"addresses": ["x"]}"#))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let conflict: Status = body_json(resp).await;
    assert_eq!(conflict.state, ScanPhase::Running);
    assert_eq!(conflict.total, 2);
    assert_eq!(conflict.scanned, 1);
}
