//! Main HTTP gateway server and routing.

use anyhow::Result;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{info, instrument};

use verilink_flows::FlowOrchestrator;

use crate::{api, health};

/// Application state shared across routes.
#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<FlowOrchestrator>,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(orchestrator: Arc<FlowOrchestrator>) -> Self {
        Self {
            orchestrator,
            started_at: Instant::now(),
        }
    }
}

/// All gateway routes, bound to `state`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/api/v1/authentication", post(api::start_authentication))
        .route("/api/v1/certificate-choice", post(api::start_certificate_choice))
        .route("/api/v1/signature", post(api::start_signature))
        .route("/api/v1/sessions/:key/status", get(api::session_status))
        .route("/api/v1/sessions/:key/result", get(api::session_result))
        .route("/api/v1/sessions/:key", delete(api::cancel_session))
        .route("/api/health", get(health::get_health))
        .with_state(state)
}

/// Serve `app` on `addr` until `shutdown` resolves.
#[instrument(skip(app, shutdown))]
pub async fn start_server<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(&addr).await?;
    info!("Gateway HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::path::Path;
    use std::time::Duration;
    use tower::ServiceExt;

    use verilink_challenge::{ChallengeRenderer, RendererConfig};
    use verilink_core::EndResult;
    use verilink_flows::FlowSettings;
    use verilink_sessions::{PollerConfig, WorkerPool};
    use verilink_simulator::{DigestContainerService, SimulatedProvider, SimulatorConfig};

    fn app(config: SimulatorConfig, output: &Path) -> Router {
        let renderer = ChallengeRenderer::new(RendererConfig {
            qr_module_px: 1,
            ..Default::default()
        })
        .unwrap();
        let orchestrator = FlowOrchestrator::new(
            Arc::new(SimulatedProvider::new(config)),
            Arc::new(DigestContainerService::new(output)),
            WorkerPool::new(4),
            PollerConfig {
                interval: Duration::from_millis(10),
                timeout: Duration::from_secs(5),
                ..Default::default()
            },
            renderer,
            FlowSettings::default(),
        );
        router(GatewayState::new(Arc::new(orchestrator)))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn wait_done(app: &Router, key: &str) {
        let uri = format!("/api/v1/sessions/{key}/status");
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let (status, body) = send(app, Method::GET, &uri, None).await;
                assert_eq!(status, StatusCode::OK);
                if body["done"] == true {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn authentication_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(SimulatorConfig::default(), dir.path());

        let (status, started) = send(
            &app,
            Method::POST,
            "/api/v1/authentication",
            Some(json!({ "sessionKey": "browser-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(started["sessionKey"], "browser-1");

        wait_done(&app, "browser-1").await;

        let (status, result) = send(&app, Method::GET, "/api/v1/sessions/browser-1/result", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["type"], "authenticated");
        assert_eq!(result["identity"]["identityCode"], "30303039914");

        let (status, body) = send(&app, Method::GET, "/api/v1/sessions/browser-1/result", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errorKind"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn pending_device_link_status_carries_challenge() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(SimulatorConfig::default().with_never_complete(), dir.path());

        let (_, started) = send(&app, Method::POST, "/api/v1/authentication", Some(json!({}))).await;
        let key = started["sessionKey"].as_str().unwrap().to_string();

        let (status, body) =
            send(&app, Method::GET, &format!("/api/v1/sessions/{key}/status"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["done"], false);
        assert!(body["deepLink"].as_str().unwrap().contains("authCode="));
        assert!(body["qrCode"].as_str().unwrap().starts_with("data:image/png;base64,"));

        let (status, body) =
            send(&app, Method::GET, &format!("/api/v1/sessions/{key}/result"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["errorKind"], "NOT_COMPLETE");
    }

    #[tokio::test]
    async fn notification_status_carries_verification_code() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(SimulatorConfig::default().with_never_complete(), dir.path());

        let (_, started) = send(
            &app,
            Method::POST,
            "/api/v1/authentication",
            Some(json!({
                "mode": "notification",
                "selector": {
                    "type": "identity",
                    "country": "EE",
                    "nationalIdentityNumber": "30303039914"
                }
            })),
        )
        .await;
        let key = started["sessionKey"].as_str().unwrap();
        let code = started["verificationCode"].as_str().unwrap();
        assert_eq!(code.len(), 4);

        let (_, body) = send(&app, Method::GET, &format!("/api/v1/sessions/{key}/status"), None).await;
        assert_eq!(body["done"], false);
        assert_eq!(body["verificationCode"], code);
        assert!(body.get("deepLink").is_none());
    }

    #[tokio::test]
    async fn refusal_maps_to_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(
            SimulatorConfig::default().with_end_result(EndResult::UserRefused),
            dir.path(),
        );

        send(&app, Method::POST, "/api/v1/authentication", Some(json!({ "sessionKey": "k" }))).await;
        wait_done(&app, "k").await;

        let (status, body) = send(&app, Method::GET, "/api/v1/sessions/k/result", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errorKind"], "USER_REFUSED");
    }

    #[tokio::test]
    async fn invalid_selector_and_missing_document_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(SimulatorConfig::default(), dir.path());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/certificate-choice",
            Some(json!({ "selector": { "type": "identity", "country": "XX", "nationalIdentityNumber": "1" } })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errorKind"], "INVALID_REQUEST");

        let (status, _) = send(&app, Method::POST, "/api/v1/signature", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signature_writes_container() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(SimulatorConfig::default(), dir.path());

        let (status, started) = send(
            &app,
            Method::POST,
            "/api/v1/signature",
            Some(json!({
                "sessionKey": "sig",
                "document": {
                    "fileName": "contract.txt",
                    "contentType": "text/plain",
                    "content": "aGVsbG8gd29ybGQ="
                }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{started}");

        wait_done(&app, "sig").await;
        let (status, result) = send(&app, Method::GET, "/api/v1/sessions/sig/result", None).await;
        assert_eq!(status, StatusCode::OK, "{result}");
        assert_eq!(result["type"], "signed");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(SimulatorConfig::default().with_never_complete(), dir.path());

        send(&app, Method::POST, "/api/v1/authentication", Some(json!({ "sessionKey": "gone" }))).await;
        let (status, _) = send(&app, Method::DELETE, "/api/v1/sessions/gone", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, "/api/v1/sessions/gone", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&app, Method::GET, "/api/v1/sessions/gone/status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(SimulatorConfig::default().with_never_complete(), dir.path());
        send(&app, Method::POST, "/api/v1/authentication", Some(json!({}))).await;

        let (status, body) = send(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["activeSessions"], 1);
        assert_eq!(body["provider"], "simulator");
    }
}
