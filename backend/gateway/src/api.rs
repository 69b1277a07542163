//! Flow endpoints under `/api/v1`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use verilink_challenge::RenderedChallenge;
use verilink_core::{
    CertificateLevel, DomainResult, FlowError, IdentitySelector, Interaction, InteractionMode,
    UploadedDocument,
};
use verilink_flows::{ChallengeView, StartRequest, StartedFlow};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Body of every start endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default = "anonymous")]
    pub selector: IdentitySelector,
    #[serde(default)]
    pub mode: InteractionMode,
    #[serde(default)]
    pub interactions: Option<Vec<Interaction>>,
    #[serde(default)]
    pub certificate_level: Option<CertificateLevel>,
    /// Required by `/signature` only.
    #[serde(default)]
    pub document: Option<UploadedDocument>,
}

fn anonymous() -> IdentitySelector {
    IdentitySelector::Anonymous
}

impl StartBody {
    fn into_parts(self) -> (StartRequest, Option<UploadedDocument>) {
        let mut request = StartRequest::new(self.selector).with_mode(self.mode);
        if let Some(key) = self.session_key {
            request = request.with_key(key);
        }
        if let Some(interactions) = self.interactions {
            request = request.with_interactions(interactions);
        }
        if let Some(level) = self.certificate_level {
            request = request.with_certificate_level(level);
        }
        (request, self.document)
    }
}

/// Response of `GET /sessions/:key/status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub done: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<RenderedChallenge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

impl StatusResponse {
    fn done() -> Self {
        Self {
            done: true,
            challenge: None,
            verification_code: None,
        }
    }

    fn pending(view: ChallengeView) -> Self {
        let (challenge, verification_code) = match view {
            ChallengeView::DeviceLink(rendered) => (Some(rendered), None),
            ChallengeView::VerificationCode(code) => (None, Some(code)),
            ChallengeView::AwaitingDevice => (None, None),
        };
        Self {
            done: false,
            challenge,
            verification_code,
        }
    }
}

/// `POST /api/v1/authentication`
pub async fn start_authentication(
    State(state): State<GatewayState>,
    Json(body): Json<StartBody>,
) -> Result<Json<StartedFlow>, ApiError> {
    let (request, _) = body.into_parts();
    Ok(Json(state.orchestrator.start_authentication(request).await?))
}

/// `POST /api/v1/certificate-choice`
pub async fn start_certificate_choice(
    State(state): State<GatewayState>,
    Json(body): Json<StartBody>,
) -> Result<Json<StartedFlow>, ApiError> {
    let (request, _) = body.into_parts();
    Ok(Json(state.orchestrator.start_certificate_choice(request).await?))
}

/// `POST /api/v1/signature`
pub async fn start_signature(
    State(state): State<GatewayState>,
    Json(body): Json<StartBody>,
) -> Result<Json<StartedFlow>, ApiError> {
    let (request, document) = body.into_parts();
    let document =
        document.ok_or_else(|| FlowError::InvalidRequest("a document is required".into()))?;
    Ok(Json(
        state.orchestrator.start_signature(request, document).await?,
    ))
}

/// `GET /api/v1/sessions/:key/status`
pub async fn session_status(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    if state.orchestrator.check_status(&key).await? {
        return Ok(Json(StatusResponse::done()));
    }
    match state.orchestrator.render_challenge(&key).await {
        Ok(view) => Ok(Json(StatusResponse::pending(view))),
        // Completed between the two calls.
        Err(FlowError::InvalidRequest(_)) => Ok(Json(StatusResponse::done())),
        Err(e) => Err(e.into()),
    }
}

/// `GET /api/v1/sessions/:key/result`
pub async fn session_result(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> Result<Json<DomainResult>, ApiError> {
    let result = state.orchestrator.consume(&key).await?;
    debug!(session_key = %key, kind = %result.kind(), "Result released");
    Ok(Json(result))
}

/// `DELETE /api/v1/sessions/:key`
pub async fn cancel_session(
    State(state): State<GatewayState>,
    Path(key): Path<String>,
) -> StatusCode {
    state.orchestrator.cancel(&key).await;
    StatusCode::NO_CONTENT
}
