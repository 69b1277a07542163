//! Mapping of flow failures onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::warn;

use verilink_core::FlowError;

/// A [`FlowError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub FlowError);

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        Self(err)
    }
}

/// HTTP status for each failure kind.
pub fn status_for(err: &FlowError) -> StatusCode {
    match err {
        FlowError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        FlowError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        FlowError::NotComplete(_) => StatusCode::CONFLICT,
        FlowError::RemoteSessionTimeout => StatusCode::GATEWAY_TIMEOUT,
        FlowError::UserRefused { .. }
        | FlowError::WrongVerificationCodeSelected
        | FlowError::DocumentOrAccountUnusable
        | FlowError::InteractionNotSupported
        | FlowError::CertificateStrengthMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        FlowError::InvalidOrUnprocessableResponse(_) | FlowError::RemoteProviderError(_) => {
            StatusCode::BAD_GATEWAY
        }
        FlowError::Container(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(error_kind = self.0.kind(), error = %self.0, "Request failed");
        }
        (status, Json(self.0.report())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_and_contract_errors_are_client_errors() {
        assert_eq!(status_for(&FlowError::SessionNotFound("k".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&FlowError::NotComplete("k".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&FlowError::UserRefused {
                interaction: "operation".into()
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&FlowError::RemoteProviderError("down".into())),
            StatusCode::BAD_GATEWAY
        );
    }
}
