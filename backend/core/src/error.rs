use serde::Serialize;
use thiserror::Error;

use crate::types::CertificateLevel;

/// Typed failure of a verification flow.
///
/// Messages are fixed per variant and payload, so repeated reads of a stored
/// failure render identically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("the session timed out before the user completed it")]
    RemoteSessionTimeout,

    #[error("the user refused the request ({interaction})")]
    UserRefused { interaction: String },

    #[error("the user selected the wrong verification code")]
    WrongVerificationCodeSelected,

    #[error("the user's document or account cannot be used for this operation")]
    DocumentOrAccountUnusable,

    #[error("the user's app does not support the required interaction")]
    InteractionNotSupported,

    #[error("certificate level {returned} does not satisfy requested level {requested}")]
    CertificateStrengthMismatch {
        requested: CertificateLevel,
        returned: CertificateLevel,
    },

    #[error("the provider response failed validation: {0}")]
    InvalidOrUnprocessableResponse(String),

    #[error("identity provider error: {0}")]
    RemoteProviderError(String),

    #[error("no session found for key '{0}'")]
    SessionNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session '{0}' has not completed yet")]
    NotComplete(String),

    #[error("document container error: {0}")]
    Container(String),
}

impl FlowError {
    /// Stable machine-readable kind for the web layer.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RemoteSessionTimeout => "REMOTE_SESSION_TIMEOUT",
            Self::UserRefused { .. } => "USER_REFUSED",
            Self::WrongVerificationCodeSelected => "WRONG_VERIFICATION_CODE_SELECTED",
            Self::DocumentOrAccountUnusable => "DOCUMENT_OR_ACCOUNT_UNUSABLE",
            Self::InteractionNotSupported => "INTERACTION_NOT_SUPPORTED",
            Self::CertificateStrengthMismatch { .. } => "CERTIFICATE_STRENGTH_MISMATCH",
            Self::InvalidOrUnprocessableResponse(_) => "INVALID_OR_UNPROCESSABLE_RESPONSE",
            Self::RemoteProviderError(_) => "REMOTE_PROVIDER_ERROR",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::NotComplete(_) => "NOT_COMPLETE",
            Self::Container(_) => "CONTAINER_ERROR",
        }
    }

    /// Whether this is an outcome of the remote operation itself, as opposed
    /// to a lookup miss or a caller contract violation.
    pub fn is_operation_outcome(&self) -> bool {
        !matches!(
            self,
            Self::SessionNotFound(_) | Self::InvalidRequest(_) | Self::NotComplete(_)
        )
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            error_kind: self.kind(),
            error_message: self.to_string(),
        }
    }
}

/// Serializable view of a [`FlowError`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error_kind: &'static str,
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_is_stable_across_clones() {
        let err = FlowError::CertificateStrengthMismatch {
            requested: CertificateLevel::Qualified,
            returned: CertificateLevel::Advanced,
        };
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
        assert_eq!(
            err.to_string(),
            "certificate level ADVANCED does not satisfy requested level QUALIFIED"
        );
    }

    #[test]
    fn lookup_errors_are_not_operation_outcomes() {
        assert!(!FlowError::SessionNotFound("k".into()).is_operation_outcome());
        assert!(FlowError::RemoteSessionTimeout.is_operation_outcome());
    }
}
