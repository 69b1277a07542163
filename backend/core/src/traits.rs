use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::{CertificatePayload, SessionResult, SignaturePayload, TerminalStatus};
use crate::types::{
    CertificateLevel, IdentitySelector, Interaction, InteractionMode, OperationKind,
    UploadedDocument,
};

/// Errors raised by an identity provider client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network or 5xx-equivalent failure; the call may be retried.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider rejected the request; retrying will not help.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The remote session is unknown to the provider.
    #[error("remote session '{0}' not found")]
    SessionNotFound(String),

    /// Returned claims did not verify.
    #[error("claims validation failed: {0}")]
    InvalidClaims(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Everything the provider needs to open a remote session.
#[derive(Debug, Clone)]
pub struct InitiateRequest {
    pub kind: OperationKind,
    pub mode: InteractionMode,
    pub selector: IdentitySelector,
    pub certificate_level: CertificateLevel,
    pub interactions: Vec<Interaction>,
    /// Random challenge for authentication, digest to sign for signatures.
    pub nonce: String,
}

/// Provider acknowledgement of a new remote session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedSession {
    pub remote_session_id: String,
    /// Public token embedded in device links.
    pub session_token: String,
    /// Base64 secret used to key rolling auth codes.
    pub session_secret: String,
    /// Present for notification-based sessions that return one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

/// Identity claims extracted from a verified authentication certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIdentity {
    pub given_name: String,
    pub surname: String,
    pub identity_code: String,
    pub country: String,
    pub certificate_level: CertificateLevel,
}

/// Client for the remote identity provider.
///
/// Implementations wrap the provider SDK; this crate only depends on the
/// interface.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Open a remote session.
    async fn initiate(&self, request: &InitiateRequest) -> Result<InitiatedSession, ProviderError>;

    /// Fetch the current status of a remote session. May long-poll.
    async fn fetch_status(&self, remote_session_id: &str)
        -> Result<TerminalStatus, ProviderError>;

    /// Verify the cryptographic proof in an authentication result against
    /// the nonce it was requested with.
    fn validate_claims(
        &self,
        result: &SessionResult,
        requested_level: CertificateLevel,
        nonce: &str,
    ) -> Result<ParsedIdentity, ProviderError>;

    /// Verify a signature result against the digest that was sent for signing.
    fn verify_signature(&self, result: &SessionResult, digest: &str) -> Result<(), ProviderError>;
}

/// Errors raised by the document container SDK.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("unsupported document: {0}")]
    Unsupported(String),

    #[error("failed to write container: {0}")]
    Io(String),

    #[error("signature value rejected: {0}")]
    InvalidSignature(String),
}

/// A container awaiting its signature value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSignature {
    /// Base64 digest the user will sign.
    pub digest: String,
    pub digest_algorithm: String,
    pub document: UploadedDocument,
    pub certificate: CertificatePayload,
}

/// A finalized, persisted signature container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedContainer {
    pub location: String,
    pub signed_at: DateTime<Utc>,
}

/// Builds to-be-signed digests and finalizes signature containers.
#[async_trait]
pub trait ContainerService: Send + Sync {
    fn prepare(
        &self,
        document: &UploadedDocument,
        certificate: &CertificatePayload,
    ) -> Result<PreparedSignature, ContainerError>;

    async fn finalize(
        &self,
        prepared: &PreparedSignature,
        signature: &SignaturePayload,
    ) -> Result<SignedContainer, ContainerError>;
}
