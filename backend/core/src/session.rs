//! Local bookkeeping for one user-visible operation attempt.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::status::CertificatePayload;
use crate::traits::{ParsedIdentity, PreparedSignature, SignedContainer};
use crate::types::{
    CertificateLevel, IdentitySelector, Interaction, InteractionMode, OperationKind, SessionKey,
    UploadedDocument,
};

/// Which remote session a signature flow is currently waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningPhase {
    /// Waiting for the user to pick a signing certificate.
    CertificateChoice { document: UploadedDocument },
    /// Waiting for the signature over the prepared digest.
    Signing { prepared: PreparedSignature },
}

/// One browser-visible operation attempt.
#[derive(Clone)]
pub struct LocalSession {
    pub key: SessionKey,
    pub kind: OperationKind,
    pub mode: InteractionMode,
    pub selector: IdentitySelector,
    pub remote_session_id: String,
    pub session_token: String,
    pub session_secret: String,
    /// Random challenge (authentication) or digest (signature) bound to this attempt.
    pub nonce: String,
    pub verification_code: Option<String>,
    pub interactions: Vec<Interaction>,
    pub requested_level: CertificateLevel,
    /// Monotonic instant the remote operation was accepted.
    pub accepted_at: Instant,
    pub accepted_at_utc: DateTime<Utc>,
    pub signing_phase: Option<SigningPhase>,
    pub outcome: Option<Result<DomainResult, FlowError>>,
}

impl LocalSession {
    /// Time since the remote side accepted the operation, measured now.
    pub fn elapsed(&self) -> Duration {
        self.accepted_at.elapsed()
    }

    pub fn is_complete(&self) -> bool {
        self.outcome.is_some()
    }
}

impl fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSession")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .field("remote_session_id", &self.remote_session_id)
            .field("requested_level", &self.requested_level)
            .field("accepted_at_utc", &self.accepted_at_utc)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

/// An authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatedIdentity {
    pub identity: ParsedIdentity,
    pub document_number: Option<String>,
}

/// A certificate picked by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChosenCertificate {
    pub document_number: String,
    pub certificate: CertificatePayload,
}

/// A finished signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSignature {
    pub document_number: Option<String>,
    pub signature_value: String,
    pub algorithm: String,
    pub signer: String,
    pub container: SignedContainer,
}

/// The validated outcome released to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DomainResult {
    Authenticated(AuthenticatedIdentity),
    CertificateChosen(ChosenCertificate),
    Signed(CompletedSignature),
}

impl DomainResult {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Authenticated(_) => OperationKind::Authentication,
            Self::CertificateChosen(_) => OperationKind::CertificateChoice,
            Self::Signed(_) => OperationKind::Signature,
        }
    }
}
