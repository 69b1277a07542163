//! Raw session states reported by the remote provider.

use serde::{Deserialize, Serialize};

use crate::types::CertificateLevel;

/// A poll response from the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    /// The user has not finished yet.
    Running,
    /// The session reached its end state.
    Complete(SessionResult),
}

impl TerminalStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// End-result code of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndResult {
    Ok,
    UserRefused,
    UserRefusedCertChoice,
    #[serde(rename = "USER_REFUSED_DISPLAYTEXTANDPIN")]
    UserRefusedDisplayTextAndPin,
    #[serde(rename = "USER_REFUSED_VC_CHOICE")]
    UserRefusedVcChoice,
    #[serde(rename = "USER_REFUSED_CONFIRMATIONMESSAGE")]
    UserRefusedConfirmationMessage,
    #[serde(rename = "USER_REFUSED_CONFIRMATIONMESSAGE_WITH_VC_CHOICE")]
    UserRefusedConfirmationMessageWithVcChoice,
    #[serde(rename = "WRONG_VC")]
    WrongVerificationCode,
    Timeout,
    DocumentUnusable,
    RequiredInteractionNotSupportedByApp,
    ExpectedLinkedSession,
    ServerError,
    ProtocolFailure,
    /// A code this build does not know about.
    #[serde(untagged)]
    Unknown(String),
}

/// Certificate returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePayload {
    /// Base64 DER encoding.
    pub value: String,
    pub certificate_level: CertificateLevel,
    /// Subject distinguished name as reported alongside the certificate.
    pub subject: String,
}

/// Signature (or authentication proof) returned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePayload {
    /// Base64 signature value.
    pub value: String,
    pub algorithm: String,
}

/// Payload of a COMPLETE status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    pub end_result: EndResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificatePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignaturePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_flow_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_ip_address: Option<String>,
}

impl SessionResult {
    /// A bare result with the given end code and no payload.
    pub fn with_end_result(end_result: EndResult) -> Self {
        Self {
            end_result,
            document_number: None,
            certificate: None,
            signature: None,
            interaction_flow_used: None,
            device_ip_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_status_from_wire() {
        let raw = r#"{
            "state": "COMPLETE",
            "endResult": "WRONG_VC",
            "documentNumber": "PNOEE-30303039914-MOCK-Q"
        }"#;
        let status: TerminalStatus = serde_json::from_str(raw).unwrap();
        match status {
            TerminalStatus::Complete(result) => {
                assert_eq!(result.end_result, EndResult::WrongVerificationCode);
                assert_eq!(
                    result.document_number.as_deref(),
                    Some("PNOEE-30303039914-MOCK-Q")
                );
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn unknown_end_result_is_preserved() {
        let code: EndResult = serde_json::from_str(r#""SOMETHING_NEW""#).unwrap();
        assert_eq!(code, EndResult::Unknown("SOMETHING_NEW".into()));
    }

    #[test]
    fn running_state_has_no_payload() {
        let status: TerminalStatus = serde_json::from_str(r#"{"state":"RUNNING"}"#).unwrap();
        assert!(!status.is_complete());
    }
}
