use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Opaque key of one browser-visible operation attempt.
pub type SessionKey = String;

/// Maximum display text length for PIN and verification-code-choice interactions.
pub const MAX_SHORT_DISPLAY_TEXT: usize = 60;

/// Maximum display text length for confirmation-message interactions.
pub const MAX_CONFIRMATION_TEXT: usize = 200;

static NATIONAL_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9]{11}|[0-9]{6}-[0-9]{5})$").unwrap());

const SUPPORTED_COUNTRIES: &[&str] = &["EE", "LV", "LT", "BE"];

/// The kind of remote operation a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Authentication,
    CertificateChoice,
    Signature,
}

impl OperationKind {
    /// Short code used inside device links and auth-code payloads.
    pub fn link_code(&self) -> &'static str {
        match self {
            Self::Authentication => "auth",
            Self::CertificateChoice => "cert",
            Self::Signature => "sign",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "AUTHENTICATION"),
            Self::CertificateChoice => write!(f, "CERTIFICATE_CHOICE"),
            Self::Signature => write!(f, "SIGNATURE"),
        }
    }
}

/// Certificate strength, ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificateLevel {
    Advanced,
    Qualified,
    Qscd,
}

impl CertificateLevel {
    /// Whether a certificate of this level satisfies a request for `requested`.
    pub fn satisfies(&self, requested: CertificateLevel) -> bool {
        *self >= requested
    }
}

impl fmt::Display for CertificateLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advanced => write!(f, "ADVANCED"),
            Self::Qualified => write!(f, "QUALIFIED"),
            Self::Qscd => write!(f, "QSCD"),
        }
    }
}

/// How the user is reached on their device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionMode {
    /// A rolling QR code / deep link is shown until the operation completes.
    #[default]
    DeviceLink,
    /// The provider pushes a notification; a static verification code is shown.
    Notification,
}

/// Who the operation is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IdentitySelector {
    /// National identity (country + personal code).
    #[serde(rename_all = "camelCase")]
    Identity {
        country: String,
        national_identity_number: String,
    },
    /// A document number previously issued by the provider.
    #[serde(rename_all = "camelCase")]
    DocumentNumber { document_number: String },
    /// Whoever scans the device link.
    Anonymous,
}

impl IdentitySelector {
    /// Reject malformed selectors before any remote call is made.
    pub fn validate(&self) -> Result<(), FlowError> {
        match self {
            Self::Identity {
                country,
                national_identity_number,
            } => {
                if !SUPPORTED_COUNTRIES.contains(&country.as_str()) {
                    return Err(FlowError::InvalidRequest(format!(
                        "unsupported country '{country}'"
                    )));
                }
                if !NATIONAL_ID_PATTERN.is_match(national_identity_number) {
                    return Err(FlowError::InvalidRequest(
                        "invalid national identity number".into(),
                    ));
                }
                Ok(())
            }
            Self::DocumentNumber { document_number } => {
                if document_number.trim().is_empty() {
                    return Err(FlowError::InvalidRequest("document number is empty".into()));
                }
                Ok(())
            }
            Self::Anonymous => Ok(()),
        }
    }

    /// The ETSI-style semantics identifier, e.g. `PNOEE-30303039914`.
    pub fn semantics_identifier(&self) -> Option<String> {
        match self {
            Self::Identity {
                country,
                national_identity_number,
            } => Some(format!("PNO{country}-{national_identity_number}")),
            _ => None,
        }
    }
}

/// A user-facing interaction the device app performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Interaction {
    DisplayTextAndPin { text: String },
    ConfirmationMessage { text: String },
    VerificationCodeChoice { text: String },
    ConfirmationMessageAndVerificationCodeChoice { text: String },
}

impl Interaction {
    pub fn text(&self) -> &str {
        match self {
            Self::DisplayTextAndPin { text }
            | Self::ConfirmationMessage { text }
            | Self::VerificationCodeChoice { text }
            | Self::ConfirmationMessageAndVerificationCodeChoice { text } => text,
        }
    }

    /// Wire name of the interaction type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::DisplayTextAndPin { .. } => "displayTextAndPIN",
            Self::ConfirmationMessage { .. } => "confirmationMessage",
            Self::VerificationCodeChoice { .. } => "verificationCodeChoice",
            Self::ConfirmationMessageAndVerificationCodeChoice { .. } => {
                "confirmationMessageAndVerificationCodeChoice"
            }
        }
    }

    fn max_text_len(&self) -> usize {
        match self {
            Self::DisplayTextAndPin { .. } | Self::VerificationCodeChoice { .. } => {
                MAX_SHORT_DISPLAY_TEXT
            }
            Self::ConfirmationMessage { .. }
            | Self::ConfirmationMessageAndVerificationCodeChoice { .. } => MAX_CONFIRMATION_TEXT,
        }
    }

    fn requires_notification(&self) -> bool {
        matches!(
            self,
            Self::VerificationCodeChoice { .. }
                | Self::ConfirmationMessageAndVerificationCodeChoice { .. }
        )
    }
}

/// Check an interaction list against the mode it will be used in.
pub fn validate_interactions(
    interactions: &[Interaction],
    mode: InteractionMode,
) -> Result<(), FlowError> {
    if interactions.is_empty() {
        return Err(FlowError::InvalidRequest(
            "at least one interaction is required".into(),
        ));
    }
    for interaction in interactions {
        let len = interaction.text().chars().count();
        if len == 0 || len > interaction.max_text_len() {
            return Err(FlowError::InvalidRequest(format!(
                "{} text must be 1..={} characters",
                interaction.type_name(),
                interaction.max_text_len()
            )));
        }
        if mode == InteractionMode::DeviceLink && interaction.requires_notification() {
            return Err(FlowError::InvalidRequest(format!(
                "{} is only available for notification-based sessions",
                interaction.type_name()
            )));
        }
    }
    Ok(())
}

/// A document uploaded for signing. Content is held in memory only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedDocument {
    pub file_name: String,
    pub content_type: String,
    #[serde(with = "crate::types::base64_bytes")]
    pub content: Vec<u8>,
}

impl fmt::Debug for UploadedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedDocument")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.content.len())
            .finish()
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(d)?;
        STANDARD.decode(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certificate_levels_are_ordered() {
        assert!(CertificateLevel::Qualified.satisfies(CertificateLevel::Advanced));
        assert!(CertificateLevel::Qscd.satisfies(CertificateLevel::Qualified));
        assert!(!CertificateLevel::Advanced.satisfies(CertificateLevel::Qualified));
    }

    #[test]
    fn accepts_both_national_id_formats() {
        for id in ["30303039914", "010101-10006"] {
            let selector = IdentitySelector::Identity {
                country: "EE".into(),
                national_identity_number: id.into(),
            };
            assert!(selector.validate().is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn rejects_unknown_country() {
        let selector = IdentitySelector::Identity {
            country: "FI".into(),
            national_identity_number: "30303039914".into(),
        };
        assert!(matches!(selector.validate(), Err(FlowError::InvalidRequest(_))));
    }

    #[test]
    fn device_link_rejects_vc_choice() {
        let interactions = vec![Interaction::VerificationCodeChoice {
            text: "Log in?".into(),
        }];
        assert!(validate_interactions(&interactions, InteractionMode::DeviceLink).is_err());
        assert!(validate_interactions(&interactions, InteractionMode::Notification).is_ok());
    }

    #[test]
    fn rejects_overlong_pin_text() {
        let interactions = vec![Interaction::DisplayTextAndPin {
            text: "x".repeat(MAX_SHORT_DISPLAY_TEXT + 1),
        }];
        assert!(validate_interactions(&interactions, InteractionMode::DeviceLink).is_err());
    }

    #[test]
    fn selector_deserializes_from_camel_case() {
        let raw = r#"{"type":"identity","country":"LV","nationalIdentityNumber":"010101-10006"}"#;
        let selector: IdentitySelector = serde_json::from_str(raw).unwrap();
        assert_eq!(
            selector.semantics_identifier().as_deref(),
            Some("PNOLV-010101-10006")
        );
    }
}
