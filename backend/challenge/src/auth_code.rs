//! Keyed auth-code derivation for rolling device links.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use verilink_core::{Interaction, OperationKind};

use crate::error::ChallengeError;

type HmacSha256 = Hmac<Sha256>;

const SCHEME: &str = "smart-id";

/// Digest of the interaction set negotiated at session start.
pub fn interactions_digest(interactions: &[Interaction]) -> Result<String, ChallengeError> {
    // serde_json is stable for these tagged enums: field order follows declaration.
    let encoded = serde_json::to_vec(interactions)
        .map_err(|e| ChallengeError::InteractionEncoding(e.to_string()))?;
    Ok(STANDARD.encode(Sha256::digest(encoded)))
}

/// `base64url(HMAC-SHA256(secret, scheme|kind|elapsed|interactions))`.
///
/// `elapsed_seconds` must already be aligned to its bucket.
pub fn auth_code(
    session_secret: &str,
    kind: OperationKind,
    elapsed_seconds: u64,
    interactions: &[Interaction],
) -> Result<String, ChallengeError> {
    let key = STANDARD
        .decode(session_secret.as_bytes())
        .map_err(|e| ChallengeError::InvalidSecret(e.to_string()))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| ChallengeError::InvalidSecret(e.to_string()))?;

    let payload = format!(
        "{SCHEME}|{}|{elapsed_seconds}|{}",
        kind.link_code(),
        interactions_digest(interactions)?
    );
    mac.update(payload.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHMtMDEyMzQ1Njc4OQ==";

    fn pin() -> Vec<Interaction> {
        vec![Interaction::DisplayTextAndPin { text: "Log in?".into() }]
    }

    #[test]
    fn same_inputs_same_code() {
        let a = auth_code(SECRET, OperationKind::Authentication, 3, &pin()).unwrap();
        let b = auth_code(SECRET, OperationKind::Authentication, 3, &pin()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn every_input_changes_the_code() {
        let base = auth_code(SECRET, OperationKind::Authentication, 3, &pin()).unwrap();
        assert_ne!(base, auth_code(SECRET, OperationKind::Authentication, 4, &pin()).unwrap());
        assert_ne!(base, auth_code(SECRET, OperationKind::Signature, 3, &pin()).unwrap());
        let other = vec![Interaction::DisplayTextAndPin { text: "Sign?".into() }];
        assert_ne!(base, auth_code(SECRET, OperationKind::Authentication, 3, &other).unwrap());
        assert_ne!(base, auth_code("b3RoZXI=", OperationKind::Authentication, 3, &pin()).unwrap());
    }

    #[test]
    fn rejects_non_base64_secret() {
        let err = auth_code("not base64!", OperationKind::Authentication, 0, &pin()).unwrap_err();
        assert!(matches!(err, ChallengeError::InvalidSecret(_)));
    }

    #[test]
    fn digest_depends_on_interaction_order() {
        let both = vec![
            Interaction::DisplayTextAndPin { text: "Log in?".into() },
            Interaction::ConfirmationMessage { text: "Confirm?".into() },
        ];
        let reversed: Vec<_> = both.iter().rev().cloned().collect();
        let digest = interactions_digest(&both).unwrap();
        assert_eq!(digest, interactions_digest(&both).unwrap());
        assert_ne!(digest, interactions_digest(&reversed).unwrap());
        assert_ne!(digest, interactions_digest(&[]).unwrap());
    }

    #[test]
    fn code_is_url_safe() {
        let code = auth_code(SECRET, OperationKind::CertificateChoice, 17, &pin()).unwrap();
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
