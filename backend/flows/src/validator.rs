//! Result validation.
//!
//! Checks run in a fixed order: end-result code, certificate strength, then
//! the provider's cryptographic check against the requested challenge. A
//! result is released only if every check passes.

use std::sync::Arc;

use tracing::warn;

use verilink_core::{
    AuthenticatedIdentity, CertificateLevel, CertificatePayload, ChosenCertificate, EndResult,
    FlowError, IdentityProvider, SessionResult, SignaturePayload,
};

/// Map a provider end-result code to `Ok` or its typed failure.
pub fn check_end_result(end_result: &EndResult) -> Result<(), FlowError> {
    let refused = |interaction: &str| FlowError::UserRefused {
        interaction: interaction.to_string(),
    };
    match end_result {
        EndResult::Ok => Ok(()),
        EndResult::UserRefused => Err(refused("operation")),
        EndResult::UserRefusedCertChoice => Err(refused("certificate choice")),
        EndResult::UserRefusedDisplayTextAndPin => Err(refused("displayTextAndPIN")),
        EndResult::UserRefusedVcChoice => Err(refused("verificationCodeChoice")),
        EndResult::UserRefusedConfirmationMessage => Err(refused("confirmationMessage")),
        EndResult::UserRefusedConfirmationMessageWithVcChoice => {
            Err(refused("confirmationMessageAndVerificationCodeChoice"))
        }
        EndResult::WrongVerificationCode => Err(FlowError::WrongVerificationCodeSelected),
        EndResult::Timeout => Err(FlowError::RemoteSessionTimeout),
        EndResult::DocumentUnusable => Err(FlowError::DocumentOrAccountUnusable),
        EndResult::RequiredInteractionNotSupportedByApp => Err(FlowError::InteractionNotSupported),
        EndResult::ExpectedLinkedSession => Err(FlowError::RemoteProviderError(
            "provider expected a linked session".into(),
        )),
        EndResult::ServerError => Err(FlowError::RemoteProviderError(
            "provider reported a server error".into(),
        )),
        EndResult::ProtocolFailure => Err(FlowError::RemoteProviderError(
            "provider reported a protocol failure".into(),
        )),
        EndResult::Unknown(code) => Err(FlowError::InvalidOrUnprocessableResponse(format!(
            "unknown end result '{code}'"
        ))),
    }
}

fn certificate_at_level(
    result: &SessionResult,
    requested: CertificateLevel,
) -> Result<&CertificatePayload, FlowError> {
    let certificate = result.certificate.as_ref().ok_or_else(|| {
        FlowError::InvalidOrUnprocessableResponse("certificate missing from response".into())
    })?;
    if !certificate.certificate_level.satisfies(requested) {
        return Err(FlowError::CertificateStrengthMismatch {
            requested,
            returned: certificate.certificate_level,
        });
    }
    Ok(certificate)
}

fn document_number(result: &SessionResult) -> Result<String, FlowError> {
    result
        .document_number
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            FlowError::InvalidOrUnprocessableResponse("document number missing from response".into())
        })
}

/// Validates completed session results against what was requested.
#[derive(Clone)]
pub struct ResultValidator {
    provider: Arc<dyn IdentityProvider>,
}

impl ResultValidator {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    pub fn authentication(
        &self,
        result: &SessionResult,
        requested: CertificateLevel,
        nonce: &str,
    ) -> Result<AuthenticatedIdentity, FlowError> {
        check_end_result(&result.end_result)?;
        certificate_at_level(result, requested)?;
        let identity = self
            .provider
            .validate_claims(result, requested, nonce)
            .map_err(|e| {
                warn!(error = %e, "Authentication claims rejected");
                FlowError::InvalidOrUnprocessableResponse(e.to_string())
            })?;
        Ok(AuthenticatedIdentity {
            identity,
            document_number: result.document_number.clone(),
        })
    }

    pub fn certificate_choice(
        &self,
        result: &SessionResult,
        requested: CertificateLevel,
    ) -> Result<ChosenCertificate, FlowError> {
        check_end_result(&result.end_result)?;
        let certificate = certificate_at_level(result, requested)?.clone();
        Ok(ChosenCertificate {
            document_number: document_number(result)?,
            certificate,
        })
    }

    /// Returns the verified signature value.
    pub fn signature(
        &self,
        result: &SessionResult,
        requested: CertificateLevel,
        digest: &str,
    ) -> Result<SignaturePayload, FlowError> {
        check_end_result(&result.end_result)?;
        certificate_at_level(result, requested)?;
        let signature = result.signature.clone().ok_or_else(|| {
            FlowError::InvalidOrUnprocessableResponse("signature missing from response".into())
        })?;
        self.provider.verify_signature(result, digest).map_err(|e| {
            warn!(error = %e, "Signature rejected");
            FlowError::InvalidOrUnprocessableResponse(e.to_string())
        })?;
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verilink_core::{
        IdentitySelector, InitiateRequest, Interaction, InteractionMode, OperationKind,
        TerminalStatus,
    };
    use verilink_simulator::{SimulatedProvider, SimulatorConfig};

    async fn complete(
        provider: &SimulatedProvider,
        kind: OperationKind,
        nonce: &str,
    ) -> SessionResult {
        let request = InitiateRequest {
            kind,
            mode: InteractionMode::DeviceLink,
            selector: IdentitySelector::Anonymous,
            certificate_level: CertificateLevel::Qualified,
            interactions: vec![Interaction::DisplayTextAndPin { text: "Log in?".into() }],
            nonce: nonce.into(),
        };
        let session = provider.initiate(&request).await.unwrap();
        match provider.fetch_status(&session.remote_session_id).await.unwrap() {
            TerminalStatus::Complete(result) => result,
            TerminalStatus::Running => panic!("simulator should complete immediately"),
        }
    }

    #[test]
    fn refusals_name_the_interaction() {
        let err = check_end_result(&EndResult::UserRefusedCertChoice).unwrap_err();
        assert_eq!(
            err,
            FlowError::UserRefused {
                interaction: "certificate choice".into()
            }
        );
        assert_eq!(
            check_end_result(&EndResult::WrongVerificationCode).unwrap_err(),
            FlowError::WrongVerificationCodeSelected
        );
        assert_eq!(
            check_end_result(&EndResult::Timeout).unwrap_err(),
            FlowError::RemoteSessionTimeout
        );
        assert!(matches!(
            check_end_result(&EndResult::Unknown("NEW".into())).unwrap_err(),
            FlowError::InvalidOrUnprocessableResponse(_)
        ));
    }

    #[tokio::test]
    async fn weaker_certificate_is_rejected_before_claims() {
        let provider = Arc::new(SimulatedProvider::new(
            SimulatorConfig::default().with_certificate_level(CertificateLevel::Advanced),
        ));
        let result = complete(&provider, OperationKind::Authentication, "bm9uY2U=").await;
        let validator = ResultValidator::new(provider);

        assert_eq!(
            validator
                .authentication(&result, CertificateLevel::Qualified, "bm9uY2U=")
                .unwrap_err(),
            FlowError::CertificateStrengthMismatch {
                requested: CertificateLevel::Qualified,
                returned: CertificateLevel::Advanced,
            }
        );
        assert!(validator
            .authentication(&result, CertificateLevel::Advanced, "bm9uY2U=")
            .is_ok());
    }

    #[tokio::test]
    async fn claims_must_match_the_original_nonce() {
        let provider = Arc::new(SimulatedProvider::default());
        let result = complete(&provider, OperationKind::Authentication, "b3JpZ2luYWw=").await;
        let validator = ResultValidator::new(provider);

        let identity = validator
            .authentication(&result, CertificateLevel::Qualified, "b3JpZ2luYWw=")
            .unwrap();
        assert_eq!(identity.identity.identity_code, "30303039914");

        assert!(matches!(
            validator.authentication(&result, CertificateLevel::Qualified, "c3dhcHBlZA=="),
            Err(FlowError::InvalidOrUnprocessableResponse(_))
        ));
    }

    #[tokio::test]
    async fn certificate_choice_requires_document_number() {
        let provider = Arc::new(SimulatedProvider::default());
        let mut result = complete(&provider, OperationKind::CertificateChoice, "bm9uY2U=").await;
        let validator = ResultValidator::new(provider);

        let chosen = validator
            .certificate_choice(&result, CertificateLevel::Qualified)
            .unwrap();
        assert_eq!(chosen.document_number, "PNOEE-30303039914-MOCK-Q");

        result.document_number = None;
        assert!(validator
            .certificate_choice(&result, CertificateLevel::Qualified)
            .is_err());
    }

    #[tokio::test]
    async fn signature_is_checked_against_digest() {
        let provider = Arc::new(SimulatedProvider::default());
        let result = complete(&provider, OperationKind::Signature, "ZGlnZXN0").await;
        let validator = ResultValidator::new(provider);

        assert!(validator
            .signature(&result, CertificateLevel::Qualified, "ZGlnZXN0")
            .is_ok());
        assert!(validator
            .signature(&result, CertificateLevel::Qualified, "b3RoZXI=")
            .is_err());
    }
}
