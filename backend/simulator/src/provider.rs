//! In-process identity provider with scriptable behaviour.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info};
use uuid::Uuid;

use verilink_core::{
    CertificateLevel, CertificatePayload, EndResult, IdentityProvider, IdentitySelector,
    InitiateRequest, InitiatedSession, OperationKind, ParsedIdentity,
    ProviderError, SessionResult, SignaturePayload, TerminalStatus,
};

/// Demo identity used when a session does not name one.
pub const DEFAULT_COUNTRY: &str = "EE";
pub const DEFAULT_IDENTITY_NUMBER: &str = "30303039914";
const DEFAULT_GIVEN_NAME: &str = "OK";
const DEFAULT_SURNAME: &str = "TESTNUMBER";

const PROOF_ALGORITHM: &str = "sha256WithProof";

/// Sessions nobody polled to completion are dropped after this long.
const SESSION_RETENTION: Duration = Duration::from_secs(15 * 60);

/// Behaviour of simulated sessions.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Time after initiation at which the session reports COMPLETE.
    pub complete_after: Duration,
    pub end_result: EndResult,
    /// Level of the certificate handed back.
    pub certificate_level: CertificateLevel,
    /// Stay RUNNING forever.
    pub never_complete: bool,
    /// Fail this many status fetches with a transport error before answering.
    pub transient_failures: u32,
    /// Fail every status fetch with this error.
    pub permanent_failure: Option<ProviderError>,
    /// Artificial latency of each status fetch.
    pub fetch_latency: Duration,
    /// Return a proof that does not verify.
    pub tamper_proof: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            complete_after: Duration::ZERO,
            end_result: EndResult::Ok,
            certificate_level: CertificateLevel::Qualified,
            never_complete: false,
            transient_failures: 0,
            permanent_failure: None,
            fetch_latency: Duration::ZERO,
            tamper_proof: false,
        }
    }
}

impl SimulatorConfig {
    pub fn with_complete_after(mut self, delay: Duration) -> Self {
        self.complete_after = delay;
        self
    }

    pub fn with_end_result(mut self, end_result: EndResult) -> Self {
        self.end_result = end_result;
        self
    }

    pub fn with_certificate_level(mut self, level: CertificateLevel) -> Self {
        self.certificate_level = level;
        self
    }

    pub fn with_never_complete(mut self) -> Self {
        self.never_complete = true;
        self
    }

    pub fn with_transient_failures(mut self, count: u32) -> Self {
        self.transient_failures = count;
        self
    }

    pub fn with_permanent_failure(mut self, error: ProviderError) -> Self {
        self.permanent_failure = Some(error);
        self
    }

    pub fn with_fetch_latency(mut self, latency: Duration) -> Self {
        self.fetch_latency = latency;
        self
    }

    pub fn with_tampered_proof(mut self) -> Self {
        self.tamper_proof = true;
        self
    }
}

struct SimulatedSession {
    request: InitiateRequest,
    config: SimulatorConfig,
    created: Instant,
    failures_left: AtomicUsize,
}

/// Identity provider that fabricates sessions in memory.
pub struct SimulatedProvider {
    default: SimulatorConfig,
    overrides: HashMap<OperationKind, SimulatorConfig>,
    sessions: DashMap<String, SimulatedSession>,
    initiate_count: AtomicUsize,
    fetch_count: AtomicUsize,
}

impl SimulatedProvider {
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            default: config,
            overrides: HashMap::new(),
            sessions: DashMap::new(),
            initiate_count: AtomicUsize::new(0),
            fetch_count: AtomicUsize::new(0),
        }
    }

    /// Use `config` for sessions of `kind` instead of the default.
    pub fn with_override(mut self, kind: OperationKind, config: SimulatorConfig) -> Self {
        self.overrides.insert(kind, config);
        self
    }

    pub fn initiate_count(&self) -> usize {
        self.initiate_count.load(Ordering::SeqCst)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Sessions still held in memory.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn sweep_abandoned(&self, retention: Duration) {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.created.elapsed() < retention);
        let dropped = before.saturating_sub(self.sessions.len());
        if dropped > 0 {
            debug!(dropped, "Dropped abandoned simulated sessions");
        }
    }

    fn config_for(&self, kind: OperationKind) -> SimulatorConfig {
        self.overrides.get(&kind).cloned().unwrap_or_else(|| self.default.clone())
    }

    fn complete(&self, session: &SimulatedSession) -> SessionResult {
        let mut result = SessionResult::with_end_result(session.config.end_result.clone());
        result.interaction_flow_used = session
            .request
            .interactions
            .first()
            .map(|i| i.type_name().to_string());
        if session.config.end_result != EndResult::Ok {
            return result;
        }

        let (country, number) = subject_identity(&session.request.selector);
        let certificate = fabricate_certificate(&country, &number, session.config.certificate_level);
        result.document_number = Some(document_number(&country, &number));

        if session.request.kind != OperationKind::CertificateChoice {
            let mut value = proof(&session.request.nonce, &certificate.value);
            if session.config.tamper_proof {
                value = STANDARD.encode(b"forged");
            }
            result.signature = Some(SignaturePayload {
                value,
                algorithm: PROOF_ALGORITHM.to_string(),
            });
        }
        result.certificate = Some(certificate);
        result
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new(SimulatorConfig::default())
    }
}

#[async_trait]
impl IdentityProvider for SimulatedProvider {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn initiate(&self, request: &InitiateRequest) -> Result<InitiatedSession, ProviderError> {
        let remote_session_id = Uuid::new_v4().to_string();
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);

        self.sweep_abandoned(SESSION_RETENTION);
        let config = self.config_for(request.kind);
        self.sessions.insert(
            remote_session_id.clone(),
            SimulatedSession {
                request: request.clone(),
                failures_left: AtomicUsize::new(config.transient_failures as usize),
                config,
                created: Instant::now(),
            },
        );
        self.initiate_count.fetch_add(1, Ordering::SeqCst);
        info!(remote_session_id = %remote_session_id, kind = %request.kind, "Simulated session initiated");

        Ok(InitiatedSession {
            session_token: Uuid::new_v4().simple().to_string(),
            session_secret: STANDARD.encode(secret),
            remote_session_id,
            verification_code: None,
        })
    }

    async fn fetch_status(&self, remote_session_id: &str) -> Result<TerminalStatus, ProviderError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        let latency = match self.sessions.get(remote_session_id) {
            Some(session) => session.config.fetch_latency,
            None => return Err(ProviderError::SessionNotFound(remote_session_id.to_string())),
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let session = self
            .sessions
            .get(remote_session_id)
            .ok_or_else(|| ProviderError::SessionNotFound(remote_session_id.to_string()))?;

        if let Some(err) = &session.config.permanent_failure {
            return Err(err.clone());
        }
        let consumed = session
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            debug!(remote_session_id, "Simulating transport failure");
            return Err(ProviderError::Transport("simulated connection reset".into()));
        }
        if session.config.never_complete || session.created.elapsed() < session.config.complete_after {
            return Ok(TerminalStatus::Running);
        }
        let result = self.complete(&session);
        drop(session);
        self.sessions.remove(remote_session_id);
        Ok(TerminalStatus::Complete(result))
    }

    fn validate_claims(
        &self,
        result: &SessionResult,
        _requested_level: CertificateLevel,
        nonce: &str,
    ) -> Result<ParsedIdentity, ProviderError> {
        let certificate = result
            .certificate
            .as_ref()
            .ok_or_else(|| ProviderError::InvalidClaims("certificate missing".into()))?;
        let signature = result
            .signature
            .as_ref()
            .ok_or_else(|| ProviderError::InvalidClaims("signature missing".into()))?;

        verify_proof(nonce, certificate, signature)?;
        parse_subject(certificate)
    }

    fn verify_signature(&self, result: &SessionResult, digest: &str) -> Result<(), ProviderError> {
        let certificate = result
            .certificate
            .as_ref()
            .ok_or_else(|| ProviderError::InvalidClaims("certificate missing".into()))?;
        let signature = result
            .signature
            .as_ref()
            .ok_or_else(|| ProviderError::InvalidClaims("signature missing".into()))?;
        verify_proof(digest, certificate, signature)
    }
}

fn subject_identity(selector: &IdentitySelector) -> (String, String) {
    match selector {
        IdentitySelector::Identity {
            country,
            national_identity_number,
        } => (country.clone(), national_identity_number.clone()),
        IdentitySelector::DocumentNumber { document_number } => {
            // PNO{country}-{number}-{suffix}
            let mut parts = document_number.trim_start_matches("PNO").splitn(3, '-');
            match (parts.next(), parts.next()) {
                (Some(country), Some(number)) if country.len() == 2 => {
                    (country.to_string(), number.to_string())
                }
                _ => (DEFAULT_COUNTRY.into(), DEFAULT_IDENTITY_NUMBER.into()),
            }
        }
        IdentitySelector::Anonymous => (DEFAULT_COUNTRY.into(), DEFAULT_IDENTITY_NUMBER.into()),
    }
}

fn document_number(country: &str, number: &str) -> String {
    format!("PNO{country}-{number}-MOCK-Q")
}

fn fabricate_certificate(country: &str, number: &str, level: CertificateLevel) -> CertificatePayload {
    let subject = format!(
        "C={country}, CN={DEFAULT_SURNAME}\\,{DEFAULT_GIVEN_NAME}, SURNAME={DEFAULT_SURNAME}, \
         GIVENNAME={DEFAULT_GIVEN_NAME}, SERIALNUMBER=PNO{country}-{number}"
    );
    CertificatePayload {
        value: STANDARD.encode(format!("simulated-certificate:{subject}:{level}")),
        certificate_level: level,
        subject,
    }
}

/// base64(SHA-256(nonce || certificate))
fn proof(nonce: &str, certificate_value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(certificate_value.as_bytes());
    STANDARD.encode(hasher.finalize())
}

fn verify_proof(
    nonce: &str,
    certificate: &CertificatePayload,
    signature: &SignaturePayload,
) -> Result<(), ProviderError> {
    let expected = proof(nonce, &certificate.value);
    if expected.as_bytes().ct_eq(signature.value.as_bytes()).into() {
        Ok(())
    } else {
        Err(ProviderError::InvalidClaims(
            "signature does not match the requested challenge".into(),
        ))
    }
}

fn parse_subject(certificate: &CertificatePayload) -> Result<ParsedIdentity, ProviderError> {
    let field = |name: &str| -> Option<String> {
        certificate
            .subject
            .split(", ")
            .find_map(|part| part.strip_prefix(name).and_then(|v| v.strip_prefix('=')))
            .map(str::to_string)
    };
    let missing = |name: &str| ProviderError::InvalidClaims(format!("subject lacks {name}"));

    let serial = field("SERIALNUMBER").ok_or_else(|| missing("SERIALNUMBER"))?;
    let identity_code = serial
        .split_once('-')
        .map(|(_, code)| code.to_string())
        .ok_or_else(|| missing("identity code"))?;

    Ok(ParsedIdentity {
        given_name: field("GIVENNAME").ok_or_else(|| missing("GIVENNAME"))?,
        surname: field("SURNAME").ok_or_else(|| missing("SURNAME"))?,
        identity_code,
        country: field("C").ok_or_else(|| missing("C"))?,
        certificate_level: certificate.certificate_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use verilink_core::{Interaction, InteractionMode};

    fn request(kind: OperationKind, selector: IdentitySelector) -> InitiateRequest {
        InitiateRequest {
            kind,
            mode: InteractionMode::DeviceLink,
            selector,
            certificate_level: CertificateLevel::Qualified,
            interactions: vec![Interaction::DisplayTextAndPin {
                text: "Log in?".into(),
            }],
            nonce: "Y2hhbGxlbmdl".into(),
        }
    }

    async fn completed(provider: &SimulatedProvider, req: &InitiateRequest) -> SessionResult {
        let session = provider.initiate(req).await.unwrap();
        match provider.fetch_status(&session.remote_session_id).await.unwrap() {
            TerminalStatus::Complete(result) => result,
            TerminalStatus::Running => panic!("expected a completed session"),
        }
    }

    #[tokio::test]
    async fn authentication_proof_verifies_against_its_nonce() {
        let provider = SimulatedProvider::default();
        let req = request(
            OperationKind::Authentication,
            IdentitySelector::Identity {
                country: "LV".into(),
                national_identity_number: "010101-10006".into(),
            },
        );
        let result = completed(&provider, &req).await;

        let identity = provider
            .validate_claims(&result, CertificateLevel::Qualified, &req.nonce)
            .unwrap();
        assert_eq!(identity.country, "LV");
        assert_eq!(identity.identity_code, "010101-10006");
        assert_eq!(identity.surname, "TESTNUMBER");
        assert_eq!(result.interaction_flow_used.as_deref(), Some("displayTextAndPIN"));

        let err = provider
            .validate_claims(&result, CertificateLevel::Qualified, "b3RoZXI=")
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidClaims(_)));
    }

    #[tokio::test]
    async fn tampered_proof_is_rejected() {
        let provider = SimulatedProvider::new(SimulatorConfig::default().with_tampered_proof());
        let req = request(OperationKind::Authentication, IdentitySelector::Anonymous);
        let result = completed(&provider, &req).await;
        assert!(provider
            .validate_claims(&result, CertificateLevel::Qualified, &req.nonce)
            .is_err());
    }

    #[tokio::test]
    async fn certificate_choice_carries_no_signature() {
        let provider = SimulatedProvider::default();
        let req = request(
            OperationKind::CertificateChoice,
            IdentitySelector::DocumentNumber {
                document_number: "PNOLT-30303039914-MOCK-Q".into(),
            },
        );
        let result = completed(&provider, &req).await;
        assert!(result.signature.is_none());
        assert_eq!(
            result.document_number.as_deref(),
            Some("PNOLT-30303039914-MOCK-Q")
        );
    }

    #[tokio::test]
    async fn refused_session_has_no_payload() {
        let provider = SimulatedProvider::new(
            SimulatorConfig::default().with_end_result(EndResult::UserRefused),
        );
        let result = completed(&provider, &request(OperationKind::Signature, IdentitySelector::Anonymous)).await;
        assert_eq!(result.end_result, EndResult::UserRefused);
        assert!(result.certificate.is_none());
    }

    #[tokio::test]
    async fn unknown_session_is_reported() {
        let provider = SimulatedProvider::default();
        assert!(matches!(
            provider.fetch_status("missing").await,
            Err(ProviderError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn counts_initiations_and_fetches() {
        let provider = SimulatedProvider::new(
            SimulatorConfig::default().with_complete_after(Duration::from_secs(60)),
        );
        let session = provider
            .initiate(&request(OperationKind::Authentication, IdentitySelector::Anonymous))
            .await
            .unwrap();
        assert!(session.verification_code.is_none());
        assert_eq!(
            provider.fetch_status(&session.remote_session_id).await.unwrap(),
            TerminalStatus::Running
        );
        assert_eq!(provider.initiate_count(), 1);
        assert_eq!(provider.fetch_count(), 1);
    }

    #[tokio::test]
    async fn override_applies_per_operation_kind() {
        let provider = SimulatedProvider::default().with_override(
            OperationKind::Signature,
            SimulatorConfig::default().with_end_result(EndResult::WrongVerificationCode),
        );
        let auth = completed(&provider, &request(OperationKind::Authentication, IdentitySelector::Anonymous)).await;
        let sign = completed(&provider, &request(OperationKind::Signature, IdentitySelector::Anonymous)).await;
        assert_eq!(auth.end_result, EndResult::Ok);
        assert_eq!(sign.end_result, EndResult::WrongVerificationCode);
    }

    #[tokio::test]
    async fn completed_sessions_are_forgotten() {
        let provider = SimulatedProvider::default();
        let req = request(OperationKind::Authentication, IdentitySelector::Anonymous);
        for _ in 0..50 {
            completed(&provider, &req).await;
        }
        assert_eq!(provider.initiate_count(), 50);
        assert_eq!(provider.session_count(), 0);
    }

    #[tokio::test]
    async fn abandoned_sessions_are_swept_by_age() {
        let provider = SimulatedProvider::new(SimulatorConfig::default().with_never_complete());
        let req = request(OperationKind::Authentication, IdentitySelector::Anonymous);
        for _ in 0..3 {
            provider.initiate(&req).await.unwrap();
        }
        assert_eq!(provider.session_count(), 3);

        tokio::time::sleep(Duration::from_millis(20)).await;
        provider.sweep_abandoned(Duration::from_millis(10));
        assert_eq!(provider.session_count(), 0);
    }
}
