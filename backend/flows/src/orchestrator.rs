//! Flow orchestration for authentication, certificate choice and signing.
//!
//! One orchestrator serves all three operation kinds. A flow is started
//! against the identity provider, its poller is registered under the local
//! session key, and callers then drive it with non-blocking status checks
//! until the validated result is consumed exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};
use uuid::Uuid;

use verilink_challenge::{verification_code, ChallengeInput, ChallengeRenderer, RenderedChallenge};
use verilink_core::{
    validate_interactions, CertificateLevel, CompletedSignature, ContainerService, DomainResult,
    FlowError, IdentityProvider, IdentitySelector, InitiateRequest, InitiatedSession, Interaction,
    InteractionMode, LocalSession, OperationKind, PreparedSignature, SessionKey, SessionResult,
    SigningPhase, UploadedDocument,
};
use verilink_logging::{FlowEvent, FlowEventLogger};
use verilink_sessions::{PollOutcome, PollQuery, Poller, PollerConfig, SessionRegistry, WorkerPool};

use crate::nonce::generate_nonce;
use crate::store::{LocalSessionStore, SessionCell};
use crate::validator::ResultValidator;

/// Per-kind defaults applied when a start request leaves them out.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub authentication_level: CertificateLevel,
    pub certificate_choice_level: CertificateLevel,
    pub signature_level: CertificateLevel,
    pub authentication_text: String,
    pub signature_text: String,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            authentication_level: CertificateLevel::Qualified,
            certificate_choice_level: CertificateLevel::Qualified,
            signature_level: CertificateLevel::Qualified,
            authentication_text: "Log in to verilink?".into(),
            signature_text: "Sign the uploaded document?".into(),
        }
    }
}

impl FlowSettings {
    pub fn level_for(&self, kind: OperationKind) -> CertificateLevel {
        match kind {
            OperationKind::Authentication => self.authentication_level,
            OperationKind::CertificateChoice => self.certificate_choice_level,
            OperationKind::Signature => self.signature_level,
        }
    }

    fn default_interactions(&self, kind: OperationKind) -> Vec<Interaction> {
        let text = match kind {
            OperationKind::Authentication => &self.authentication_text,
            OperationKind::Signature => &self.signature_text,
            OperationKind::CertificateChoice => return Vec::new(),
        };
        vec![Interaction::DisplayTextAndPin { text: text.clone() }]
    }
}

/// Parameters of a new operation.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Reuse this key; any flow already running under it is cancelled.
    pub session_key: Option<SessionKey>,
    pub selector: IdentitySelector,
    pub mode: InteractionMode,
    pub interactions: Option<Vec<Interaction>>,
    pub certificate_level: Option<CertificateLevel>,
}

impl StartRequest {
    pub fn new(selector: IdentitySelector) -> Self {
        Self {
            session_key: None,
            selector,
            mode: InteractionMode::DeviceLink,
            interactions: None,
            certificate_level: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<SessionKey>) -> Self {
        self.session_key = Some(key.into());
        self
    }

    pub fn with_mode(mut self, mode: InteractionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_interactions(mut self, interactions: Vec<Interaction>) -> Self {
        self.interactions = Some(interactions);
        self
    }

    pub fn with_certificate_level(mut self, level: CertificateLevel) -> Self {
        self.certificate_level = Some(level);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedFlow {
    pub session_key: SessionKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
}

/// What to show the user while an operation is pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeView {
    /// Rolling deep link and QR code for the current bucket.
    DeviceLink(RenderedChallenge),
    /// Static code to compare against the notification on the device.
    VerificationCode(String),
    /// A notification is pending with nothing to display.
    AwaitingDevice,
}

#[derive(Clone)]
pub struct FlowOrchestrator {
    provider: Arc<dyn IdentityProvider>,
    container: Arc<dyn ContainerService>,
    poller: Poller,
    registry: SessionRegistry,
    sessions: LocalSessionStore,
    renderer: ChallengeRenderer,
    validator: ResultValidator,
    settings: FlowSettings,
}

impl FlowOrchestrator {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        container: Arc<dyn ContainerService>,
        pool: WorkerPool,
        poller_config: PollerConfig,
        renderer: ChallengeRenderer,
        settings: FlowSettings,
    ) -> Self {
        Self {
            poller: Poller::new(Arc::clone(&provider), pool, poller_config),
            validator: ResultValidator::new(Arc::clone(&provider)),
            registry: SessionRegistry::new(),
            sessions: LocalSessionStore::new(),
            provider,
            container,
            renderer,
            settings,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Number of local sessions held, complete or not.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of pollers still talking to the provider.
    pub fn active_polls(&self) -> usize {
        self.registry.active_count()
    }

    pub async fn start_authentication(&self, request: StartRequest) -> Result<StartedFlow, FlowError> {
        self.start(OperationKind::Authentication, request, None).await
    }

    pub async fn start_certificate_choice(
        &self,
        request: StartRequest,
    ) -> Result<StartedFlow, FlowError> {
        self.start(OperationKind::CertificateChoice, request, None).await
    }

    /// Start signing `document`: a certificate choice runs first, the
    /// signature session follows once the certificate is known.
    pub async fn start_signature(
        &self,
        request: StartRequest,
        document: UploadedDocument,
    ) -> Result<StartedFlow, FlowError> {
        if document.content.is_empty() {
            return Err(FlowError::InvalidRequest("document is empty".into()));
        }
        self.start(OperationKind::Signature, request, Some(document)).await
    }

    async fn start(
        &self,
        kind: OperationKind,
        request: StartRequest,
        document: Option<UploadedDocument>,
    ) -> Result<StartedFlow, FlowError> {
        request.selector.validate()?;
        let interactions = match kind {
            OperationKind::CertificateChoice => Vec::new(),
            _ => {
                let interactions = request
                    .interactions
                    .clone()
                    .unwrap_or_else(|| self.settings.default_interactions(kind));
                validate_interactions(&interactions, request.mode)?;
                interactions
            }
        };
        let level = request
            .certificate_level
            .unwrap_or_else(|| self.settings.level_for(kind));
        let key = match request.session_key {
            Some(key) if key.trim().is_empty() => {
                return Err(FlowError::InvalidRequest("session key is empty".into()))
            }
            Some(key) => key,
            None => Uuid::new_v4().to_string(),
        };

        if self.teardown(&key).await {
            debug!(session_key = %key, "Restarting session slot");
        }

        let (remote_kind, remote_interactions, signing_phase) = match document {
            Some(document) => (
                OperationKind::CertificateChoice,
                Vec::new(),
                Some(SigningPhase::CertificateChoice { document }),
            ),
            None => (kind, interactions.clone(), None),
        };

        let nonce = generate_nonce();
        let initiated = self
            .initiate(InitiateRequest {
                kind: remote_kind,
                mode: request.mode,
                selector: request.selector.clone(),
                certificate_level: level,
                interactions: remote_interactions,
                nonce: nonce.clone(),
            })
            .await?;
        let verification_code = verification_code_for(remote_kind, request.mode, &initiated, &nonce);

        FlowEventLogger::log(
            &key,
            FlowEvent::Started {
                kind: kind.to_string(),
                mode: format!("{:?}", request.mode),
                remote_session_id: initiated.remote_session_id.clone(),
            },
        );

        let handle = self.poller.spawn(initiated.remote_session_id.clone());
        let session = LocalSession {
            key: key.clone(),
            kind,
            mode: request.mode,
            selector: request.selector,
            remote_session_id: initiated.remote_session_id,
            session_token: initiated.session_token,
            session_secret: initiated.session_secret,
            nonce,
            verification_code: verification_code.clone(),
            interactions,
            requested_level: level,
            accepted_at: Instant::now(),
            accepted_at_utc: Utc::now(),
            signing_phase,
            outcome: None,
        };
        self.sessions
            .install(session, |key| self.registry.register(key.clone(), handle));

        Ok(StartedFlow {
            session_key: key,
            verification_code,
        })
    }

    /// Non-blocking completion check. Drives the flow forward when its
    /// poller has finished.
    pub async fn check_status(&self, key: &str) -> Result<bool, FlowError> {
        let cell = self.cell(key)?;
        let mut session = cell.lock().await;
        if !session.is_complete() {
            self.advance(key, &cell, &mut session).await?;
        }
        Ok(session.is_complete())
    }

    /// Fresh display artifacts for a pending operation.
    pub async fn render_challenge(&self, key: &str) -> Result<ChallengeView, FlowError> {
        let cell = self.cell(key)?;
        let session = cell.lock().await;
        if session.is_complete() {
            return Err(FlowError::InvalidRequest(format!(
                "session '{key}' has already completed"
            )));
        }

        match session.mode {
            InteractionMode::Notification => Ok(session
                .verification_code
                .clone()
                .map(ChallengeView::VerificationCode)
                .unwrap_or(ChallengeView::AwaitingDevice)),
            InteractionMode::DeviceLink => {
                let (kind, interactions) = remote_shape(&session);
                let input = ChallengeInput {
                    kind,
                    session_token: &session.session_token,
                    session_secret: &session.session_secret,
                    interactions,
                };
                self.renderer
                    .render(&input, session.elapsed())
                    .map(ChallengeView::DeviceLink)
                    .map_err(|e| FlowError::InvalidOrUnprocessableResponse(e.to_string()))
            }
        }
    }

    /// Take the validated result and tear the session down. Succeeds at most
    /// once per started flow.
    pub async fn consume(&self, key: &str) -> Result<DomainResult, FlowError> {
        let cell = self.cell(key)?;
        let mut session = cell.lock().await;
        if !session.is_complete() {
            self.advance(key, &cell, &mut session).await?;
        }
        let Some(outcome) = session.outcome.clone() else {
            error!(session_key = %key, "Result requested before the operation completed");
            return Err(FlowError::NotComplete(key.to_string()));
        };
        if !self.sessions.remove_if_same(key, &cell) {
            return Err(FlowError::SessionNotFound(key.to_string()));
        }
        self.registry.cancel(key);
        debug!(session_key = %key, "Session consumed");
        outcome
    }

    /// Abandon the flow under `key`. Idempotent; returns whether anything was
    /// running or held.
    pub async fn cancel(&self, key: &str) -> bool {
        let existed = self.teardown(key).await;
        if existed {
            FlowEventLogger::log(key, FlowEvent::Cancelled);
        }
        existed
    }

    /// Cancel every session accepted more than `max_age` ago.
    pub async fn evict_expired(&self, max_age: Duration) -> usize {
        let mut evicted = 0;
        for key in self.sessions.expired_keys(max_age) {
            if self.cancel(&key).await {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(evicted, "Evicted expired sessions");
        }
        evicted
    }

    /// Cancel all pollers and drop every session.
    pub async fn shutdown(&self) {
        for key in self.sessions.keys() {
            self.teardown(&key).await;
        }
        self.registry.cancel_all();
    }

    fn cell(&self, key: &str) -> Result<SessionCell, FlowError> {
        self.sessions
            .get(key)
            .ok_or_else(|| FlowError::SessionNotFound(key.to_string()))
    }

    /// Remove the session and its poller. Waits for an in-progress state
    /// transition on the session to finish first.
    async fn teardown(&self, key: &str) -> bool {
        let removed = self.sessions.remove(key);
        if let Some(cell) = &removed {
            let _ = cell.lock().await;
        }
        let cancelled = self.registry.cancel(key);
        removed.is_some() || cancelled
    }

    async fn initiate(&self, request: InitiateRequest) -> Result<InitiatedSession, FlowError> {
        self.provider.initiate(&request).await.map_err(|e| {
            error!(kind = %request.kind, provider = self.provider.name(), error = %e, "Failed to initiate remote session");
            FlowError::RemoteProviderError(e.to_string())
        })
    }

    async fn advance(
        &self,
        key: &str,
        cell: &SessionCell,
        session: &mut LocalSession,
    ) -> Result<(), FlowError> {
        if !self.sessions.is_current(key, cell) {
            return Err(FlowError::SessionNotFound(key.to_string()));
        }
        let result = match self.registry.query(key) {
            PollQuery::Absent => return Err(FlowError::SessionNotFound(key.to_string())),
            PollQuery::NotReady => return Ok(()),
            PollQuery::Ready(PollOutcome::Completed(result)) => result,
            PollQuery::Ready(PollOutcome::TimedOut) => {
                self.finish(key, session, Err(FlowError::RemoteSessionTimeout));
                return Ok(());
            }
            PollQuery::Ready(PollOutcome::Failed(e)) => {
                self.finish(key, session, Err(FlowError::RemoteProviderError(e.to_string())));
                return Ok(());
            }
        };

        match session.signing_phase.take() {
            Some(SigningPhase::CertificateChoice { document }) => {
                if let Err(err) = self.begin_signing(key, session, &result, document).await {
                    self.finish(key, session, Err(err));
                }
            }
            Some(SigningPhase::Signing { prepared }) => {
                let outcome = self.complete_signature(session, &result, &prepared).await;
                self.finish(key, session, outcome);
            }
            None => {
                let outcome = match session.kind {
                    OperationKind::Authentication => self
                        .validator
                        .authentication(&result, session.requested_level, &session.nonce)
                        .map(DomainResult::Authenticated),
                    OperationKind::CertificateChoice => self
                        .validator
                        .certificate_choice(&result, session.requested_level)
                        .map(DomainResult::CertificateChosen),
                    OperationKind::Signature => Err(FlowError::InvalidOrUnprocessableResponse(
                        "signature session has no signing phase".into(),
                    )),
                };
                self.finish(key, session, outcome);
            }
        }
        Ok(())
    }

    /// Phase two of a signature: prepare the digest for the chosen
    /// certificate and open the signing session under the same key.
    async fn begin_signing(
        &self,
        key: &str,
        session: &mut LocalSession,
        result: &SessionResult,
        document: UploadedDocument,
    ) -> Result<(), FlowError> {
        let chosen = self
            .validator
            .certificate_choice(result, session.requested_level)?;
        FlowEventLogger::log(
            key,
            FlowEvent::CertificateChosen {
                document_number: chosen.document_number.clone(),
            },
        );

        let prepared = self
            .container
            .prepare(&document, &chosen.certificate)
            .map_err(|e| FlowError::Container(e.to_string()))?;

        let initiated = self
            .initiate(InitiateRequest {
                kind: OperationKind::Signature,
                mode: session.mode,
                selector: IdentitySelector::DocumentNumber {
                    document_number: chosen.document_number,
                },
                certificate_level: session.requested_level,
                interactions: session.interactions.clone(),
                nonce: prepared.digest.clone(),
            })
            .await?;

        session.verification_code = verification_code_for(
            OperationKind::Signature,
            session.mode,
            &initiated,
            &prepared.digest,
        );
        session.remote_session_id = initiated.remote_session_id.clone();
        session.session_token = initiated.session_token;
        session.session_secret = initiated.session_secret;
        session.nonce = prepared.digest.clone();
        session.accepted_at = Instant::now();
        session.accepted_at_utc = Utc::now();
        session.signing_phase = Some(SigningPhase::Signing { prepared });

        self.registry
            .register(key.to_string(), self.poller.spawn(initiated.remote_session_id));
        info!(session_key = %key, remote_session_id = %session.remote_session_id, "Signing session started");
        Ok(())
    }

    async fn complete_signature(
        &self,
        session: &LocalSession,
        result: &SessionResult,
        prepared: &PreparedSignature,
    ) -> Result<DomainResult, FlowError> {
        let signature = self
            .validator
            .signature(result, session.requested_level, &prepared.digest)?;
        let container = self
            .container
            .finalize(prepared, &signature)
            .await
            .map_err(|e| FlowError::Container(e.to_string()))?;

        Ok(DomainResult::Signed(CompletedSignature {
            document_number: result.document_number.clone(),
            signature_value: signature.value,
            algorithm: signature.algorithm,
            signer: prepared.certificate.subject.clone(),
            container,
        }))
    }

    fn finish(
        &self,
        key: &str,
        session: &mut LocalSession,
        outcome: Result<DomainResult, FlowError>,
    ) {
        let event = match &outcome {
            Ok(_) => FlowEvent::Completed {
                kind: session.kind.to_string(),
            },
            Err(err) => FlowEvent::Failed {
                kind: session.kind.to_string(),
                error_kind: err.kind().to_string(),
                message: err.to_string(),
            },
        };
        FlowEventLogger::log(key, event);
        session.outcome = Some(outcome);
        self.registry.cancel(key);
    }
}

/// Operation kind and interactions of the remote session currently running.
fn remote_shape(session: &LocalSession) -> (OperationKind, &[Interaction]) {
    match session.signing_phase {
        Some(SigningPhase::CertificateChoice { .. }) => (OperationKind::CertificateChoice, &[][..]),
        _ => (session.kind, session.interactions.as_slice()),
    }
}

fn verification_code_for(
    kind: OperationKind,
    mode: InteractionMode,
    initiated: &InitiatedSession,
    payload: &str,
) -> Option<String> {
    if mode != InteractionMode::Notification || kind == OperationKind::CertificateChoice {
        return None;
    }
    Some(
        initiated
            .verification_code
            .clone()
            .unwrap_or_else(|| verification_code(payload.as_bytes())),
    )
}
