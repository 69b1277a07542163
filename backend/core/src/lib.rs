pub mod error;
pub mod session;
pub mod status;
pub mod traits;
pub mod types;

pub use error::{ErrorReport, FlowError};
pub use session::{
    AuthenticatedIdentity, ChosenCertificate, CompletedSignature, DomainResult, LocalSession,
    SigningPhase,
};
pub use status::{CertificatePayload, EndResult, SessionResult, SignaturePayload, TerminalStatus};
pub use traits::{
    ContainerError, ContainerService, IdentityProvider, InitiateRequest, InitiatedSession,
    ParsedIdentity, PreparedSignature, ProviderError, SignedContainer,
};
pub use types::{
    validate_interactions, CertificateLevel, IdentitySelector, Interaction, InteractionMode,
    OperationKind, SessionKey, UploadedDocument,
};
