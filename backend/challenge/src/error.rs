use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("session secret is not valid base64: {0}")]
    InvalidSecret(String),

    #[error("invalid device link base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("bucket width must be at least one second")]
    InvalidBucket,

    #[error("failed to encode interactions: {0}")]
    InteractionEncoding(String),

    #[error("failed to render QR code: {0}")]
    QrEncoding(String),
}
