pub mod auth_code;
pub mod error;
pub mod qr;
pub mod renderer;
pub mod verification_code;

pub use auth_code::{auth_code, interactions_digest};
pub use error::ChallengeError;
pub use qr::qr_data_uri;
pub use renderer::{ChallengeInput, ChallengeRenderer, DeviceLinkType, RenderedChallenge, RendererConfig};
pub use verification_code::verification_code;
