use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

const NONCE_BYTES: usize = 32;

/// Fresh random challenge for one operation attempt, base64-encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
