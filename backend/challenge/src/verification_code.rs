//! Static 4-digit verification codes for notification-based sessions.

use sha2::{Digest, Sha256};

/// Derive the verification code the user compares on their device.
///
/// Last two bytes of `SHA-256(payload)` as a big-endian integer, mod 10000,
/// zero-padded to four digits.
pub fn verification_code(payload: &[u8]) -> String {
    let hash = Sha256::digest(payload);
    let tail = u16::from_be_bytes([hash[30], hash[31]]);
    format!("{:04}", tail % 10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_four_ascii_digits() {
        for payload in [&b""[..], b"a", b"challenge", &[0xffu8; 64]] {
            let code = verification_code(payload);
            assert_eq!(code.len(), 4, "{code}");
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn matches_manual_derivation() {
        let hash = Sha256::digest(b"hello");
        let expected = (u16::from(hash[30]) << 8 | u16::from(hash[31])) % 10_000;
        assert_eq!(verification_code(b"hello"), format!("{expected:04}"));
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(verification_code(b"nonce"), verification_code(b"nonce"));
    }
}
