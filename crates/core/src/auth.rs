//! Shared-secret authentication (spec §4.H, §6, §9).
//!
//! The original compares the `gapir-auth-token` metadata value to the
//! configured token byte-for-byte. Spec §9's open note asks for a
//! constant-time comparison with respect to token length instead, so a
//! session's auth latency cannot be used to narrow down the secret.

/// Compares two byte strings in time independent of where they first
/// differ. Still short-circuits on length mismatch, since length is not
/// secret (the configured token's length is fixed and known to anyone who
/// can read the token file).
pub fn token_eq(expected: &[u8], candidate: &[u8]) -> bool {
    if expected.len() != candidate.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (a, b) in expected.iter().zip(candidate.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_match() {
        assert!(token_eq(b"secret", b"secret"));
    }

    #[test]
    fn different_lengths_do_not_match() {
        assert!(!token_eq(b"secret", b"secret2"));
    }

    #[test]
    fn same_length_mismatch_does_not_match() {
        assert!(!token_eq(b"secretA", b"secretB"));
    }

    #[test]
    fn empty_tokens_match() {
        assert!(token_eq(b"", b""));
    }
}
