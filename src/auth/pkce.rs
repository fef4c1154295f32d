/// PKCE (RFC 7636, S256) verifier/challenge pairs
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// One verifier/challenge pair, used for a single authorization attempt.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    /// Fresh pair from 32 bytes of OS randomness (43-char verifier).
    pub fn generate() -> Self {
        let mut random_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut random_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes);
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

/// `BASE64URL(SHA256(ascii(verifier)))`, no padding
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn verifier_decodes_to_32_bytes() {
        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 43);
        let decoded = URL_SAFE_NO_PAD.decode(&pkce.verifier).unwrap();
        assert_eq!(decoded.len(), 32);
        assert!(pkce
            .verifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn challenge_hashes_the_textual_verifier() {
        let pkce = Pkce::generate();
        let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce.verifier.as_bytes()));
        assert_eq!(pkce.challenge, expected);
        assert_eq!(pkce.challenge.len(), 43);
    }

    #[test]
    fn challenge_matches_known_value() {
        // SHA256("hello") base64url-encoded
        assert_eq!(
            challenge_for("hello"),
            "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ"
        );
    }

    #[test]
    fn verifiers_do_not_repeat() {
        let verifiers: HashSet<String> = (0..1000).map(|_| Pkce::generate().verifier).collect();
        assert_eq!(verifiers.len(), 1000);
    }
}
