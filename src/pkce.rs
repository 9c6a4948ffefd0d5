use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::OAuthError;

/// Length of the code verifier sent at token exchange (RFC 7636 allows 43..=128).
pub const VERIFIER_LENGTH: usize = 128;
/// Length of the anti-CSRF state token.
pub const STATE_LENGTH: usize = 32;
/// The only challenge method ever offered.
pub const CODE_CHALLENGE_METHOD: &str = "S256";

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
// Largest multiple of 62 that fits in a byte; anything above is rejected so
// every character stays equally likely.
const ACCEPT_BELOW: u8 = 248;

/// Returns `length` characters drawn uniformly from `[A-Za-z0-9]` using the OS CSPRNG.
pub fn generate_random_string(length: usize) -> Result<String, OAuthError> {
    let mut output = String::with_capacity(length);
    let mut buffer = [0u8; 64];

    while output.len() < length {
        OsRng
            .try_fill_bytes(&mut buffer)
            .map_err(|err| OAuthError::OsRng {
                message: err.to_string(),
            })?;

        for byte in buffer {
            if output.len() == length {
                break;
            }
            if byte < ACCEPT_BELOW {
                let index = usize::from(byte) % ALPHABET.len();
                output.push(char::from(ALPHABET[index]));
            }
        }
    }

    Ok(output)
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn generate_code_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct PkcePair {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl PkcePair {
    pub fn generate() -> Result<Self, OAuthError> {
        Ok(Self::from_verifier(generate_random_string(VERIFIER_LENGTH)?))
    }

    pub fn from_verifier(code_verifier: impl Into<String>) -> Self {
        let code_verifier = code_verifier.into();
        let code_challenge = generate_code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
        }
    }
}
