//! Password hashing and random credential generation.
//!
//! Uses Argon2id for password hashing and the OS RNG for every opaque
//! credential (codes, tokens, client identifiers and secrets).

use crate::error::OAuthError;
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;

/// Random bytes behind codes, access tokens, refresh tokens and client secrets.
const TOKEN_BYTES: usize = 32;
/// Random bytes behind a generated `client_id`.
const CLIENT_ID_BYTES: usize = 16;

/// Hash a password using Argon2id.
///
/// Returns the PHC-formatted hash string suitable for storage.
pub fn hash_password(password: &str) -> Result<String, OAuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| OAuthError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a password against a stored hash.
///
/// Returns true if the password matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

fn random_urlsafe<const N: usize>() -> Result<String, OAuthError> {
    let mut bytes = [0u8; N];
    getrandom::fill(&mut bytes)
        .map_err(|e| OAuthError::Internal(format!("failed to generate random bytes: {e}")))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate an opaque bearer credential (256 bits, URL-safe base64).
pub fn generate_token() -> Result<String, OAuthError> {
    random_urlsafe::<TOKEN_BYTES>()
}

/// Generate a public client identifier for a newly approved app.
pub fn generate_client_id() -> Result<String, OAuthError> {
    random_urlsafe::<CLIENT_ID_BYTES>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_password() {
        let password = "my-secure-password-123!";
        let hash = hash_password(password).expect("Failed to hash password");

        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(password, &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn test_hash_produces_different_salts() {
        let password = "same-password";
        let hash1 = hash_password(password).expect("Failed to hash");
        let hash2 = hash_password(password).expect("Failed to hash");

        assert_ne!(hash1, hash2);
        assert!(verify_password(password, &hash1));
        assert!(verify_password(password, &hash2));
    }

    #[test]
    fn test_verify_invalid_hash_format() {
        assert!(!verify_password("password", "not-a-valid-hash"));
        assert!(!verify_password("password", ""));
        assert!(!verify_password("password", "$invalid$hash$format"));
    }

    #[test]
    fn test_generate_token() {
        let token1 = generate_token().unwrap();
        let token2 = generate_token().unwrap();

        assert_ne!(token1, token2);
        assert!(!token1.contains('+'));
        assert!(!token1.contains('/'));
        assert!(!token1.contains('='));
        // 32 bytes -> 43 base64url characters
        assert_eq!(token1.len(), 43);
    }

    #[test]
    fn test_generate_client_id() {
        let id = generate_client_id().unwrap();
        assert_eq!(id.len(), 22);
        assert_ne!(id, generate_client_id().unwrap());
    }
}
