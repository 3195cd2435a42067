//! Password hashing for stored user credentials (Argon2id).

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;

use nominalroll_core::{DomainError, DomainResult};

/// Hash a plaintext password into a PHC string.
pub fn hash_password(password: &str) -> DomainResult<String> {
    if password.len() < 8 {
        return Err(DomainError::validation("password must be at least 8 characters"));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DomainError::invariant(format!("password hashing failed: {e}")))
}

/// Verify a plaintext password against a stored PHC string.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
