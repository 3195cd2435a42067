//! Bearer-token verification (HS256).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::authorize::AuthzError;
use crate::claims::{JwtClaims, TokenValidationError, validate_claims};
use crate::principal::{Principal, Scope};

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;

    /// Verify the token and resolve it into a principal (role gate entry point).
    fn authenticate(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AuthzError> {
        let claims = self
            .validate(token, now)
            .map_err(|e| AuthzError::Unauthenticated(e.to_string()))?;
        let scope = Scope::resolve(claims.role, claims.scope)?;
        Ok(Principal::new(claims.sub, claims.role, scope))
    }
}

/// HMAC-SHA256 token validator.
///
/// Timestamps are RFC 3339 strings rather than registered numeric claims, so
/// the time window is checked by [`validate_claims`] instead of the JWT library.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        Self {
            key: DecodingKey::from_secret(&secret),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}
