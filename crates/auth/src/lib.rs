//! `nominalroll-auth`: pure authentication/authorization boundary.
//!
//! No HTTP or storage code lives here. It resolves a
//! bearer token into a [`Principal`] (role + scope) and answers capability
//! questions through a fixed role table.

pub mod account;
pub mod authorize;
pub mod capabilities;
pub mod claims;
pub mod credentials;
pub mod jwt;
pub mod principal;
pub mod roles;

pub use account::UserAccount;
pub use authorize::{AuthzError, require};
pub use capabilities::{Capabilities, FieldTier, ScopeKind};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use credentials::{hash_password, verify_password};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use principal::{Principal, Scope, ScopeRef};
pub use roles::Role;
