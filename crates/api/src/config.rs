//! Process configuration read from the environment.

use std::net::SocketAddr;

use anyhow::Context;

use nominalroll_infra::DEFAULT_HEADING;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Global heading printed on every export.
    pub export_heading: String,
}

impl ApiConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("failed to load .env");
            }
        }

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let export_heading = std::env::var("EXPORT_HEADING")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HEADING.to_string());

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url,
            export_heading,
        })
    }

    /// In-memory configuration for tests and local tooling.
    pub fn for_testing(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            database_url: None,
            export_heading: DEFAULT_HEADING.to_string(),
        }
    }
}
