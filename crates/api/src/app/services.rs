//! Service wiring: picks the store backend and builds the shared workflow
//! service handed to every handler.

use std::sync::Arc;

use nominalroll_infra::{InMemoryPersonnelStore, LogSink, PersonnelService, PersonnelStore};

use crate::config::ApiConfig;

/// Shared state for all handlers (behind `Extension<Arc<AppServices>>`).
pub struct AppServices {
    pub personnel: PersonnelService,
    pub export_heading: String,
}

pub async fn build_services(config: &ApiConfig) -> anyhow::Result<AppServices> {
    let store = build_store(config).await?;
    Ok(AppServices {
        personnel: PersonnelService::new(store, Arc::new(LogSink)),
        export_heading: config.export_heading.clone(),
    })
}

async fn build_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn PersonnelStore>> {
    match config.database_url.as_deref() {
        #[cfg(feature = "postgres")]
        Some(url) => {
            use anyhow::Context;

            let store = nominalroll_infra::PostgresPersonnelStore::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            store.migrate().await.context("failed to apply schema")?;
            tracing::info!("using postgres personnel store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            tracing::warn!("DATABASE_URL set but postgres feature not enabled, falling back to in-memory");
            Ok(Arc::new(InMemoryPersonnelStore::new()))
        }
        None => {
            tracing::info!("using in-memory personnel store");
            Ok(Arc::new(InMemoryPersonnelStore::new()))
        }
    }
}
