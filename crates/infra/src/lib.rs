//! Infrastructure layer: persistence, workflows, notification delivery and
//! nominal-roll export.
//!
//! - [`store`]: the `PersonnelStore` boundary with in-memory and Postgres
//!   (feature `postgres`) implementations.
//! - [`services`]: authorized personnel workflows over a store.
//! - [`notify`]: post-commit notification sinks.
//! - [`export`]: spreadsheet and PDF rendering of the roll.
//! - [`import`]: reading staff rows from an uploaded workbook.

pub mod export;
pub mod import;
pub mod notify;
pub mod services;
pub mod store;

pub use export::{DEFAULT_HEADING, ExportError, ExportFormat, ExportedFile};
pub use import::ImportError;
pub use notify::{LogSink, NotificationSink};
pub use services::{PersonnelService, ServiceError, ServiceResult};
pub use store::{InMemoryPersonnelStore, PersonnelStore, StoreError};
#[cfg(feature = "postgres")]
pub use store::PostgresPersonnelStore;
