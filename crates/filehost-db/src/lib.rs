//! Filehost metadata store
//!
//! The [`MetadataStore`] trait is the only way the ingestion pipeline touches
//! file records and upload attempts. Every operation takes an explicit session
//! handle obtained from [`MetadataStore::begin`]; the caller decides when that
//! session commits or rolls back.
//!
//! Two implementations are provided:
//!
//! - [`PostgresMetadataStore`]: sqlx-backed, sessions are database transactions.
//! - [`MemoryMetadataStore`]: in-process, sessions are serialized; used by tests
//!   and local tooling.

pub mod memory;
pub mod postgres;
pub mod setup;
pub mod store;

pub use memory::MemoryMetadataStore;
pub use postgres::PostgresMetadataStore;
pub use setup::{connect_pool, run_migrations, MIGRATOR};
pub use store::{MetadataResult, MetadataStore};
