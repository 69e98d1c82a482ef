//! Startup orchestration.
//!
//! # Responsibilities
//! - Construct the store client from configuration
//! - Create the configured tables before any listener accepts traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::store::{CellStore, MemoryStore, StoreError};

/// Build the store client and create the configured tables.
///
/// Tables that already exist are left alone.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn CellStore>, StoreError> {
    let store: Arc<dyn CellStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };

    for table in &config.tables {
        if store.table_exists(&table.name).await? {
            tracing::debug!(table = %table.name, "Table already present");
            continue;
        }
        store.create_table(&table.name, &table.families).await?;
        tracing::info!(table = %table.name, families = ?table.families, "Table ready");
    }

    Ok(store)
}
