//! Store client subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP dispatcher / benchmark harness
//!     → CellStore (get / put / delete / scan)
//!     → backend (memory.rs, or any external client implementing the trait)
//!
//! Range reads:
//!     scan.rs opens a Scanner, drains at most `batch` rows, always closes it
//! ```
//!
//! # Design Decisions
//! - The client is an explicit `Arc<dyn CellStore>` handed to every consumer
//! - Column iteration order within a row is not stable and must not be relied on
//! - Scanners are request-scoped and never shared

pub mod memory;
pub mod scan;

use std::collections::HashMap;

use async_trait::async_trait;

pub use memory::MemoryStore;
pub use scan::collect_rows;

/// Default number of rows a range read may return.
pub const DEFAULT_BATCH: usize = 100;

/// Errors reported by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("table '{0}' not found")]
    TableNotFound(String),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("column family '{family}' does not exist in table '{table}'")]
    UnknownFamily { table: String, family: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("scanner already closed")]
    ScannerClosed,
}

/// A single versioned value inside a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnValue {
    pub timestamp: u64,
    pub value: Vec<u8>,
}

/// A row as returned by the store, keyed by `family:qualifier`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub row: Vec<u8>,
    pub columns: HashMap<String, ColumnValue>,
}

/// A single-cell mutation.
#[derive(Debug, Clone)]
pub struct Put {
    pub row: Vec<u8>,
    pub family: String,
    pub qualifier: String,
    pub timestamp: u64,
    pub value: Vec<u8>,
}

/// Parameters of a bounded range read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub table: String,
    /// Inclusive start key.
    pub start_row: Vec<u8>,
    /// Exclusive stop key; empty means unbounded.
    pub stop_row: Vec<u8>,
    /// Maximum rows to return, always > 0.
    pub batch: usize,
}

impl ScanRequest {
    pub fn new(table: impl Into<String>, start_row: impl Into<Vec<u8>>) -> Self {
        Self {
            table: table.into(),
            start_row: start_row.into(),
            stop_row: Vec::new(),
            batch: DEFAULT_BATCH,
        }
    }

    pub fn with_stop_row(mut self, stop_row: impl Into<Vec<u8>>) -> Self {
        self.stop_row = stop_row.into();
        self
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }
}

/// Cursor over a range read.
#[async_trait]
pub trait Scanner: Send {
    /// Next row, or `None` once the range is exhausted.
    async fn next(&mut self) -> Result<Option<ResultRow>, StoreError>;

    fn is_closed(&self) -> bool;

    /// Release the cursor. Closing twice is a no-op.
    async fn close(&mut self);
}

/// Abstract client of the columnar store.
///
/// Implementations must be safe for concurrent use by many callers.
#[async_trait]
pub trait CellStore: Send + Sync {
    /// Read a row, optionally restricted to one `family:qualifier` column.
    ///
    /// Returns `Ok(None)` if the row (or the requested column) does not exist.
    async fn get(
        &self,
        table: &str,
        row: &[u8],
        column: Option<(&str, &str)>,
    ) -> Result<Option<ResultRow>, StoreError>;

    /// Write one cell. `Ok(false)` means the store did not apply the mutation.
    async fn put(&self, table: &str, put: Put) -> Result<bool, StoreError>;

    /// Delete one cell. `Ok(false)` means the store did not apply the mutation.
    async fn delete(
        &self,
        table: &str,
        row: &[u8],
        family: &str,
        qualifier: &str,
    ) -> Result<bool, StoreError>;

    async fn scan(&self, request: &ScanRequest) -> Result<Box<dyn Scanner>, StoreError>;

    async fn create_table(&self, table: &str, families: &[String]) -> Result<(), StoreError>;

    async fn drop_table(&self, table: &str) -> Result<(), StoreError>;

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;
}
