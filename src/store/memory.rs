//! In-process store backend.
//!
//! Tables live in a `RwLock<HashMap>`; each table keeps its rows in a
//! `BTreeMap` so range reads see keys in byte order, while the columns of a
//! row are a `HashMap` and come back in arbitrary order.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{CellStore, ColumnValue, Put, ResultRow, ScanRequest, Scanner, StoreError};

/// Rows fetched from the table per scanner refill.
const SCANNER_CACHE_ROWS: usize = 32;

#[derive(Debug, Default)]
struct Table {
    families: HashSet<String>,
    rows: BTreeMap<Vec<u8>, HashMap<String, ColumnValue>>,
}

type Tables = Arc<RwLock<HashMap<String, Table>>>;

/// Thread-safe in-memory implementation of [`CellStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Tables,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".to_string()))
    }
}

fn column_key(family: &str, qualifier: &str) -> String {
    format!("{}:{}", family, qualifier)
}

#[async_trait]
impl CellStore for MemoryStore {
    async fn get(
        &self,
        table: &str,
        row: &[u8],
        column: Option<(&str, &str)>,
    ) -> Result<Option<ResultRow>, StoreError> {
        let tables = self.read()?;
        let t = tables
            .get(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        let Some(cells) = t.rows.get(row) else {
            return Ok(None);
        };

        let columns: HashMap<String, ColumnValue> = match column {
            Some((family, qualifier)) => {
                let key = column_key(family, qualifier);
                match cells.get(&key) {
                    Some(v) => HashMap::from([(key, v.clone())]),
                    None => return Ok(None),
                }
            }
            None => cells.clone(),
        };

        Ok(Some(ResultRow {
            row: row.to_vec(),
            columns,
        }))
    }

    async fn put(&self, table: &str, put: Put) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        if !t.families.contains(&put.family) {
            return Err(StoreError::UnknownFamily {
                table: table.to_string(),
                family: put.family,
            });
        }

        t.rows.entry(put.row).or_default().insert(
            column_key(&put.family, &put.qualifier),
            ColumnValue {
                timestamp: put.timestamp,
                value: put.value,
            },
        );
        Ok(true)
    }

    async fn delete(
        &self,
        table: &str,
        row: &[u8],
        family: &str,
        qualifier: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.write()?;
        let t = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))?;

        // Deleting an absent cell is still an applied mutation.
        if let Some(cells) = t.rows.get_mut(row) {
            cells.remove(&column_key(family, qualifier));
            if cells.is_empty() {
                t.rows.remove(row);
            }
        }
        Ok(true)
    }

    async fn scan(&self, request: &ScanRequest) -> Result<Box<dyn Scanner>, StoreError> {
        if !self.read()?.contains_key(&request.table) {
            return Err(StoreError::TableNotFound(request.table.clone()));
        }

        Ok(Box::new(MemoryScanner {
            tables: Arc::clone(&self.tables),
            table: request.table.clone(),
            next_start: Bound::Included(request.start_row.clone()),
            stop_row: request.stop_row.clone(),
            cache: VecDeque::new(),
            exhausted: false,
            closed: false,
        }))
    }

    async fn create_table(&self, table: &str, families: &[String]) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.contains_key(table) {
            return Err(StoreError::TableExists(table.to_string()));
        }
        tables.insert(
            table.to_string(),
            Table {
                families: families.iter().cloned().collect(),
                rows: BTreeMap::new(),
            },
        );
        tracing::debug!(table, ?families, "Table created");
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        if self.write()?.remove(table).is_none() {
            return Err(StoreError::TableNotFound(table.to_string()));
        }
        tracing::debug!(table, "Table dropped");
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.contains_key(table))
    }
}

/// Cursor that pages through a table in small chunks, re-reading from the
/// last key seen so concurrent writers are observed between refills.
struct MemoryScanner {
    tables: Tables,
    table: String,
    next_start: Bound<Vec<u8>>,
    stop_row: Vec<u8>,
    cache: VecDeque<ResultRow>,
    exhausted: bool,
    closed: bool,
}

impl MemoryScanner {
    fn refill(&mut self) -> Result<(), StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Unavailable("table lock poisoned".to_string()))?;
        let t = tables
            .get(&self.table)
            .ok_or_else(|| StoreError::TableNotFound(self.table.clone()))?;

        let upper = if self.stop_row.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(self.stop_row.clone())
        };

        // An inverted range yields nothing rather than panicking inside BTreeMap.
        if let (Bound::Included(start) | Bound::Excluded(start), Bound::Excluded(stop)) =
            (&self.next_start, &upper)
        {
            if start >= stop {
                self.exhausted = true;
                return Ok(());
            }
        }

        for (key, cells) in t
            .rows
            .range((self.next_start.clone(), upper))
            .take(SCANNER_CACHE_ROWS)
        {
            self.cache.push_back(ResultRow {
                row: key.clone(),
                columns: cells.clone(),
            });
        }

        match self.cache.back() {
            Some(last) if self.cache.len() == SCANNER_CACHE_ROWS => {
                self.next_start = Bound::Excluded(last.row.clone());
            }
            _ => self.exhausted = true,
        }
        Ok(())
    }
}

#[async_trait]
impl Scanner for MemoryScanner {
    async fn next(&mut self) -> Result<Option<ResultRow>, StoreError> {
        if self.closed {
            return Err(StoreError::ScannerClosed);
        }
        if self.cache.is_empty() && !self.exhausted {
            self.refill()?;
        }
        Ok(self.cache.pop_front())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) {
        self.closed = true;
        self.cache.clear();
    }
}
