//! Bounded range reads.
//!
//! Drives a [`Scanner`] over `[start_row, stop_row)` and materializes at most
//! `batch` rows. The cursor is closed on every exit path.

use super::{CellStore, ResultRow, ScanRequest, Scanner, StoreError};

/// Run a range read to completion and return the collected rows.
///
/// Stops when the cursor is exhausted, reports itself closed, or `batch`
/// rows have been collected, whichever comes first.
pub async fn collect_rows(
    store: &dyn CellStore,
    request: &ScanRequest,
) -> Result<Vec<ResultRow>, StoreError> {
    let mut scanner = store.scan(request).await?;
    let result = drain(scanner.as_mut(), request.batch).await;
    scanner.close().await;

    if let Ok(rows) = &result {
        tracing::debug!(
            table = %request.table,
            batch = request.batch,
            rows = rows.len(),
            "Scan finished"
        );
    }
    result
}

async fn drain(scanner: &mut dyn Scanner, batch: usize) -> Result<Vec<ResultRow>, StoreError> {
    let mut rows = Vec::new();
    while rows.len() < batch {
        let Some(row) = scanner.next().await? else {
            break;
        };
        if scanner.is_closed() {
            break;
        }
        rows.push(row);
    }
    Ok(rows)
}
