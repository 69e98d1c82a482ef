//! Store benchmark harness.
//!
//! # Data Flow
//! ```text
//! run()
//!     → spawn `workers` tasks, each owning its own counter
//!     → worker j issues `iterations` operations on row_<prefix>_<i>_<j>
//!     → first error ends that worker, others keep going
//!     → driver joins every task and reports wall-clock elapsed
//! ```
//!
//! Workers share nothing but the store handle.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use tokio::task::JoinSet;

use crate::store::{self, CellStore, Put, ScanRequest, StoreError, DEFAULT_BATCH};

/// Table the benchmark binary targets unless told otherwise.
pub const DEFAULT_TABLE: &str = "cellgate-bench";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BenchOp {
    Get,
    Put,
    Delete,
    Scan,
}

impl fmt::Display for BenchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BenchOp::Get => "get",
            BenchOp::Put => "put",
            BenchOp::Delete => "delete",
            BenchOp::Scan => "scan",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub op: BenchOp,
    pub workers: usize,
    pub iterations: usize,
    /// Distinguishes rows of one run from another.
    pub prefix: String,
    pub table: String,
    pub family: String,
    pub qualifier: String,
    /// Row ceiling for each scan iteration.
    pub scan_batch: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            op: BenchOp::Put,
            workers: 100,
            iterations: 100,
            prefix: default_prefix(),
            table: DEFAULT_TABLE.to_string(),
            family: "cf".to_string(),
            qualifier: "q".to_string(),
            scan_batch: DEFAULT_BATCH,
        }
    }
}

/// Current unix time in nanoseconds, as text.
pub fn default_prefix() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .to_string()
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn row_key(prefix: &str, iteration: usize, worker: usize) -> String {
    format!("row_{}_{}_{}", prefix, iteration, worker)
}

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("benchmark worker panicked or was cancelled: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("could not create table '{table}': {source}")]
    Bootstrap {
        table: String,
        #[source]
        source: StoreError,
    },
}

/// What one worker got through before finishing or failing.
#[derive(Debug, Clone)]
pub struct WorkerReport {
    pub worker: usize,
    pub completed: usize,
    pub error: Option<StoreError>,
}

#[derive(Debug, Clone)]
pub struct BenchReport {
    pub elapsed: Duration,
    /// Ordered by worker index.
    pub workers: Vec<WorkerReport>,
}

impl BenchReport {
    pub fn completed(&self) -> usize {
        self.workers.iter().map(|w| w.completed).sum()
    }

    pub fn failed_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.error.is_some()).count()
    }

    /// Operations per second over the whole run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.completed() as f64 / secs
    }
}

/// Run the configured workload and wait for every worker.
pub async fn run(store: Arc<dyn CellStore>, config: &BenchConfig) -> Result<BenchReport, BenchError> {
    tracing::info!(
        op = %config.op,
        workers = config.workers,
        iterations = config.iterations,
        prefix = %config.prefix,
        table = %config.table,
        "Benchmark starting"
    );

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for worker in 0..config.workers {
        let store = store.clone();
        let config = config.clone();
        tasks.spawn(async move { run_worker(store.as_ref(), &config, worker).await });
    }

    let mut workers = Vec::with_capacity(config.workers);
    while let Some(joined) = tasks.join_next().await {
        workers.push(joined?);
    }
    let elapsed = started.elapsed();
    workers.sort_by_key(|w| w.worker);

    let report = BenchReport { elapsed, workers };
    tracing::info!(
        elapsed_ms = elapsed.as_millis() as u64,
        completed = report.completed(),
        failed_workers = report.failed_workers(),
        "Benchmark finished"
    );
    Ok(report)
}

async fn run_worker(store: &dyn CellStore, config: &BenchConfig, worker: usize) -> WorkerReport {
    let mut completed = 0;

    for i in 0..config.iterations {
        let row = row_key(&config.prefix, i, worker);
        tracing::trace!(worker, row = %row, "Bench op");

        if let Err(e) = execute(store, config, &row, i * worker).await {
            tracing::error!(worker, iteration = i, row = %row, error = %e, "Worker stopped");
            return WorkerReport {
                worker,
                completed,
                error: Some(e),
            };
        }
        completed += 1;
    }

    WorkerReport {
        worker,
        completed,
        error: None,
    }
}

async fn execute(
    store: &dyn CellStore,
    config: &BenchConfig,
    row: &str,
    seed: usize,
) -> Result<(), StoreError> {
    match config.op {
        BenchOp::Get => {
            if let Some(found) = store.get(&config.table, row.as_bytes(), None).await? {
                tracing::trace!(row, columns = found.columns.len(), "Get result");
            }
        }
        BenchOp::Put => {
            let put = Put {
                row: row.as_bytes().to_vec(),
                family: config.family.clone(),
                qualifier: config.qualifier.clone(),
                timestamp: unix_seconds(),
                value: format!("val_{}", seed).into_bytes(),
            };
            store.put(&config.table, put).await?;
        }
        BenchOp::Delete => {
            store
                .delete(&config.table, row.as_bytes(), &config.family, &config.qualifier)
                .await?;
        }
        BenchOp::Scan => {
            let request = ScanRequest::new(config.table.as_str(), "row_").with_batch(config.scan_batch);
            let rows = store::collect_rows(store, &request).await?;
            tracing::trace!(count = rows.len(), "Scan result");
        }
    }
    Ok(())
}

/// Create `table`. If that fails, drop it and try exactly once more.
pub async fn bootstrap_table(
    store: &dyn CellStore,
    table: &str,
    families: &[String],
) -> Result<(), BenchError> {
    match store.create_table(table, families).await {
        Ok(()) => return Ok(()),
        Err(e) => {
            tracing::warn!(table, error = %e, "Create failed, dropping and retrying once");
        }
    }

    if let Err(e) = store.drop_table(table).await {
        tracing::debug!(table, error = %e, "Drop before recreate failed");
    }

    store
        .create_table(table, families)
        .await
        .map_err(|source| BenchError::Bootstrap {
            table: table.to_string(),
            source,
        })
}

/// Drop `table` if present, then create it fresh.
pub async fn reset_table(
    store: &dyn CellStore,
    table: &str,
    families: &[String],
) -> Result<(), BenchError> {
    if let Err(e) = store.drop_table(table).await {
        tracing::debug!(table, error = %e, "Nothing to drop");
    }
    bootstrap_table(store, table, families).await
}
