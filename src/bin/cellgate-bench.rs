use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cellgate::bench::{self, BenchConfig, BenchOp};
use cellgate::store::{CellStore, MemoryStore};

#[derive(Parser)]
#[command(name = "cellgate-bench", version)]
#[command(about = "Concurrent store benchmark", long_about = None)]
struct Cli {
    /// Operation every worker issues.
    #[arg(short = 'm', long, value_enum, default_value_t = BenchOp::Put)]
    op: BenchOp,

    /// Row prefix; defaults to the current unix time in nanoseconds.
    #[arg(short, long)]
    prefix: Option<String>,

    #[arg(short, long, default_value_t = 100)]
    workers: usize,

    #[arg(short, long, default_value_t = 100)]
    iterations: usize,

    #[arg(short, long, default_value = bench::DEFAULT_TABLE)]
    table: String,

    /// Only (re)create the table, then exit.
    #[arg(long)]
    init: bool,

    /// Write every row once before the measured run.
    #[arg(long)]
    seed: bool,

    /// Runtime worker threads; the runtime default when unset.
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cellgate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = cli.threads {
        builder.worker_threads(threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> ExitCode {
    let config = BenchConfig {
        op: cli.op,
        workers: cli.workers,
        iterations: cli.iterations,
        prefix: cli.prefix.unwrap_or_else(bench::default_prefix),
        table: cli.table,
        ..BenchConfig::default()
    };
    let families = vec![config.family.clone()];
    let store: Arc<dyn CellStore> = Arc::new(MemoryStore::new());

    if cli.init {
        return match bench::reset_table(store.as_ref(), &config.table, &families).await {
            Ok(()) => {
                tracing::info!(table = %config.table, "Table initialized");
                ExitCode::SUCCESS
            }
            Err(e) => {
                tracing::error!(error = %e, "Init failed");
                ExitCode::FAILURE
            }
        };
    }

    if let Err(e) = bench::bootstrap_table(store.as_ref(), &config.table, &families).await {
        tracing::error!(error = %e, "Bootstrap failed");
        return ExitCode::FAILURE;
    }

    if cli.seed && config.op != BenchOp::Put {
        let seeding = BenchConfig {
            op: BenchOp::Put,
            ..config.clone()
        };
        if let Err(e) = bench::run(store.clone(), &seeding).await {
            tracing::error!(error = %e, "Seeding failed");
            return ExitCode::FAILURE;
        }
    }

    let report = match bench::run(store, &config).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Benchmark failed");
            return ExitCode::FAILURE;
        }
    };

    println!("op:          {}", config.op);
    println!("workers:     {}", config.workers);
    println!("iterations:  {}", config.iterations);
    println!("completed:   {}", report.completed());
    println!("failed:      {}", report.failed_workers());
    println!("took:        {:?}", report.elapsed);
    println!("ops/sec:     {:.2}", report.throughput());

    if report.failed_workers() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
