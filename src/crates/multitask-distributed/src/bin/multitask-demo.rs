//! multitask demo binary
//!
//! Runs a sample pipeline on either engine and prints one line per element,
//! naming the thread that computed it.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use multitask_core::{of, run_single_thread, Pipeline, VecTraversal};
use multitask_distributed::{DistributedConfig, DistributedExecutor, Role};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

static DEMO_SIZE: OnceLock<usize> = OnceLock::new();

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Engine {
    /// Concurrent futures in the calling task
    SingleThread,
    /// One worker thread per element
    Distributed,
}

/// Run a sample pipeline on the single-thread or distributed engine
#[derive(Parser, Debug)]
#[command(name = "multitask-demo")]
#[command(version)]
#[command(about = "Run a sample multitask pipeline", long_about = None)]
struct Args {
    /// Engine to run the pipeline on
    #[arg(short, long, value_enum, default_value_t = Engine::Distributed)]
    engine: Engine,

    /// Distributed engine configuration file (YAML or TOML)
    #[arg(short, long, env = "MULTITASK_CONFIG")]
    config: Option<PathBuf>,

    /// Number of elements to fan out
    #[arg(short, long, default_value_t = 10)]
    size: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Entry point shared by the coordinator and every worker
fn demo_pipeline() -> Pipeline<Vec<String>> {
    let size = DEMO_SIZE.get().copied().unwrap_or(10) as u64;

    let describe = of("element".to_string()).map(|label| {
        move |results: Vec<(u64, String)>| {
            results
                .into_iter()
                .map(|(square, worker)| format!("{} {} computed on {}", label, square, worker))
                .collect::<Vec<_>>()
        }
    });

    of((0..size).collect::<Vec<u64>>())
        .map_each(VecTraversal, |n: u64| n + 1)
        .par_map(VecTraversal, |n: u64| {
            let worker = thread::current().name().unwrap_or("unnamed").to_string();
            (n * n, worker)
        })
        .ap(describe)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let size = args.size;
    DEMO_SIZE.get_or_init(|| size);
    info!(engine = ?args.engine, size, "Starting multitask demo");

    let lines = match args.engine {
        Engine::SingleThread => run_single_thread(demo_pipeline())
            .await
            .context("single-thread run failed")?,
        Engine::Distributed => {
            let config = match &args.config {
                Some(path) => DistributedConfig::from_file_with_env(path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => DistributedConfig::from_env()?,
            };
            let executor = DistributedExecutor::new(demo_pipeline).with_config(config);
            info!(
                worker_prefix = %executor.config().worker_name_prefix,
                cancellation = %executor.config().cancellation,
                "Using distributed engine"
            );
            executor
                .run(Role::Coordinator)
                .await
                .context("distributed run failed")?
                .context("coordinator finished without a result")?
        }
    };

    for line in &lines {
        println!("{}", line);
    }

    Ok(())
}
