mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use splitsum_compute::{ParallelSum, Range, Splitter, bench};
use splitsum_core::load_dotenv;

use crate::cli::{CliArgs, Command};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();
    let config = config::resolve(&args)?;
    config.log_summary();

    match args.command {
        Command::Explain { n } => {
            let splitter = Splitter::new(config.compute.threshold)?;
            let leaves = splitter.leaves(Range::full(n));
            println!(
                "{} leaves, {} splits (threshold {})",
                leaves.len(),
                splitter.split_count(Range::full(n)),
                splitter.threshold()
            );
            for leaf in leaves {
                println!("  {} len={}", leaf, leaf.len());
            }
        }
        Command::Sum { n, json } => {
            let driver = ParallelSum::from_config(&config.compute)
                .context("failed to start fork/join pool")?;
            let total = driver
                .sum_closed_range(n)
                .with_context(|| format!("parallel sum of 1..={} failed", n))?;

            if json {
                let out = serde_json::json!({
                    "n": n,
                    "total": total,
                    "metrics": driver.metrics(),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", total);
            }
        }
        Command::Bench { n, iterations, json } => {
            let driver = ParallelSum::from_config(&config.compute)
                .context("failed to start fork/join pool")?;
            info!(n, iterations, workers = driver.worker_threads(), "running benchmark");
            let reports = bench::run(&driver, n, iterations).context("benchmark failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                println!("{:<10} {:>14} {:>22}", "strategy", "avg ms", "total");
                for r in &reports {
                    println!(
                        "{:<10} {:>14.3} {:>22}",
                        format!("{:?}", r.strategy),
                        r.avg.as_secs_f64() * 1_000.0,
                        r.total
                    );
                }
            }
        }
    }

    Ok(())
}
