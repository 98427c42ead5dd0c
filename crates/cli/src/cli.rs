use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Fork/join parallel sums over `1..=N`.
#[derive(Parser, Debug)]
#[command(name = "splitsum", version, about = "Fork/join parallel sums over 1..=N")]
pub struct CliArgs {
    /// Path to a TOML config file with compute settings.
    #[arg(long, env = "SPLITSUM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Largest range reduced sequentially (overrides config and env).
    #[arg(long, global = true)]
    pub threshold: Option<usize>,

    /// Worker thread count, 0 = available parallelism (overrides config and env).
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sum 1..=N on the fork/join pool.
    Sum {
        #[arg(long, default_value_t = 10_000_000)]
        n: u64,

        /// Print the total and pool metrics as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Time the iterator, loop, rayon and fork/join strategies on 1..=N.
    Bench {
        #[arg(long, default_value_t = 10_000_000)]
        n: u64,

        #[arg(long, default_value_t = 5)]
        iterations: usize,

        /// Print the reports as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the leaf ranges the splitter produces for N elements.
    Explain {
        #[arg(long)]
        n: usize,
    },
}
