//! CLI struct definitions for the helmsman command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "helmsman",
    version = env!("CARGO_PKG_VERSION"),
    about = "Helmsman arbitrates weighted piecewise-linear objective functions from independent behaviors into one decision per cycle. 🦀"
)]
pub(crate) struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Solve one problem file and print the decision
    Solve {
        /// Problem file (`domain = ...` and `ipf = ...` lines)
        file: PathBuf,
        /// Visit every branch instead of pruning on the bound
        #[clap(long)]
        full_tree: bool,
        /// Accept a solution within this percentage of optimal (0 < thresh <= 100)
        #[clap(long, default_value_t = 100.0)]
        thresh: f64,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Cross-check pruned against full-tree search on problem files
    Verify {
        #[clap(required = true)]
        files: Vec<PathBuf>,
        /// Largest accepted difference between the two optima
        #[clap(long, default_value_t = 1e-6)]
        epsilon: f64,
    },
    /// Load a helm configuration and report any problems
    Check {
        config: PathBuf,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Run the helm against a scripted bus and print publications as JSON lines
    Run {
        config: PathBuf,
        /// Number of cycles to run
        #[clap(long, default_value_t = 10)]
        cycles: u64,
        /// Script of `<cycle>: KEY=value` lines delivered before that cycle
        #[clap(long)]
        script: Option<PathBuf>,
        /// Simulated seconds per cycle
        #[clap(long, default_value_t = 0.25)]
        step: f64,
    },
}
