use clap::{Parser, Subcommand};

/// CLI harness wiring config, logging, and the in-memory metadata/executor
/// fakes together so the orchestrator can be exercised end-to-end from a
/// terminal. Not a production transport — the
/// gRPC jobs API this would sit behind is out of scope.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit one or more demo `RUN_MODEL` jobs against the in-memory
    /// executor/metadata fakes and watch them to `REMOVAL_SCHEDULED`,
    /// printing each cache-status transition as it's observed.
    Run {
        /// Number of demo jobs to submit.
        #[arg(long, default_value_t = 1)]
        jobs: usize,

        /// Seconds to wait for all jobs to finish before giving up.
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Print the fully resolved configuration (defaults + file + env) as
    /// TOML, without starting anything.
    PrintConfig,
}
