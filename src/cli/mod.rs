//! `clap`-derived command-line front end (§4.11).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "testdrive", version, about = "Phase-parallel system-test scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity; repeatable (`-v`, `-vv`). Overrides `RUST_LOG`
    /// when present.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Construct a scheduler for the given test names and drive it to completion.
    Run(RunArgs),
    /// Same as `run`, but reconstitutes in-flight state from each test's `TestStatus.log`.
    Resume(ResumeArgs),
    /// Print a summary of a prior run's `TestStatus.log` without touching any test directory.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Test names, e.g. `SMS_D.f09_g16.X`.
    #[arg(required = true)]
    pub tests: Vec<String>,

    #[command(flatten)]
    pub flags: GlobalFlags,
}

#[derive(Debug, Args)]
pub struct ResumeArgs {
    #[arg(required = true)]
    pub tests: Vec<String>,

    /// Force a rebuild: `SHAREDLIB_BUILD` is re-run even if its last recorded status was `PASS`.
    #[arg(long)]
    pub force_rebuild: bool,

    #[command(flatten)]
    pub flags: GlobalFlags,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    pub test_root: PathBuf,
    pub test_id: String,
}

/// Flags mirroring the `Config` inputs in §4.10/§6.
#[derive(Debug, Args, Default)]
pub struct GlobalFlags {
    #[arg(long)]
    pub no_setup: bool,
    #[arg(long)]
    pub no_build: bool,
    #[arg(long)]
    pub no_run: bool,
    #[arg(long)]
    pub namelists_only: bool,
    #[arg(long)]
    pub no_batch: bool,
    #[arg(long)]
    pub single_exe: bool,
    #[arg(long)]
    pub share_exes: bool,
    #[arg(long)]
    pub parallel_jobs: Option<u32>,
    #[arg(long)]
    pub proc_pool: Option<u32>,
    #[arg(long)]
    pub force_procs: Option<u32>,
    #[arg(long)]
    pub force_threads: Option<u32>,
    #[arg(long)]
    pub project: Option<String>,
    #[arg(long)]
    pub test_root: Option<PathBuf>,
    #[arg(long)]
    pub output_root: Option<PathBuf>,
    #[arg(long)]
    pub queue: Option<String>,
    #[arg(long)]
    pub walltime: Option<String>,
}
