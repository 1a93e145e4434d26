use clap::Parser;
use tracing_subscriber::EnvFilter;

use testdrive::cli::Cli;

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(level)
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match testdrive::dispatch(cli) {
        Ok(code) => std::process::exit(code.code()),
        Err(err) => {
            tracing::error!(error = %err, "run failed");
            std::process::exit(err.exit_code().code());
        }
    }
}
