//! compositedb CLI entry point
//!
//! This is a minimal entrypoint that:
//! 1. Parses CLI arguments
//! 2. Installs the tracing subscriber (level from `RUST_LOG`)
//! 3. Dispatches to CLI commands
//! 4. Prints errors to stderr and exits with non-zero on failure
//!
//! All logic is delegated to the CLI module.

use compositedb::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() {
    let args = Cli::parse_args();
    init_tracing(args.log_json);

    if let Err(e) = cli::run_command(args.command) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
