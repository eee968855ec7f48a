//! CLI argument definitions using clap
//!
//! Commands:
//! - compositedb find --fixture <path> [--request <path>] [--config <path>]
//! - compositedb explain --fixture <path> [--request <path>] [--config <path>]
//!
//! Without `--request` the request is read from stdin as one JSON object.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// compositedb - deterministic composite-entity finds over independently
/// stored entities
#[derive(Parser, Debug)]
#[command(name = "compositedb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a composite find and print the assembled documents
    Find {
        /// Fixture with schemas, documents and caller roles
        #[arg(long)]
        fixture: PathBuf,

        /// Request file; stdin when absent
        #[arg(long)]
        request: Option<PathBuf>,

        /// Finder configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the search and retrieval plans of a composite find
    Explain {
        /// Fixture with schemas, documents and caller roles
        #[arg(long)]
        fixture: PathBuf,

        /// Request file; stdin when absent
        #[arg(long)]
        request: Option<PathBuf>,

        /// Finder configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_find() {
        let cli = Cli::try_parse_from([
            "compositedb",
            "find",
            "--fixture",
            "fixture.json",
            "--request",
            "request.json",
            "--log-json",
        ])
        .unwrap();
        assert!(cli.log_json);
        match cli.command {
            Command::Find { fixture, request, config } => {
                assert_eq!(fixture, PathBuf::from("fixture.json"));
                assert_eq!(request, Some(PathBuf::from("request.json")));
                assert!(config.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_fixture_is_required() {
        assert!(Cli::try_parse_from(["compositedb", "explain"]).is_err());
    }
}
