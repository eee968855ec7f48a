//! CLI module for compositedb
//!
//! Provides command-line interface for:
//! - find: One-shot composite find over a fixture
//! - explain: The plans a find would use, without running it

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, find, run_command, Fixture};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, write_error, write_response};
