//! AutoML CLI
//!
//! Parses arguments, then hands over to the dispatcher, which loads the
//! configuration, installs logging and runs the command.

use clap::Parser;

use automl::cli::{run_cli_mode, Args};

fn main() {
    // clap prints help/version and usage errors itself
    let args = Args::parse();
    let exit_code = run_cli_mode(args);
    std::process::exit(exit_code);
}
