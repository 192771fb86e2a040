use matchdl_core::logging;

mod cli;

use crate::cli::CliCommand;

fn main() {
    // Log file first; fall back to stderr so a broken state dir still gets diagnostics.
    if let Err(err) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable: {:#}", err);
    }

    if let Err(err) = CliCommand::run_from_args() {
        tracing::error!("{:#}", err);
        eprintln!("matchdl error: {:#}", err);
        std::process::exit(1);
    }
}
