// Entrypoint for the CLI application.
// - Keeps `main` small: parse flags, set up logging and hand over to `ui::run`.
// - Any setup or validation error maps to exit code 1.

use clap::Parser;
use openwebui_uploader::{logging, ui};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = ui::Args::parse();
    logging::init(args.verbose);

    match ui::run(&args) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(ui::EXIT_FAILURE)
        }
    }
}
