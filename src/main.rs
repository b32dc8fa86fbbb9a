//! jobstore binary entry point.

use std::process::ExitCode;

fn main() -> ExitCode {
    match jobstore::cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            jobstore::ui::output::error(format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
