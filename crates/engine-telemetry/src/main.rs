mod console;
mod runtime;

use std::process::ExitCode;

fn main() -> ExitCode {
    match runtime::run_from_args() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("engine-telemetry: {e}");
            ExitCode::FAILURE
        }
    }
}
