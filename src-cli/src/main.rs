use std::process::ExitCode;

use clap::Parser;
use knowledge_assistant_lib::{init_logging, run, Cli};

fn main() -> ExitCode {
    init_logging("info");
    let cli = Cli::parse();
    let stdout = std::io::stdout();
    match run(cli, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = %e.code, "command failed");
            eprintln!("error: {e}");
            if e.is_config() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
