use std::process::ExitCode;

use repo_slice::cli;

fn init_tracing(debug: bool) {
    let default_filter = if debug { "repo_slice=debug" } else { "repo_slice=warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_env("REPO_SLICE_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let (command, global) = match cli::parse_args(&argv) {
        Ok(parsed) => parsed,
        Err(err) => {
            cli::dispatch::report_error(&err);
            return ExitCode::from(err.exit_code() as u8);
        }
    };
    init_tracing(global.debug);

    match cli::run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            cli::dispatch::report_error(&err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
