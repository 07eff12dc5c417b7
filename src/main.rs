use std::process::ExitCode;

use clap::Parser;
use fuzzkit::cli::Cli;
use fuzzkit::error::{classify, Report};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Diagnostics go to stderr, stdout is reserved for results
    let default_directive = if cli.verbose { "fuzzkit=debug" } else { "fuzzkit=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .with_target(false)
        .without_time()
        .compact()
        .init();

    match fuzzkit::commands::run(cli).await {
        Ok(code) => u8::try_from(code)
            .map(ExitCode::from)
            .unwrap_or(ExitCode::FAILURE),
        Err(err) => {
            match classify(&err) {
                Report::Quiet => {}
                Report::Concise => eprintln!("error: {err}"),
                Report::Full => eprintln!("error: {err:?}"),
            }
            ExitCode::FAILURE
        }
    }
}
