// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bubblescan: answer-sheet scanning and grading from the command line.
//
// Entry point. Initialises logging, parses the command and runs it.

mod cli;
mod services;

use std::process::ExitCode;

use bubblescan_core::human_errors::humanize_error;

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so `--json` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse_checked(std::env::args_os()) {
        Ok(cli) => cli,
        // Prints usage or help; exit code 2 for usage errors, 0 for --help.
        Err(err) => err.exit(),
    };

    tracing::debug!(command = ?cli.command, "Bubblescan starting");

    match services::run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            let human = humanize_error(&err);
            eprintln!("{}\n{}", human.message, human.suggestion);
            ExitCode::FAILURE
        }
    }
}
