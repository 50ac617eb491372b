//! `mailledger-check` - SMTP and IMAP conformance runner
//!
//! Drives scripted dialogues against a live mail server and reports one
//! pass/fail line per scenario session. Exits non-zero if any scenario fails.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod runner;

use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so reports on stdout stay machine-readable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let plan = cli
        .scenario
        .scenarios()
        .into_iter()
        .map(|scenario| (scenario, cli.config_for(scenario)))
        .collect();

    info!(host = %cli.host, sessions = cli.sessions, "starting conformance run");
    let reports = runner::run(plan, cli.fixture(), cli.sessions).await;

    for report in &reports {
        if cli.json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            println!("{report}");
        }
    }

    let (passed, failed) = runner::tally(&reports);
    info!(passed, failed, "conformance run finished");

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
