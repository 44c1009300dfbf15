//! gmail-cleanup - Safe bulk cleanup for a Gmail mailbox
//!
//! Every command is a dry run unless told otherwise: `label` asks for `YES`,
//! `trash` needs `--execute` and the typed `TRASH <n>` phrase.
//!
//! Exit codes: 0 success or nothing to do, 1 cancelled or failed,
//! 2 refused (invalid input or safety limit).

use clap::Parser;
use cleanup::{AppConfig, CleanupError, GmailAuth, GmailClient, GmailCredentials};
use log::{debug, error};
use std::process::ExitCode;

mod cli;
mod commands;
mod output;
mod prompt;

use cli::Cli;
use commands::App;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let app_config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config: {e:#}");
            return ExitCode::from(2);
        }
    };
    debug!("Loaded config: {:?}", app_config);

    let mut app = App::new(app_config, cli.json, connect, prompt::ask);
    match app.run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

/// Build the Gmail client; authentication happens on first use
fn connect() -> anyhow::Result<GmailClient> {
    let credentials = GmailCredentials::load()?;
    Ok(GmailClient::new(GmailAuth::new(credentials)?))
}

fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<CleanupError>() {
        Some(CleanupError::Cancelled) => {
            eprintln!("Cancelled.");
            ExitCode::from(1)
        }
        Some(e) if e.is_refusal() => {
            eprintln!("Refusing. {e}");
            if matches!(e, CleanupError::Validation(msg) if msg.contains("empty query")) {
                eprintln!("Tip: provide --from, --subject, --older-than, or --q.");
            }
            ExitCode::from(2)
        }
        Some(CleanupError::MutationHalted { completed, .. }) => {
            eprintln!("Error: {err:#}");
            eprintln!("{completed} messages were already changed before the failure.");
            ExitCode::from(1)
        }
        _ => {
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}
