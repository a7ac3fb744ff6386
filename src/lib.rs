pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod imaging;
pub mod logging;
pub mod session;
pub mod settings;
pub mod store;
pub mod terminal;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
    time::Duration,
};
use tokio_util::sync::CancellationToken;

use crate::config::{Cli, ExplorerConfig};
use crate::db::Database;
use crate::session::{
    commands::{parse_line, ShellInput, HELP_TEXT},
    run_session, SessionCommand, SessionController,
};
use crate::settings::{SettingsPersister, SettingsStore};
use crate::terminal::TerminalRenderer;

const COMMAND_QUEUE_DEPTH: usize = 64;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    info!("Stats explorer starting up...");

    let config = ExplorerConfig::load(&cli)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(run_interactive(config));
    // Stdin reads cannot be cancelled; don't wait for the next line.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run_interactive(config: ExplorerConfig) -> Result<()> {
    let database = Database::open_read_only(config.database_path.clone())?;
    let settings_store = SettingsStore::new(config.settings_path.clone());
    let document = settings_store.load();

    let mut controller = SessionController::new(
        Arc::new(database),
        TerminalRenderer::stdout(),
        config.session_options(),
        &document,
    );
    controller.start().await?;

    let mut persister = SettingsPersister::new(settings_store, config.save_delay());
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let cancel_token = CancellationToken::new();

    tokio::spawn(read_commands(command_tx, cancel_token.clone()));
    tokio::spawn({
        let token = cancel_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, closing session");
                token.cancel();
            }
        }
    });

    let exit = run_session(
        &mut controller,
        &mut persister,
        command_rx,
        cancel_token.clone(),
        config.export_dir.clone(),
    )
    .await;
    cancel_token.cancel();

    let exit = exit?;
    info!("Session ended ({exit:?})");
    Ok(())
}

/// Feeds parsed stdin lines to the session until EOF, `quit` or cancellation.
async fn read_commands(commands: mpsc::Sender<SessionCommand>, cancel_token: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type 'help' for commands.");

    loop {
        let line = tokio::select! {
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => match parse_line(&line) {
                Ok(ShellInput::Command(command)) => {
                    let closing = command == SessionCommand::Close;
                    if commands.send(command).await.is_err() || closing {
                        break;
                    }
                }
                Ok(ShellInput::Help) => println!("{HELP_TEXT}"),
                Ok(ShellInput::Empty) => {}
                Err(err) => eprintln!("{err}"),
            },
            Ok(None) => break,
            Err(err) => {
                warn!("Failed to read input: {err}");
                break;
            }
        }
    }
}
