use std::path::PathBuf;

use chrono::Local;
use log::{error, info, warn};
use tokio::{
    sync::mpsc,
    time::{sleep_until, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::ExplorerResult,
    settings::{SettingsPersister, SettingsSink},
};

use super::{
    controller::SessionController,
    events::{Persist, SessionCommand},
    render::Renderer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Closed,
    InputClosed,
    Cancelled,
}

/// Drives one session until it is closed.
///
/// Commands are handled strictly one at a time and each runs its cascade to
/// completion, so a debounced save always snapshots a resolved selection.
/// Every exit path, including a fatal store error, writes settings
/// immediately before returning. A fatal error can interrupt a cascade
/// half way, so that path writes the selection left by the last command
/// that completed.
pub async fn run_session<R, S>(
    controller: &mut SessionController<R>,
    persister: &mut SettingsPersister<S>,
    mut commands: mpsc::Receiver<SessionCommand>,
    cancel_token: CancellationToken,
    export_dir: PathBuf,
) -> ExplorerResult<SessionExit>
where
    R: Renderer,
    S: SettingsSink,
{
    let mut last_resolved = controller.settings_snapshot();

    let outcome = loop {
        let deadline = persister.deadline();

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                info!("Session cancelled");
                break Ok(SessionExit::Cancelled);
            }
            command = commands.recv() => {
                let Some(command) = command else {
                    info!("Command input closed");
                    break Ok(SessionExit::InputClosed);
                };
                match command {
                    SessionCommand::Event(event) => match controller.handle(event).await {
                        Ok(persist) => {
                            if persist == Persist::Debounced {
                                persister.schedule_save(Instant::now());
                            }
                            last_resolved = controller.settings_snapshot();
                        }
                        Err(err) if err.is_fatal() => {
                            error!("{err}");
                            break Err(err);
                        }
                        Err(err) => warn!("{err}"),
                    },
                    SessionCommand::Export(dir) => {
                        let dir = dir.unwrap_or_else(|| export_dir.clone());
                        let message = match controller.export_snapshot(&dir, Local::now().naive_local()) {
                            Ok(path) => format!("Saved {}", path.display()),
                            Err(err) => {
                                warn!("Export failed: {err:#}");
                                format!("Export failed: {err:#}")
                            }
                        };
                        controller.renderer_mut().notify(&message);
                    }
                    SessionCommand::Status => {
                        let line = controller.status_line();
                        controller.renderer_mut().notify(&line);
                    }
                    SessionCommand::List(kind) => {
                        let text = controller.listing(kind);
                        controller.renderer_mut().notify(&text);
                    }
                    SessionCommand::Close => break Ok(SessionExit::Closed),
                }
            }
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                persister.poll(Instant::now(), || controller.settings_snapshot());
            }
        }
    };

    let document = if outcome.is_err() {
        last_resolved
    } else {
        controller.settings_snapshot()
    };
    if let Err(err) = persister.save_now(&document) {
        error!("{err}");
    }
    outcome
}
