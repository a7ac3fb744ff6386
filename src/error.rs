use thiserror::Error;

/// Failures the explorer distinguishes between.
///
/// Only [`ExplorerError::StoreUnavailable`] ends a session. Everything else is
/// logged and degraded to the nearest empty/default state by the caller. An
/// empty query result is not an error at all.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("telemetry store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("could not decode image at step {step}: {message}")]
    Decode { step: i64, message: String },

    #[error("failed to load settings: {0}")]
    SettingsLoad(String),

    #[error("failed to save settings: {0}")]
    SettingsSave(String),
}

impl ExplorerError {
    pub fn store(err: anyhow::Error) -> Self {
        ExplorerError::StoreUnavailable(format!("{err:#}"))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExplorerError::StoreUnavailable(_))
    }
}

pub type ExplorerResult<T> = Result<T, ExplorerError>;
