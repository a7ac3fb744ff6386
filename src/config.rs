//! Layered configuration: defaults, then an optional TOML file, then
//! `STATS_EXPLORER_*` environment variables, then the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tokio::time::Duration;

use crate::imaging::DEFAULT_MAX_EDGE;
use crate::session::{SessionOptions, TagRelabel};

pub const DEFAULT_CONFIG_FILE: &str = "stats-explorer.toml";
pub const ENV_PREFIX: &str = "STATS_EXPLORER";

#[derive(Debug, Parser)]
#[command(name = "stats-explorer", version, about = "Browse recorded experiment telemetry")]
pub struct Cli {
    /// TOML configuration file (defaults to ./stats-explorer.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// SQLite telemetry database
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Settings JSON file
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplorerConfig {
    pub database_path: PathBuf,
    pub settings_path: PathBuf,
    pub save_debounce_ms: u64,
    pub display_substitution: TagRelabel,
    pub image_max_edge: u32,
    pub export_dir: PathBuf,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("brain_stats.sqlite3"),
            settings_path: PathBuf::from("brain_stats_settings.json"),
            save_debounce_ms: 500,
            display_substitution: TagRelabel::default(),
            image_max_edge: DEFAULT_MAX_EDGE,
            export_dir: PathBuf::from("."),
        }
    }
}

impl ExplorerConfig {
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::load_with_env(cli, Environment::with_prefix(ENV_PREFIX))
    }

    pub fn load_with_env(cli: &Cli, env: Environment) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => File::from(path.as_path()).format(FileFormat::Toml).required(true),
            None => File::new(DEFAULT_CONFIG_FILE, FileFormat::Toml).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(env.prefix_separator("_").separator("__").try_parsing(true))
            .build()
            .context("failed to read configuration")?;

        let mut loaded: ExplorerConfig = settings
            .try_deserialize()
            .context("invalid configuration")?;

        if let Some(db) = &cli.db {
            loaded.database_path = db.clone();
        }
        if let Some(path) = &cli.settings {
            loaded.settings_path = path.clone();
        }
        Ok(loaded)
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            relabel: self.display_substitution.clone(),
            image_max_edge: self.image_max_edge,
            ..SessionOptions::default()
        }
    }
}
