//! Persisted viewer settings.
//!
//! The document is a flat JSON object. Loading is best-effort and per field:
//! a field that is missing or invalid falls back to its default without
//! affecting the others.

use std::{fs, path::PathBuf};

use log::{debug, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

use crate::db::TelemetryKind;
use crate::error::{ExplorerError, ExplorerResult};
use crate::session::state::{Color, LayoutState, PlotStyling};

pub mod debounce;

pub use debounce::{Debouncer, SettingsPersister, DEFAULT_SAVE_DELAY};

/// What survives a restart: styling, layout and the last resolved selection.
///
/// Derived study/tag lists, the multi-selection and the image position are
/// deliberately absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDocument {
    pub styling: PlotStyling,
    pub last_machine: Option<String>,
    pub last_study: Option<String>,
    pub last_type: Option<TelemetryKind>,
    pub last_tag: Option<String>,
    pub layout: LayoutState,
}

#[derive(Serialize)]
struct StoredSettings<'a> {
    log_scale: bool,
    show_dots: bool,
    h_grid: bool,
    v_grid: bool,
    grid_color: Color,
    line_color: Color,
    last_study: &'a str,
    last_type: &'a str,
    last_tag: &'a str,
    last_machine: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    window_geometry: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pane_sash_position: Option<i64>,
}

impl SettingsDocument {
    pub fn to_json(&self) -> ExplorerResult<String> {
        let stored = StoredSettings {
            log_scale: self.styling.log_scale_y,
            show_dots: self.styling.show_markers,
            h_grid: self.styling.show_h_grid,
            v_grid: self.styling.show_v_grid,
            grid_color: self.styling.grid_color,
            line_color: self.styling.line_color,
            last_study: self.last_study.as_deref().unwrap_or_default(),
            last_type: self.last_type.map(|kind| kind.as_str()).unwrap_or_default(),
            last_tag: self.last_tag.as_deref().unwrap_or_default(),
            last_machine: self.last_machine.as_deref().unwrap_or_default(),
            window_geometry: self.layout.window_geometry.as_deref(),
            pane_sash_position: self.layout.pane_sash_position,
        };
        serde_json::to_string_pretty(&stored).map_err(|err| ExplorerError::SettingsSave(err.to_string()))
    }

    /// Fails only when the text is not a JSON object at all.
    pub fn from_json(contents: &str) -> ExplorerResult<Self> {
        let value: Value = serde_json::from_str(contents)
            .map_err(|err| ExplorerError::SettingsLoad(format!("not valid JSON: {err}")))?;
        let Value::Object(map) = value else {
            return Err(ExplorerError::SettingsLoad(
                "settings document is not a JSON object".into(),
            ));
        };
        Ok(Self::from_map(&map))
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let defaults = PlotStyling::default();
        let styling = PlotStyling {
            log_scale_y: field(map, "log_scale").unwrap_or(defaults.log_scale_y),
            show_markers: field(map, "show_dots").unwrap_or(defaults.show_markers),
            show_h_grid: field(map, "h_grid").unwrap_or(defaults.show_h_grid),
            show_v_grid: field(map, "v_grid").unwrap_or(defaults.show_v_grid),
            grid_color: color_field(map, "grid_color", Color::is_grid_color)
                .unwrap_or(defaults.grid_color),
            line_color: color_field(map, "line_color", Color::is_line_color)
                .unwrap_or(defaults.line_color),
        };

        let last_type = text_field(map, "last_type").and_then(|value| {
            let kind = TelemetryKind::parse(&value);
            if kind.is_none() {
                warn!("Ignoring unknown last_type '{value}' in settings");
            }
            kind
        });

        Self {
            styling,
            last_machine: text_field(map, "last_machine"),
            last_study: text_field(map, "last_study"),
            last_type,
            last_tag: text_field(map, "last_tag"),
            layout: LayoutState {
                window_geometry: text_field(map, "window_geometry"),
                pane_sash_position: field(map, "pane_sash_position"),
            },
        }
    }
}

fn field<T: DeserializeOwned>(map: &Map<String, Value>, key: &str) -> Option<T> {
    let value = map.get(key)?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!("Ignoring invalid settings field {key}: {err}");
            None
        }
    }
}

/// Empty strings mean "never set".
fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    field::<String>(map, key).filter(|value| !value.trim().is_empty())
}

fn color_field(map: &Map<String, Value>, key: &str, allowed: fn(&Color) -> bool) -> Option<Color> {
    let raw = text_field(map, key)?;
    match Color::parse(&raw).filter(|color| allowed(color)) {
        Some(color) => Some(color),
        None => {
            warn!("Ignoring unsupported {key} '{raw}' in settings");
            None
        }
    }
}

/// Destination for settings writes.
pub trait SettingsSink {
    fn write(&mut self, document: &SettingsDocument) -> ExplorerResult<()>;
}

/// Settings stored as a JSON file on disk.
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Never fails: a missing or corrupt file yields defaults and a log line.
    pub fn load(&self) -> SettingsDocument {
        match self.try_load() {
            Ok(Some(document)) => {
                info!("Settings loaded from {}", self.path.display());
                document
            }
            Ok(None) => {
                info!("No settings file found at {}", self.path.display());
                SettingsDocument::default()
            }
            Err(err) => {
                warn!("{err}; starting from defaults");
                SettingsDocument::default()
            }
        }
    }

    fn try_load(&self) -> ExplorerResult<Option<SettingsDocument>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            ExplorerError::SettingsLoad(format!("cannot read {}: {err}", self.path.display()))
        })?;
        SettingsDocument::from_json(&contents).map(Some)
    }
}

impl SettingsSink for SettingsStore {
    fn write(&mut self, document: &SettingsDocument) -> ExplorerResult<()> {
        let serialized = document.to_json()?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    ExplorerError::SettingsSave(format!("cannot create {}: {err}", parent.display()))
                })?;
            }
        }
        // Write then rename so a crash never leaves a half-written document.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized)
            .and_then(|_| fs::rename(&staging, &self.path))
            .map_err(|err| {
                ExplorerError::SettingsSave(format!("cannot write {}: {err}", self.path.display()))
            })?;
        debug!("Settings saved to {}", self.path.display());
        Ok(())
    }
}

/// Keeps every written document in memory.
#[derive(Debug, Default)]
pub struct MemorySettings {
    pub writes: Vec<SettingsDocument>,
    pub fail_writes: bool,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&SettingsDocument> {
        self.writes.last()
    }
}

impl SettingsSink for MemorySettings {
    fn write(&mut self, document: &SettingsDocument) -> ExplorerResult<()> {
        if self.fail_writes {
            return Err(ExplorerError::SettingsSave("sink refuses writes".into()));
        }
        self.writes.push(document.clone());
        Ok(())
    }
}
