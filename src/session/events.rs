use std::path::PathBuf;

use crate::db::{MachineFilter, TelemetryKind};

use super::state::{Color, LayoutState};

/// One cosmetic plot option change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylingChange {
    LogScaleY(bool),
    ShowMarkers(bool),
    ShowHGrid(bool),
    ShowVGrid(bool),
    GridColor(Color),
    LineColor(Color),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageNavigation {
    Prev,
    Next,
    /// Slider position; clamped into the loaded frame range.
    Seek(i64),
}

/// Every input the session controller reacts to.
///
/// Tags arrive as display labels, exactly as the user saw them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    FilterTextChanged(String),
    MachineChanged(MachineFilter),
    StudyChanged(String),
    TypeChanged(TelemetryKind),
    TagChanged(String),
    StylingChanged(StylingChange),
    ListboxMultiSelectChanged(Vec<String>),
    PlotSelected,
    ImageNavigate(ImageNavigation),
    LayoutChanged(LayoutState),
}

/// How an event should reach the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persist {
    /// Nothing persistent changed (navigation, ephemeral selection, no-ops).
    Skip,
    Debounced,
}

/// A candidate list the shell can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Machines,
    Studies,
    Tags,
}

/// Everything the runner feeds the controller, events plus session commands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Event(SessionEvent),
    Export(Option<PathBuf>),
    Status,
    List(ListKind),
    Close,
}

impl From<SessionEvent> for SessionCommand {
    fn from(event: SessionEvent) -> Self {
        SessionCommand::Event(event)
    }
}
