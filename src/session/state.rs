use serde::{Deserialize, Serialize};

use crate::db::{MachineFilter, TelemetryKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Blue,
    Black,
    Red,
    Green,
    Orange,
    Purple,
    Brown,
    Pink,
    Gray,
    Olive,
    Cyan,
}

/// Choices offered for the series line colour.
pub const LINE_COLORS: [Color; 6] = [
    Color::Blue,
    Color::Black,
    Color::Red,
    Color::Green,
    Color::Orange,
    Color::Purple,
];

/// Choices offered for the grid colour.
pub const GRID_COLORS: [Color; 6] = [
    Color::Gray,
    Color::Black,
    Color::Blue,
    Color::Green,
    Color::Red,
    Color::Orange,
];

/// Overlay plots cycle through this palette.
pub const SERIES_PALETTE: [Color; 10] = [
    Color::Blue,
    Color::Red,
    Color::Green,
    Color::Purple,
    Color::Orange,
    Color::Brown,
    Color::Pink,
    Color::Gray,
    Color::Olive,
    Color::Cyan,
];

impl Color {
    pub fn as_str(&self) -> &'static str {
        match self {
            Color::Blue => "blue",
            Color::Black => "black",
            Color::Red => "red",
            Color::Green => "green",
            Color::Orange => "orange",
            Color::Purple => "purple",
            Color::Brown => "brown",
            Color::Pink => "pink",
            Color::Gray => "gray",
            Color::Olive => "olive",
            Color::Cyan => "cyan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        SERIES_PALETTE
            .iter()
            .chain(LINE_COLORS.iter())
            .chain(GRID_COLORS.iter())
            .copied()
            .find(|color| color.as_str().eq_ignore_ascii_case(value.trim()))
    }

    pub fn is_line_color(&self) -> bool {
        LINE_COLORS.contains(self)
    }

    pub fn is_grid_color(&self) -> bool {
        GRID_COLORS.contains(self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlotStyling {
    pub log_scale_y: bool,
    pub show_markers: bool,
    pub show_h_grid: bool,
    pub show_v_grid: bool,
    pub grid_color: Color,
    /// Base of the overlay palette as well as the single-series colour.
    pub line_color: Color,
}

impl Default for PlotStyling {
    fn default() -> Self {
        Self {
            log_scale_y: false,
            show_markers: true,
            show_h_grid: false,
            show_v_grid: false,
            grid_color: Color::Gray,
            line_color: Color::Blue,
        }
    }
}

/// Window layout values owned by the UI edge; carried through settings untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutState {
    pub window_geometry: Option<String>,
    pub pane_sash_position: Option<i64>,
}

/// How scalar data is plotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlotMode {
    #[default]
    Single,
    /// Entered only by an explicit "plot selected" action.
    Overlay,
}

/// The canonical model of everything the user has chosen.
///
/// `studies` and `tags` are derived from the store on every cascade and are
/// never persisted. Fields are only mutated by the session controller.
#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    pub filter_text: String,
    pub machine: MachineFilter,
    pub machines: Vec<String>,
    pub studies: Vec<String>,
    pub current_study: Option<String>,
    pub kind: TelemetryKind,
    pub tags: Vec<String>,
    pub current_tag: Option<String>,
    /// Raw tags in the order they were selected.
    pub multi_selected_tags: Vec<String>,
    /// Kind of scalar plot currently shown.
    pub plot_mode: PlotMode,
    pub styling: PlotStyling,
    pub image_index: usize,
    pub layout: LayoutState,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Machine choices in display order, `All` first.
    pub fn machine_choices(&self) -> Vec<String> {
        std::iter::once(MachineFilter::ALL_LABEL.to_string())
            .chain(self.machines.iter().cloned())
            .collect()
    }

    pub fn has_study(&self, study: &str) -> bool {
        self.studies.iter().any(|candidate| candidate == study)
    }

    pub fn can_plot_selected(&self) -> bool {
        self.kind == TelemetryKind::Scalar && !self.multi_selected_tags.is_empty()
    }

    /// Clears everything downstream of the study choice.
    pub fn clear_tags(&mut self) {
        self.tags.clear();
        self.current_tag = None;
        self.multi_selected_tags.clear();
        self.plot_mode = PlotMode::Single;
        self.image_index = 0;
    }

    /// Drops multi-selected tags that are no longer loadable.
    ///
    /// `plot_mode` is left alone: it describes the plot on screen, which
    /// only changes when something is plotted.
    pub fn retain_valid_selection(&mut self) {
        let tags = &self.tags;
        self.multi_selected_tags
            .retain(|tag| tags.iter().any(|candidate| candidate == tag));
    }
}

/// Case-insensitive substring filter over study names, preserving order.
pub fn filter_studies(studies: &[String], filter_text: &str) -> Vec<String> {
    let needle = filter_text.to_lowercase();
    if needle.is_empty() {
        return studies.to_vec();
    }
    studies
        .iter()
        .filter(|study| study.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Picks the value to select from a freshly recomputed candidate list.
///
/// Keeps `current` when it is still a candidate, then tries `persisted`,
/// then the first candidate. `None` only when there are no candidates.
pub fn resolve_choice(
    candidates: &[String],
    current: Option<&str>,
    persisted: Option<&str>,
) -> Option<String> {
    let contains = |value: &str| candidates.iter().any(|candidate| candidate == value);
    current
        .filter(|value| contains(*value))
        .or_else(|| persisted.filter(|value| contains(*value)))
        .map(str::to_string)
        .or_else(|| candidates.first().cloned())
}
