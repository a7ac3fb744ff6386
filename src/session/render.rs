//! Render requests produced by the session controller.
//!
//! Renderers are pure views: they receive fully resolved data and keep no
//! selection state of their own.

use image::RgbaImage;

use crate::db::{ImageFrame, ScalarPoint};

use super::state::{Color, PlotStyling};

pub const STEP_AXIS_LABEL: &str = "Step";
pub const VALUE_AXIS_LABEL: &str = "Value";
pub const NO_IMAGES_NOTICE: &str = "No images found.";

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesData {
    pub label: String,
    pub color: Color,
    pub points: Vec<ScalarPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalarPlot {
    pub title: String,
    pub x_label: &'static str,
    pub y_label: &'static str,
    pub series: Vec<SeriesData>,
    pub styling: PlotStyling,
}

impl ScalarPlot {
    pub fn new(title: String, series: Vec<SeriesData>, styling: PlotStyling) -> Self {
        Self {
            title,
            x_label: STEP_AXIS_LABEL,
            y_label: VALUE_AXIS_LABEL,
            series,
            styling,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameContent {
    Decoded(RgbaImage),
    /// Placeholder text shown where the picture would be.
    Undecodable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageView {
    pub frame: ImageFrame,
    pub content: FrameContent,
    /// Zero-based index into the loaded frames.
    pub position: usize,
    pub total: usize,
    pub caption: String,
}

impl ImageView {
    pub fn has_prev(&self) -> bool {
        self.position > 0
    }

    pub fn has_next(&self) -> bool {
        self.position + 1 < self.total
    }
}

pub trait Renderer {
    fn render_scalar(&mut self, plot: &ScalarPlot);

    fn render_image(&mut self, view: &ImageView);

    /// Empties the display surface, optionally leaving a notice behind.
    fn clear(&mut self, notice: Option<&str>);

    /// Out-of-band messages such as status lines and export results.
    fn notify(&mut self, _message: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    Scalar(ScalarPlot),
    Image(ImageView),
    Clear(Option<String>),
}

/// Remembers every request it receives.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
    pub notices: Vec<String>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&RenderCall> {
        self.calls.last()
    }

    pub fn last_plot(&self) -> Option<&ScalarPlot> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::Scalar(plot) => Some(plot),
            _ => None,
        })
    }

    pub fn last_view(&self) -> Option<&ImageView> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::Image(view) => Some(view),
            _ => None,
        })
    }
}

impl Renderer for RecordingRenderer {
    fn render_scalar(&mut self, plot: &ScalarPlot) {
        self.calls.push(RenderCall::Scalar(plot.clone()));
    }

    fn render_image(&mut self, view: &ImageView) {
        self.calls.push(RenderCall::Image(view.clone()));
    }

    fn clear(&mut self, notice: Option<&str>) {
        self.calls.push(RenderCall::Clear(notice.map(str::to_string)));
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

/// Colours for `count` overlay series.
///
/// Cycling starts at the palette position of `base` so the first series always
/// uses the chosen line colour; a base outside the palette starts at index 0.
pub fn assign_series_colors(palette: &[Color], base: Color, count: usize) -> Vec<Color> {
    if palette.is_empty() {
        return vec![base; count];
    }
    let start = palette.iter().position(|color| *color == base).unwrap_or(0);
    (0..count)
        .map(|offset| palette[(start + offset) % palette.len()])
        .collect()
}

pub fn single_title(label: &str, study: &str) -> String {
    format!("{label} ({study})")
}

pub fn overlay_title(study: &str) -> String {
    format!("Multiple Tags ({study})")
}

pub fn sample_caption(step: i64) -> String {
    format!("Sample ID: {step}")
}
