//! Telemetry row models.
//!
//! Scalars and images live in separate tables but share the
//! `(study, tag, step, wall_time, machine)` shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryKind {
    #[default]
    Scalar,
    Image,
}

impl TelemetryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKind::Scalar => "scalar",
            TelemetryKind::Image => "image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scalar" => Some(TelemetryKind::Scalar),
            "image" => Some(TelemetryKind::Image),
            _ => None,
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            TelemetryKind::Scalar => "scalars",
            TelemetryKind::Image => "images",
        }
    }
}

/// Restricts study listing to one source machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum MachineFilter {
    #[default]
    All,
    Named(String),
}

impl MachineFilter {
    pub const ALL_LABEL: &'static str = "All";

    /// `"All"` and the empty string both mean no restriction.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        if label.is_empty() || label == Self::ALL_LABEL {
            MachineFilter::All
        } else {
            MachineFilter::Named(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MachineFilter::All => Self::ALL_LABEL,
            MachineFilter::Named(name) => name,
        }
    }

    pub fn machine(&self) -> Option<&str> {
        match self {
            MachineFilter::All => None,
            MachineFilter::Named(name) => Some(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarPoint {
    pub step: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub step: i64,
    pub wall_time: f64,
    pub format: String,
    pub bytes: Vec<u8>,
}

/// One row of the `scalars` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarRow {
    pub study: String,
    pub tag: String,
    pub step: i64,
    pub wall_time: f64,
    pub value: f64,
    pub machine: String,
}

/// One row of the `images` table.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRow {
    pub study: String,
    pub tag: String,
    pub step: i64,
    pub wall_time: f64,
    pub format: String,
    pub bytes: Vec<u8>,
    pub machine: String,
}

/// Sorts by step, keeping insertion order among equal steps.
pub fn sort_points(points: &mut [ScalarPoint]) {
    points.sort_by_key(|point| point.step);
}

pub fn sort_frames(frames: &mut [ImageFrame]) {
    frames.sort_by_key(|frame| frame.step);
}
