//! Snapshots of the current render written to disk.

use std::{fmt::Write as _, fs, path::Path};

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;

use crate::imaging::encode_png;
use crate::session::render::{FrameContent, ImageView, ScalarPlot};

pub const OVERLAY_TAG_NAME: &str = "multiple_tags";

const INVALID_FILENAME_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

pub fn sanitize_filename(name: &str) -> String {
    if name.is_empty() {
        return "unnamed".to_string();
    }
    name.chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// `{study}_{tag}_{YYYYmmdd_HHMMSS}.{ext}`, with both names sanitized.
pub fn default_file_name(study: &str, tag: &str, extension: &str, now: NaiveDateTime) -> String {
    format!(
        "{}_{}_{}.{extension}",
        sanitize_filename(study),
        sanitize_filename(tag),
        now.format("%Y%m%d_%H%M%S")
    )
}

pub fn plot_to_csv(plot: &ScalarPlot) -> String {
    let mut out = String::from("series,step,value\n");
    for series in &plot.series {
        let label = csv_field(&series.label);
        for point in &series.points {
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{label},{},{}", point.step, point.value);
        }
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn write_plot_csv(plot: &ScalarPlot, path: &Path) -> Result<()> {
    fs::write(path, plot_to_csv(plot))
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_frame_png(view: &ImageView, path: &Path) -> Result<()> {
    let FrameContent::Decoded(image) = &view.content else {
        bail!("frame at step {} could not be decoded", view.frame.step);
    };
    let bytes = encode_png(image)?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}
