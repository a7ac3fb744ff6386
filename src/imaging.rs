use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};

use crate::db::ImageFrame;
use crate::error::ExplorerError;

pub const DEFAULT_MAX_EDGE: u32 = 1500;

/// Decodes a stored frame and shrinks it to fit `max_edge` on both sides.
///
/// The stored format name is only a hint; unknown names fall back to sniffing.
pub fn decode_frame(frame: &ImageFrame, max_edge: u32) -> Result<RgbaImage, ExplorerError> {
    let hinted = ImageFormat::from_extension(frame.format.to_ascii_lowercase())
        .and_then(|format| image::load_from_memory_with_format(&frame.bytes, format).ok());

    let decoded = match hinted {
        Some(img) => img,
        None => image::load_from_memory(&frame.bytes).map_err(|err| ExplorerError::Decode {
            step: frame.step,
            message: err.to_string(),
        })?,
    };

    Ok(fit_within(decoded, max_edge).to_rgba8())
}

fn fit_within(img: DynamicImage, max_edge: u32) -> DynamicImage {
    if max_edge > 0 && (img.width() > max_edge || img.height() > max_edge) {
        img.thumbnail(max_edge, max_edge)
    } else {
        img
    }
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .context("failed to encode PNG")?;
    Ok(buffer.into_inner())
}
