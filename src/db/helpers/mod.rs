use anyhow::{Context, Result};
use rusqlite::{Params, Row, Statement};

use crate::db::models::{ImageFrame, ScalarPoint};

/// Collects the first column of every row as a string.
pub fn collect_strings<P: Params>(stmt: &mut Statement<'_>, params: P) -> Result<Vec<String>> {
    let mut rows = stmt.query(params)?;
    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        values.push(row.get::<_, String>(0)?);
    }
    Ok(values)
}

pub fn row_to_point(row: &Row) -> Result<ScalarPoint> {
    Ok(ScalarPoint {
        step: row.get("step").context("step column")?,
        value: row.get("value").context("value column")?,
    })
}

pub fn row_to_frame(row: &Row) -> Result<ImageFrame> {
    let format: Option<String> = row.get("image_format")?;
    Ok(ImageFrame {
        step: row.get("step").context("step column")?,
        wall_time: row.get("wall_time").context("wall_time column")?,
        format: normalize_format(format),
        bytes: row.get("image_data").context("image_data column")?,
    })
}

/// Ingestion writes `unknown` when it cannot sniff the format; treat NULL the same.
pub fn normalize_format(format: Option<String>) -> String {
    match format {
        Some(value) if !value.trim().is_empty() => value,
        _ => "unknown".to_string(),
    }
}
