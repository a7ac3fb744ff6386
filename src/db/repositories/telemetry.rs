use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::db::{
    helpers::{collect_strings, row_to_frame, row_to_point},
    models::{ImageFrame, ImageRow, MachineFilter, ScalarPoint, ScalarRow, TelemetryKind},
    Database,
};

pub struct TelemetryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> TelemetryRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Distinct non-empty machine names across both tables, sorted.
    pub fn list_machines(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT machine FROM scalars WHERE machine <> ''
             UNION
             SELECT machine FROM images WHERE machine <> ''
             ORDER BY 1",
        )?;
        collect_strings(&mut stmt, []).context("failed to list machines")
    }

    /// Distinct studies having at least one row, optionally for one machine.
    pub fn list_studies(&self, machine: Option<&str>) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT study FROM scalars WHERE ?1 IS NULL OR machine = ?1
             UNION
             SELECT study FROM images WHERE ?1 IS NULL OR machine = ?1
             ORDER BY 1",
        )?;
        collect_strings(&mut stmt, params![machine]).context("failed to list studies")
    }

    pub fn list_tags(&self, study: &str, kind: TelemetryKind) -> Result<Vec<String>> {
        let query = format!(
            "SELECT DISTINCT tag FROM {} WHERE study = ?1 ORDER BY tag",
            kind.table()
        );
        let mut stmt = self.conn.prepare(&query)?;
        collect_strings(&mut stmt, params![study])
            .with_context(|| format!("failed to list {} tags for {study}", kind.as_str()))
    }

    pub fn scalar_series(&self, study: &str, tag: &str) -> Result<Vec<ScalarPoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT step, value FROM scalars
             WHERE study = ?1 AND tag = ?2
             ORDER BY step ASC, rowid ASC",
        )?;
        let mut rows = stmt.query(params![study, tag])?;
        let mut points = Vec::new();
        while let Some(row) = rows.next()? {
            points.push(row_to_point(row)?);
        }
        Ok(points)
    }

    pub fn image_frames(&self, study: &str, tag: &str) -> Result<Vec<ImageFrame>> {
        let mut stmt = self.conn.prepare(
            "SELECT step, wall_time, image_format, image_data FROM images
             WHERE study = ?1 AND tag = ?2
             ORDER BY step ASC, rowid ASC",
        )?;
        let mut rows = stmt.query(params![study, tag])?;
        let mut frames = Vec::new();
        while let Some(row) = rows.next()? {
            frames.push(row_to_frame(row)?);
        }
        Ok(frames)
    }

    pub fn insert_scalar(&self, row: &ScalarRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO scalars (study, tag, step, wall_time, value, machine)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![row.study, row.tag, row.step, row.wall_time, row.value, row.machine],
            )
            .with_context(|| format!("failed to insert scalar {}/{}", row.study, row.tag))?;
        Ok(())
    }

    pub fn insert_image(&self, row: &ImageRow) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO images (study, tag, step, wall_time, image_format, image_data, machine)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    row.study,
                    row.tag,
                    row.step,
                    row.wall_time,
                    row.format,
                    row.bytes,
                    row.machine
                ],
            )
            .with_context(|| format!("failed to insert image {}/{}", row.study, row.tag))?;
        Ok(())
    }
}

impl Database {
    pub async fn list_machines(&self) -> Result<Vec<String>> {
        self.execute(|conn| TelemetryRepository::new(conn).list_machines())
            .await
    }

    pub async fn list_studies(&self, filter: &MachineFilter) -> Result<Vec<String>> {
        let machine = filter.machine().map(str::to_string);
        self.execute(move |conn| TelemetryRepository::new(conn).list_studies(machine.as_deref()))
            .await
    }

    pub async fn list_tags(&self, study: &str, kind: TelemetryKind) -> Result<Vec<String>> {
        let study = study.to_string();
        self.execute(move |conn| TelemetryRepository::new(conn).list_tags(&study, kind))
            .await
    }

    pub async fn scalar_series(&self, study: &str, tag: &str) -> Result<Vec<ScalarPoint>> {
        let (study, tag) = (study.to_string(), tag.to_string());
        self.execute(move |conn| TelemetryRepository::new(conn).scalar_series(&study, &tag))
            .await
    }

    pub async fn image_frames(&self, study: &str, tag: &str) -> Result<Vec<ImageFrame>> {
        let (study, tag) = (study.to_string(), tag.to_string());
        self.execute(move |conn| TelemetryRepository::new(conn).image_frames(&study, &tag))
            .await
    }

    /// Bulk insert in one transaction.
    pub async fn insert_rows(&self, scalars: Vec<ScalarRow>, images: Vec<ImageRow>) -> Result<()> {
        self.execute(move |conn| {
            let tx = conn.transaction().context("failed to open insert transaction")?;
            {
                let repo = TelemetryRepository::new(&tx);
                for row in &scalars {
                    repo.insert_scalar(row)?;
                }
                for row in &images {
                    repo.insert_image(row)?;
                }
            }
            tx.commit().context("failed to commit telemetry rows")?;
            Ok(())
        })
        .await
    }
}
