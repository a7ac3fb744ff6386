//! The read surface the session controller needs from telemetry storage.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::db::{
    models::telemetry::{sort_frames, sort_points},
    Database, ImageFrame, ImageRow, MachineFilter, ScalarPoint, ScalarRow, TelemetryKind,
};
use crate::error::{ExplorerError, ExplorerResult};

/// Side-effect-free queries over recorded telemetry.
///
/// Every list comes back sorted; series and frames come back in step order.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    async fn list_machines(&self) -> ExplorerResult<Vec<String>>;

    async fn list_studies(&self, filter: &MachineFilter) -> ExplorerResult<Vec<String>>;

    async fn list_tags(&self, study: &str, kind: TelemetryKind) -> ExplorerResult<Vec<String>>;

    async fn scalar_series(&self, study: &str, tag: &str) -> ExplorerResult<Vec<ScalarPoint>>;

    async fn image_frames(&self, study: &str, tag: &str) -> ExplorerResult<Vec<ImageFrame>>;
}

#[async_trait]
impl TelemetryStore for Database {
    async fn list_machines(&self) -> ExplorerResult<Vec<String>> {
        Database::list_machines(self)
            .await
            .map_err(ExplorerError::store)
    }

    async fn list_studies(&self, filter: &MachineFilter) -> ExplorerResult<Vec<String>> {
        Database::list_studies(self, filter)
            .await
            .map_err(ExplorerError::store)
    }

    async fn list_tags(&self, study: &str, kind: TelemetryKind) -> ExplorerResult<Vec<String>> {
        Database::list_tags(self, study, kind)
            .await
            .map_err(ExplorerError::store)
    }

    async fn scalar_series(&self, study: &str, tag: &str) -> ExplorerResult<Vec<ScalarPoint>> {
        Database::scalar_series(self, study, tag)
            .await
            .map_err(ExplorerError::store)
    }

    async fn image_frames(&self, study: &str, tag: &str) -> ExplorerResult<Vec<ImageFrame>> {
        Database::image_frames(self, study, tag)
            .await
            .map_err(ExplorerError::store)
    }
}

/// Telemetry held in memory, mostly for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    scalars: Vec<ScalarRow>,
    images: Vec<ImageRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scalar(mut self, study: &str, tag: &str, machine: &str, points: &[(i64, f64)]) -> Self {
        for &(step, value) in points {
            self.scalars.push(ScalarRow {
                study: study.to_string(),
                tag: tag.to_string(),
                step,
                wall_time: step as f64,
                value,
                machine: machine.to_string(),
            });
        }
        self
    }

    pub fn with_image(mut self, study: &str, tag: &str, machine: &str, step: i64, bytes: Vec<u8>) -> Self {
        self.images.push(ImageRow {
            study: study.to_string(),
            tag: tag.to_string(),
            step,
            wall_time: step as f64,
            format: "PNG".to_string(),
            bytes,
            machine: machine.to_string(),
        });
        self
    }

    fn machine_matches(filter: &MachineFilter, machine: &str) -> bool {
        filter.machine().map_or(true, |wanted| wanted == machine)
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn list_machines(&self) -> ExplorerResult<Vec<String>> {
        let machines: BTreeSet<&str> = self
            .scalars
            .iter()
            .map(|row| row.machine.as_str())
            .chain(self.images.iter().map(|row| row.machine.as_str()))
            .filter(|machine| !machine.is_empty())
            .collect();
        Ok(machines.into_iter().map(str::to_string).collect())
    }

    async fn list_studies(&self, filter: &MachineFilter) -> ExplorerResult<Vec<String>> {
        let studies: BTreeSet<&str> = self
            .scalars
            .iter()
            .filter(|row| Self::machine_matches(filter, &row.machine))
            .map(|row| row.study.as_str())
            .chain(
                self.images
                    .iter()
                    .filter(|row| Self::machine_matches(filter, &row.machine))
                    .map(|row| row.study.as_str()),
            )
            .collect();
        Ok(studies.into_iter().map(str::to_string).collect())
    }

    async fn list_tags(&self, study: &str, kind: TelemetryKind) -> ExplorerResult<Vec<String>> {
        let tags: BTreeSet<&str> = match kind {
            TelemetryKind::Scalar => self
                .scalars
                .iter()
                .filter(|row| row.study == study)
                .map(|row| row.tag.as_str())
                .collect(),
            TelemetryKind::Image => self
                .images
                .iter()
                .filter(|row| row.study == study)
                .map(|row| row.tag.as_str())
                .collect(),
        };
        Ok(tags.into_iter().map(str::to_string).collect())
    }

    async fn scalar_series(&self, study: &str, tag: &str) -> ExplorerResult<Vec<ScalarPoint>> {
        let mut points: Vec<ScalarPoint> = self
            .scalars
            .iter()
            .filter(|row| row.study == study && row.tag == tag)
            .map(|row| ScalarPoint {
                step: row.step,
                value: row.value,
            })
            .collect();
        sort_points(&mut points);
        Ok(points)
    }

    async fn image_frames(&self, study: &str, tag: &str) -> ExplorerResult<Vec<ImageFrame>> {
        let mut frames: Vec<ImageFrame> = self
            .images
            .iter()
            .filter(|row| row.study == study && row.tag == tag)
            .map(|row| ImageFrame {
                step: row.step,
                wall_time: row.wall_time,
                format: row.format.clone(),
                bytes: row.bytes.clone(),
            })
            .collect();
        sort_frames(&mut frames);
        Ok(frames)
    }
}
