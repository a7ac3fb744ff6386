pub mod telemetry;

pub use telemetry::{
    ImageFrame, ImageRow, MachineFilter, ScalarPoint, ScalarRow, TelemetryKind,
};
