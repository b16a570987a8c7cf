// crates/aqfetch-core/src/error.rs

use aqfetch_files::CellError;
use thiserror::Error;

use crate::measures::MeasureKind;

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("cannot add a {found:?} measure to a {expected:?} collection")]
    KindMismatch {
        expected: MeasureKind,
        found: MeasureKind,
    },

    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV buffer error: {0}")]
    Buffer(String),
}

/// Failures for a single row of a provider export. These never abort a batch.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("could not find measurand for '{0}'")]
    UnsupportedMeasurand(String),

    #[error("row is missing required column '{0}'")]
    MissingColumn(String),

    #[error(transparent)]
    Cell(#[from] CellError),

    #[error("invalid timestamp '{value}': {reason}")]
    Timestamp { value: String, reason: String },

    #[error("interval of {0} seconds is out of range")]
    Interval(f64),

    #[error("invalid coordinates: {0}")]
    Coordinates(String),

    #[error(transparent)]
    Measure(#[from] MeasureError),
}
