//! Error taxonomy for the coefficient pipeline.
//!
//! Only fatal conditions are errors. Join misses travel as `None` values and
//! configuration warnings are logged and skipped by the stage that meets them.

use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage named in fatal error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReadGrid,
    ReadZones,
    ReadBoundary,
    ReadTables,
    Overlay,
    WriteOutputs,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::ReadGrid => "read land-cover grid",
            Stage::ReadZones => "read carbon zones",
            Stage::ReadBoundary => "read boundary",
            Stage::ReadTables => "read lookup tables",
            Stage::Overlay => "spatial overlay",
            Stage::WriteOutputs => "write outputs",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum CarbonError {
    /// Missing, unreadable or empty input. Fatal.
    #[error("{stage}: {path}: {reason}")]
    Input {
        stage: Stage,
        path: PathBuf,
        reason: String,
    },

    #[error("cannot reproject from {from} to {to}")]
    UnsupportedProjection { from: String, to: String },

    #[error("reprojecting {from} to {to}: {reason}")]
    Reprojection { from: String, to: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("TIFF codec: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("CSV codec: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON codec: {0}")]
    Json(#[from] serde_json::Error),
}

impl CarbonError {
    pub fn input(stage: Stage, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CarbonError::Input {
            stage,
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CarbonError>;
