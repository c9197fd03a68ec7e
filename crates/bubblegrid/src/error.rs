//! Error types shared across the pipeline.
//!
//! Per-page errors are caught at the batch boundary and recorded with the
//! offending filename; they never abort the batch. Calibration-file errors
//! are fatal at batch start.

use std::path::PathBuf;

/// Errors produced by the sheet-processing pipeline.
#[derive(Debug)]
pub enum OmrError {
    /// No red contour was found on the page.
    NoReferenceFrame,
    /// A red region was found but could not be resolved to a usable frame.
    AmbiguousReferenceFrame { vertices: usize, area: f64 },
    /// The ordered quadrilateral collapses to a zero-size canonical frame.
    DegenerateQuad { width: u32, height: u32 },
    /// A calibration template failed to load or validate.
    InvalidTemplate { path: PathBuf, reason: String },
    /// Fewer qualifying margin marks than the identifier grid needs.
    InsufficientAlignmentMarks { found: usize, needed: usize },
    /// A bubble sampling window lies fully outside the image.
    EmptySamplingWindow { x: i32, y: i32 },
    /// A page image could not be opened or decoded.
    UnreadableImage { path: PathBuf, reason: String },
    /// The minimum-ROI-size file is malformed.
    InvalidMinSize { path: PathBuf, reason: String },
    /// Filesystem failure outside image decoding.
    Io { path: PathBuf, source: std::io::Error },
}

impl std::fmt::Display for OmrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoReferenceFrame => write!(f, "no reference frame found on page"),
            Self::AmbiguousReferenceFrame { vertices, area } => write!(
                f,
                "reference frame candidate not resolvable: {} vertices, area {:.0} px^2",
                vertices, area
            ),
            Self::DegenerateQuad { width, height } => {
                write!(f, "degenerate quadrilateral: canonical size {}x{}", width, height)
            }
            Self::InvalidTemplate { path, reason } => {
                write!(f, "invalid template {}: {}", path.display(), reason)
            }
            Self::InsufficientAlignmentMarks { found, needed } => write!(
                f,
                "insufficient alignment marks: found {}, need {}",
                found, needed
            ),
            Self::EmptySamplingWindow { x, y } => {
                write!(f, "sampling window at ({}, {}) fully out of bounds", x, y)
            }
            Self::UnreadableImage { path, reason } => {
                write!(f, "unreadable image {}: {}", path.display(), reason)
            }
            Self::InvalidMinSize { path, reason } => {
                write!(f, "invalid minimum-size file {}: {}", path.display(), reason)
            }
            Self::Io { path, source } => {
                write!(f, "i/o error on {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for OmrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
