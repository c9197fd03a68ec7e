//! bubblegrid — optical mark recognition for scanned bubble answer sheets.
//!
//! Sheets carry a red reference frame around the answer region and a column
//! of alignment marks along the right margin. The pipeline stages are:
//!
//! 1. **Frame** – locate the red reference frame in the scan.
//! 2. **Rectify** – perspective-warp the frame interior to a canonical image.
//! 3. **Template** – bubble positions in canonical coordinates, loaded from CSV.
//! 4. **Classify** – pick the filled option per question group by dark-pixel
//!    count inside each bubble window.
//! 5. **Marks** – detect margin alignment marks and build the identifier grid.
//! 6. **Identifier** – read the student identifier digit per grid column.
//! 7. **Batch** – fan the pipeline out over a directory of scans and write
//!    the answer and identifier tables.
//!
//! # Public API
//! - [`batch::process_directory`] and [`batch::process_page`] as primary
//!   entry points
//! - per-stage functions and config structs for custom drivers

pub mod batch;
pub mod classify;
pub mod color;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod identifier;
pub mod marks;
pub mod rectify;
pub mod template;
pub mod threshold;

pub use batch::{BatchConfig, BatchResult, PageFailure, PageRecord};
pub use classify::ClassifyConfig;
pub use error::OmrError;
pub use frame::FrameConfig;
pub use geometry::{Corner, Quad};
pub use marks::{AlignmentMark, IdentifierConfig, IdentifierGrid};
pub use template::{CalibrationTemplate, IdentifierTemplate, TemplatePoint};
