//! Batch driver: fan the pipeline out over a directory of page images.
//!
//! Pages are independent given the shared read-only template, so they run
//! on the rayon pool. Results are merged after completion and sorted by
//! filename, keeping output deterministic regardless of completion order.
//! A failing page is recorded with its reason and excluded from the output
//! rows; the batch itself never aborts for one bad page.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::classify::{annotate_answers, classify_answers, ClassifyConfig};
use crate::error::OmrError;
use crate::frame::{locate_frame, FrameConfig};
use crate::identifier::{annotate_identifier, read_identifier};
use crate::marks::{build_identifier_grid, IdentifierConfig, IdentifierGrid};
use crate::rectify::rectify;
use crate::template::{CalibrationTemplate, IdentifierTemplate};

/// File extensions treated as page images.
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "tif", "tiff", "bmp"];

/// Aggregate configuration for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    pub frame: FrameConfig,
    pub classify: ClassifyConfig,
    pub identifier: IdentifierConfig,
    /// Write annotated canonical images here when set.
    pub annotate_answers_dir: Option<PathBuf>,
    /// Write annotated identifier-grid previews here when set.
    pub annotate_identifier_dir: Option<PathBuf>,
    /// Cooperative cancellation, checked between pages.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// One successfully processed page.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PageRecord {
    pub filename: String,
    /// One entry per question; `None` marks an unanswered question.
    pub answers: Vec<Option<char>>,
    pub student_id: String,
}

/// One page excluded from the output, with the stage failure that caused it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageFailure {
    pub filename: String,
    pub reason: String,
}

/// Outcome of a batch run, both halves sorted by filename.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchResult {
    pub pages: Vec<PageRecord>,
    pub failures: Vec<PageFailure>,
    /// True when the run stopped early on the cancellation flag.
    pub cancelled: bool,
}

/// Page images in `dir`, sorted by filename.
pub fn list_page_images(dir: &Path) -> Result<Vec<PathBuf>, OmrError> {
    let entries = std::fs::read_dir(dir).map_err(|source| OmrError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| OmrError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Run all stages on a single page.
///
/// Answers and the identifier run independently, but any stage failure
/// aborts the whole page: a partial sheet read is worth less than a clear
/// failure record for manual review.
pub fn process_page(
    path: &Path,
    template: &CalibrationTemplate,
    id_template: Option<&IdentifierTemplate>,
    config: &BatchConfig,
) -> Result<PageRecord, OmrError> {
    let image = image::open(path)
        .map_err(|e| OmrError::UnreadableImage {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .to_rgb8();
    let filename = file_name_of(path);

    let quad = locate_frame(&image, &config.frame)?;
    let canonical = rectify(&image, &quad)?;
    let answers = classify_answers(&canonical, template, &config.classify)?;

    let grid = match id_template {
        Some(t) => IdentifierGrid::from_template(t),
        None => build_identifier_grid(&image, &config.identifier)?,
    };
    let student_id = read_identifier(&image, &grid, &config.identifier);

    if let Some(dir) = &config.annotate_answers_dir {
        let annotated = annotate_answers(&canonical, template, &answers);
        save_annotation(&annotated, dir, &filename, "_annotated")?;
    }
    if let Some(dir) = &config.annotate_identifier_dir {
        let annotated = annotate_identifier(&image, &grid, &student_id, &config.identifier);
        save_annotation(&annotated, dir, &filename, "_id")?;
    }

    Ok(PageRecord {
        filename,
        answers,
        student_id,
    })
}

/// Read only the student identifier from a page, skipping frame location
/// and answer classification. Answers stay empty in the record.
pub fn identify_page(
    path: &Path,
    id_template: Option<&IdentifierTemplate>,
    config: &BatchConfig,
) -> Result<PageRecord, OmrError> {
    let image = image::open(path)
        .map_err(|e| OmrError::UnreadableImage {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .to_rgb8();
    let filename = file_name_of(path);

    let grid = match id_template {
        Some(t) => IdentifierGrid::from_template(t),
        None => build_identifier_grid(&image, &config.identifier)?,
    };
    let student_id = read_identifier(&image, &grid, &config.identifier);

    if let Some(dir) = &config.annotate_identifier_dir {
        let annotated = annotate_identifier(&image, &grid, &student_id, &config.identifier);
        save_annotation(&annotated, dir, &filename, "_id")?;
    }

    Ok(PageRecord {
        filename,
        answers: Vec::new(),
        student_id,
    })
}

/// Process every page image in `dir` and merge the results.
pub fn process_directory(
    dir: &Path,
    template: &CalibrationTemplate,
    id_template: Option<&IdentifierTemplate>,
    config: &BatchConfig,
) -> Result<BatchResult, OmrError> {
    run_directory(dir, config, |path| {
        process_page(path, template, id_template, config)
    })
}

/// Identifier-only variant of [`process_directory`].
pub fn identify_directory(
    dir: &Path,
    id_template: Option<&IdentifierTemplate>,
    config: &BatchConfig,
) -> Result<BatchResult, OmrError> {
    run_directory(dir, config, |path| identify_page(path, id_template, config))
}

fn run_directory(
    dir: &Path,
    config: &BatchConfig,
    page_fn: impl Fn(&Path) -> Result<PageRecord, OmrError> + Sync,
) -> Result<BatchResult, OmrError> {
    let paths = list_page_images(dir)?;
    tracing::info!("processing {} pages in {}", paths.len(), dir.display());

    for annotate_dir in [&config.annotate_answers_dir, &config.annotate_identifier_dir]
        .into_iter()
        .flatten()
    {
        std::fs::create_dir_all(annotate_dir).map_err(|source| OmrError::Io {
            path: annotate_dir.clone(),
            source,
        })?;
    }

    let outcomes: Vec<(String, Option<Result<PageRecord, OmrError>>)> = paths
        .par_iter()
        .map(|path| {
            let filename = file_name_of(path);
            if is_cancelled(config) {
                return (filename, None);
            }
            (filename, Some(page_fn(path)))
        })
        .collect();

    let cancelled = is_cancelled(config);
    let mut pages = Vec::new();
    let mut failures = Vec::new();
    for (filename, outcome) in outcomes {
        match outcome {
            Some(Ok(record)) => pages.push(record),
            Some(Err(error)) => {
                tracing::warn!("page {} failed: {}", filename, error);
                failures.push(PageFailure {
                    filename,
                    reason: error.to_string(),
                });
            }
            None => {}
        }
    }
    pages.sort_by(|a, b| a.filename.cmp(&b.filename));
    failures.sort_by(|a, b| a.filename.cmp(&b.filename));

    tracing::info!(
        "batch done: {} pages, {} failures{}",
        pages.len(),
        failures.len(),
        if cancelled { " (cancelled)" } else { "" }
    );
    Ok(BatchResult {
        pages,
        failures,
        cancelled,
    })
}

/// Write `filename,1..N,student_id` rows for all successful pages.
pub fn write_answer_table(
    path: &Path,
    result: &BatchResult,
    question_count: usize,
) -> Result<(), OmrError> {
    let mut writer = csv_writer(path)?;
    let mut header = vec!["filename".to_string()];
    header.extend((1..=question_count).map(|q| q.to_string()));
    header.push("student_id".to_string());
    write_row(&mut writer, path, &header)?;

    for page in &result.pages {
        let mut row = vec![page.filename.clone()];
        row.extend(
            page.answers
                .iter()
                .map(|a| a.map(String::from).unwrap_or_default()),
        );
        row.push(page.student_id.clone());
        write_row(&mut writer, path, &row)?;
    }
    writer.flush().map_err(|source| OmrError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `file,student_id` rows for all successful pages.
pub fn write_identifier_table(path: &Path, result: &BatchResult) -> Result<(), OmrError> {
    let mut writer = csv_writer(path)?;
    write_row(&mut writer, path, &["file".to_string(), "student_id".to_string()])?;
    for page in &result.pages {
        write_row(
            &mut writer,
            path,
            &[page.filename.clone(), page.student_id.clone()],
        )?;
    }
    writer.flush().map_err(|source| OmrError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse the optional `width,height` minimum-ROI-size file. Malformed
/// content is fatal at batch start.
pub fn load_min_roi_size(path: &Path) -> Result<(u32, u32), OmrError> {
    let body = std::fs::read_to_string(path).map_err(|source| OmrError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut parts = body.trim().split(',');
    let parse = |field: Option<&str>| -> Result<u32, OmrError> {
        field
            .map(str::trim)
            .ok_or_else(|| OmrError::InvalidMinSize {
                path: path.to_path_buf(),
                reason: "expected two comma-separated integers".into(),
            })?
            .parse()
            .map_err(|e| OmrError::InvalidMinSize {
                path: path.to_path_buf(),
                reason: format!("{}", e),
            })
    };
    let width = parse(parts.next())?;
    let height = parse(parts.next())?;
    if parts.next().is_some() {
        return Err(OmrError::InvalidMinSize {
            path: path.to_path_buf(),
            reason: "expected exactly two fields".into(),
        });
    }
    Ok((width, height))
}

fn is_cancelled(config: &BatchConfig) -> bool {
    config
        .cancel
        .as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn save_annotation(
    image: &image::RgbImage,
    dir: &Path,
    filename: &str,
    suffix: &str,
) -> Result<(), OmrError> {
    let stem = Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());
    let out = dir.join(format!("{}{}.png", stem, suffix));
    image.save(&out).map_err(|e| OmrError::Io {
        path: out,
        source: std::io::Error::other(e.to_string()),
    })
}

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, OmrError> {
    csv::Writer::from_path(path).map_err(|e| OmrError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })
}

fn write_row(
    writer: &mut csv::Writer<std::fs::File>,
    path: &Path,
    row: &[String],
) -> Result<(), OmrError> {
    writer.write_record(row).map_err(|e| OmrError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_page_images_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.PNG", "c.txt", "d.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let paths = list_page_images(dir.path()).unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PNG", "b.png", "d.jpeg"]);
    }

    #[test]
    fn test_min_roi_size_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("min_roi_size.txt");

        std::fs::write(&path, "640,480\n").unwrap();
        assert_eq!(load_min_roi_size(&path).unwrap(), (640, 480));

        std::fs::write(&path, "640").unwrap();
        assert!(matches!(
            load_min_roi_size(&path),
            Err(OmrError::InvalidMinSize { .. })
        ));

        std::fs::write(&path, "640,480,3").unwrap();
        assert!(load_min_roi_size(&path).is_err());

        std::fs::write(&path, "wide,tall").unwrap();
        assert!(load_min_roi_size(&path).is_err());
    }

    #[test]
    fn test_unreadable_image_is_a_page_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let template = crate::template::CalibrationTemplate::from_points(
            (0..5)
                .map(|i| crate::template::TemplatePoint { x: 10 + i * 40, y: 10 })
                .collect(),
        )
        .unwrap();
        let result = process_page(&path, &template, None, &BatchConfig::default());
        assert!(matches!(result, Err(OmrError::UnreadableImage { .. })));
    }
}
