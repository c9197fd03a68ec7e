//! bubblegrid CLI — command-line interface for answer sheet mark recognition.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use bubblegrid::batch::{
    identify_directory, load_min_roi_size, process_directory, write_answer_table,
    write_identifier_table, BatchConfig,
};
use bubblegrid::frame::locate_frame;
use bubblegrid::template::{CalibrationTemplate, IdentifierTemplate};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "bubblegrid")]
#[command(about = "Read answers and student identifiers from scanned bubble answer sheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a directory of scans: answers plus student identifiers.
    Process(CliProcessArgs),

    /// Read only the student identifiers from a directory of scans.
    Identify(CliIdentifyArgs),

    /// Locate the reference frame in a single scan and print its corners.
    Locate(CliLocateArgs),
}

#[derive(Debug, Clone, Args)]
struct CliProcessArgs {
    /// Directory of scanned page images.
    #[arg(long)]
    dir: PathBuf,

    /// Bubble calibration template (CSV with x,y header).
    #[arg(long)]
    template: PathBuf,

    /// Path to write the answer table (CSV).
    #[arg(long, default_value = "all_detected_answers.csv")]
    out: PathBuf,

    /// Path to write the identifier table (CSV).
    #[arg(long, default_value = "file_student_id.csv")]
    id_out: PathBuf,

    /// Identifier grid template (CSV, 90 rows); replaces margin-mark detection.
    #[arg(long)]
    id_template: Option<PathBuf>,

    /// File holding "width,height"; enables the bounding-box frame fallback.
    #[arg(long)]
    min_size: Option<PathBuf>,

    /// Write annotated canonical images to this directory.
    #[arg(long)]
    annotate_dir: Option<PathBuf>,

    /// Write annotated identifier-grid previews to this directory.
    #[arg(long)]
    id_annotate_dir: Option<PathBuf>,

    /// Minimum dark-pixel count for a bubble to count as filled.
    #[arg(long)]
    min_fill: Option<u32>,

    /// Horizontal offset from the first anchor mark to the grid, in pixels.
    #[arg(long, allow_hyphen_values = true)]
    offset_first: Option<i32>,

    /// Horizontal offset from the last anchor mark to the grid, in pixels.
    #[arg(long, allow_hyphen_values = true)]
    offset_last: Option<i32>,

    /// Sampling half-window radius for identifier cells, in pixels.
    #[arg(long)]
    sample_radius: Option<i32>,

    /// Worker threads (default: rayon's choice).
    #[arg(long)]
    threads: Option<usize>,

    /// Path to write per-page failures (JSON).
    #[arg(long)]
    failures_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliIdentifyArgs {
    /// Directory of scanned page images.
    #[arg(long)]
    dir: PathBuf,

    /// Path to write the identifier table (CSV).
    #[arg(long, default_value = "file_student_id.csv")]
    out: PathBuf,

    /// Identifier grid template (CSV, 90 rows); replaces margin-mark detection.
    #[arg(long)]
    id_template: Option<PathBuf>,

    /// Write annotated identifier-grid previews to this directory.
    #[arg(long)]
    annotate_dir: Option<PathBuf>,

    /// Horizontal offset from the first anchor mark to the grid, in pixels.
    #[arg(long, allow_hyphen_values = true)]
    offset_first: Option<i32>,

    /// Horizontal offset from the last anchor mark to the grid, in pixels.
    #[arg(long, allow_hyphen_values = true)]
    offset_last: Option<i32>,

    /// Worker threads (default: rayon's choice).
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct CliLocateArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// File holding "width,height"; enables the bounding-box frame fallback.
    #[arg(long)]
    min_size: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => run_process(&args),
        Commands::Identify(args) => run_identify(&args),
        Commands::Locate(args) => run_locate(&args),
    }
}

// ── process ────────────────────────────────────────────────────────────

fn run_process(args: &CliProcessArgs) -> CliResult<()> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let template = CalibrationTemplate::load(&args.template)?;
    let id_template = args
        .id_template
        .as_deref()
        .map(IdentifierTemplate::load)
        .transpose()?;

    let mut config = BatchConfig {
        annotate_answers_dir: args.annotate_dir.clone(),
        annotate_identifier_dir: args.id_annotate_dir.clone(),
        ..BatchConfig::default()
    };
    if let Some(path) = &args.min_size {
        config.frame.min_size = Some(load_min_roi_size(path)?);
    }
    config.classify.min_fill = args.min_fill;
    apply_identifier_overrides(
        &mut config,
        args.offset_first,
        args.offset_last,
        args.sample_radius,
    );

    let result = process_directory(&args.dir, &template, id_template.as_ref(), &config)?;

    write_answer_table(&args.out, &result, template.question_count())?;
    write_identifier_table(&args.id_out, &result)?;
    tracing::info!(
        "wrote {} answer rows to {}",
        result.pages.len(),
        args.out.display()
    );

    if let Some(path) = &args.failures_json {
        let body = serde_json::to_string_pretty(&result.failures)?;
        std::fs::write(path, body)?;
    }
    for failure in &result.failures {
        eprintln!("skipped {}: {}", failure.filename, failure.reason);
    }
    Ok(())
}

// ── identify ───────────────────────────────────────────────────────────

fn run_identify(args: &CliIdentifyArgs) -> CliResult<()> {
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let id_template = args
        .id_template
        .as_deref()
        .map(IdentifierTemplate::load)
        .transpose()?;

    let mut config = BatchConfig {
        annotate_identifier_dir: args.annotate_dir.clone(),
        ..BatchConfig::default()
    };
    apply_identifier_overrides(&mut config, args.offset_first, args.offset_last, None);

    let result = identify_directory(&args.dir, id_template.as_ref(), &config)?;
    write_identifier_table(&args.out, &result)?;
    tracing::info!(
        "wrote {} identifier rows to {} ({} failures)",
        result.pages.len(),
        args.out.display(),
        result.failures.len()
    );
    for failure in &result.failures {
        eprintln!("skipped {}: {}", failure.filename, failure.reason);
    }
    Ok(())
}

// ── locate ─────────────────────────────────────────────────────────────

fn run_locate(args: &CliLocateArgs) -> CliResult<()> {
    let image = image::open(&args.image)?.to_rgb8();
    let mut config = bubblegrid::FrameConfig::default();
    if let Some(path) = &args.min_size {
        config.min_size = Some(load_min_roi_size(path)?);
    }

    let quad = locate_frame(&image, &config)?;
    let ordered = quad.ordered();
    let corners: Vec<serde_json::Value> = ordered
        .corners
        .iter()
        .map(|c| serde_json::json!({ "x": c.x, "y": c.y }))
        .collect();
    let (width, height) = ordered.canonical_size()?;
    let report = serde_json::json!({
        "image": args.image.display().to_string(),
        "corners": corners,
        "canonical_width": width,
        "canonical_height": height,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn apply_identifier_overrides(
    config: &mut BatchConfig,
    offset_first: Option<i32>,
    offset_last: Option<i32>,
    sample_radius: Option<i32>,
) {
    if let Some(v) = offset_first {
        config.identifier.anchor_offset_first = v;
    }
    if let Some(v) = offset_last {
        config.identifier.anchor_offset_last = v;
    }
    if let Some(v) = sample_radius {
        config.identifier.sample_radius = v;
    }
}
