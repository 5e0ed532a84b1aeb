//! likeness-bench: CLI tool for comparing a drawing against its reference
//! and collecting diagnostics.
//!
//! Loads both images onto a virtual canvas, generates their outlines with
//! per-stage timing, auto-aligns the drawing, then reports the outline
//! score and colour difference. Useful for:
//!
//! - Tuning blur, threshold and refinement on real drawings
//! - Measuring per-stage durations to identify bottlenecks
//! - Checking which alignment strategy a pair of images ends up with
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin likeness-bench -- [OPTIONS] <REFERENCE> <DRAWING>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use likeness_pipeline::diagnostics::{Clock, OutlineDiagnostics};
use likeness_pipeline::{Dimensions, ImageRole, PipelineConfig, RgbaImage, Session, layout};

/// Outline, alignment and difference diagnostics for likeness.
///
/// Runs the outline pipeline on both images with configurable parameters,
/// aligns the drawing to the reference and prints timing, score and
/// difference.
#[derive(Parser)]
#[command(name = "likeness-bench", version)]
struct Cli {
    /// Reference image (PNG, JPEG, BMP, WebP).
    reference: PathBuf,

    /// Drawing image (PNG, JPEG, BMP, WebP).
    drawing: PathBuf,

    /// Box blur radius in pixels.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BLUR_RADIUS)]
    blur_radius: f32,

    /// Normalized edge cutoff (0.0-1.0).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_THRESHOLD)]
    threshold: f32,

    /// Working resolution (max dimension in pixels after downsampling).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MAX_SIDE, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    max_side: u32,

    /// Minimum connected component size at full resolution.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_COMPONENT_PIXELS)]
    min_component_pixels: u32,

    /// Cleanup aggressiveness (0-100).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_REFINEMENT_LEVEL)]
    refinement_level: u8,

    /// IoU at which outlines count as aligned.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_ALIGNMENT_THRESHOLD)]
    alignment_threshold: f64,

    /// RDP tolerance in pixels for the simplified outline.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SIMPLIFY_TOLERANCE)]
    simplify_tolerance: f64,

    /// Canvas width in pixels.
    #[arg(long, default_value_t = 800)]
    canvas_width: u32,

    /// Canvas height in pixels.
    #[arg(long, default_value_t = 600)]
    canvas_height: u32,

    /// Skip auto-alignment and compare the images untransformed.
    #[arg(long)]
    no_align: bool,

    /// Write the reference outline (white on black) to a PNG.
    #[arg(long)]
    reference_outline: Option<PathBuf>,

    /// Write the drawing outline (white on black) to a PNG.
    #[arg(long)]
    drawing_outline: Option<PathBuf>,

    /// Write the difference heatmap to a PNG.
    #[arg(long)]
    heatmap: Option<PathBuf>,

    /// Write the reference's simplified outline (white on black) to a PNG.
    #[arg(long)]
    simplified_outline: Option<PathBuf>,

    /// Write the reference's subject mask (white subject, black negative
    /// space) to a PNG.
    #[arg(long)]
    subject_mask: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Either way the result is
/// validated.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        PipelineConfig {
            blur_radius: cli.blur_radius,
            threshold: cli.threshold,
            max_side: cli.max_side,
            min_component_pixels: cli.min_component_pixels,
            refinement_level: cli.refinement_level,
            alignment_threshold: cli.alignment_threshold,
            simplify_tolerance: cli.simplify_tolerance,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn load(path: &Path) -> Result<RgbaImage, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    log::info!("{}: {} bytes", path.display(), bytes.len());
    likeness_pipeline::grayscale::decode(&bytes).map_err(|e| format!("Error decoding {}: {e}", path.display()))
}

fn save(path: &Path, result: image::ImageResult<()>) {
    match result {
        Ok(()) => eprintln!("Wrote {}", path.display()),
        Err(e) => eprintln!("Error writing {}: {e}", path.display()),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let (reference, drawing) = match (load(&cli.reference), load(&cli.drawing)) {
        (Ok(r), Ok(d)) => (r, d),
        (Err(msg), _) | (_, Err(msg)) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let canvas = Dimensions::new(cli.canvas_width, cli.canvas_height);
    eprintln!(
        "Reference: {} ({}x{})",
        cli.reference.display(),
        reference.width(),
        reference.height(),
    );
    eprintln!(
        "Drawing: {} ({}x{})",
        cli.drawing.display(),
        drawing.width(),
        drawing.height(),
    );
    eprintln!("Canvas: {}x{}", canvas.width, canvas.height);
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut session = Session::new(canvas, config.clone());
    session.set_image(ImageRole::Reference, reference.clone());
    session.set_image(ImageRole::Drawing, drawing.clone());

    let alignment = if cli.no_align {
        None
    } else {
        session.auto_align(false)
    };
    let (Some(reference_rect), Some(drawing_rect)) = (session.reference_rect(), session.drawing_rect())
    else {
        eprintln!("Nothing to compare");
        return ExitCode::FAILURE;
    };

    let mut all_diagnostics = Vec::with_capacity(cli.runs);
    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        let (reference_staged, reference_diag) = likeness_pipeline::generate_outline_with_diagnostics(
            &reference,
            &config,
            layout::rect_pixels(reference_rect),
            &StdClock,
        );
        let (drawing_staged, drawing_diag) = likeness_pipeline::generate_outline_with_diagnostics(
            &drawing,
            &config,
            layout::rect_pixels(drawing_rect),
            &StdClock,
        );

        if cli.json {
            let value = serde_json::json!({
                "reference": reference_diag,
                "drawing": drawing_diag,
            });
            match serde_json::to_string_pretty(&value) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing diagnostics: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("Reference\n{}\n", reference_diag.report());
            println!("Drawing\n{}\n", drawing_diag.report());
        }

        // Write outlines on the first run only.
        if run == 0 {
            if let Some(ref path) = cli.reference_outline {
                save(path, reference_staged.outline.to_gray_image().save(path));
            }
            if let Some(ref path) = cli.drawing_outline {
                save(path, drawing_staged.outline.to_gray_image().save(path));
            }
        }

        all_diagnostics.push(reference_diag);
        all_diagnostics.push(drawing_diag);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    let score = session.score();
    let difference = session.difference();
    if let (Some(path), Some(d)) = (&cli.heatmap, &difference) {
        save(path, d.heatmap.save(path));
    }
    if let (Some(path), Some(mask)) = (
        &cli.simplified_outline,
        session.simplified_outline(ImageRole::Reference),
    ) {
        save(path, mask.to_gray_image().save(path));
    }
    if let Some(ref path) = cli.subject_mask {
        let mask = likeness_pipeline::negative_space::subject_mask(&reference);
        save(path, mask.to_gray_image().save(path));
    }

    if cli.json {
        let value = serde_json::json!({
            "alignment": alignment,
            "transform": session.transform(),
            "score": score,
            "average_difference_percent": difference.as_ref().map(|d| d.average_difference_percent),
        });
        match serde_json::to_string_pretty(&value) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing comparison: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_comparison(&session, alignment.map(|a| a.strategy), score, difference.as_ref());
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

fn print_comparison(
    session: &Session,
    strategy: Option<likeness_pipeline::AlignStrategy>,
    score: Option<likeness_pipeline::AlignmentScore>,
    difference: Option<&likeness_pipeline::Difference>,
) {
    let t = session.transform();
    println!("Comparison\n{}", "=".repeat(60));
    match strategy {
        Some(s) => println!("Alignment: {s:?}"),
        None => println!("Alignment: none"),
    }
    println!(
        "Transform: scale {:.4}, offset ({:.2}, {:.2})",
        t.scale, t.offset_x, t.offset_y,
    );
    match score {
        Some(s) => println!(
            "Outline IoU: {:.4} ({}%) {}",
            s.score,
            s.percent(),
            if s.aligned { "aligned" } else { "not aligned" },
        ),
        None => println!("Outline IoU: n/a"),
    }
    match difference {
        Some(d) => println!(
            "Difference: {:.2}% over {}x{}",
            d.average_difference_percent,
            d.heatmap.width(),
            d.heatmap.height(),
        ),
        None => println!("Difference: n/a"),
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[OutlineDiagnostics]) {
    println!();
    println!(
        "Summary ({} outlines)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let stage_count = all_diagnostics[0].stages().len();
    for i in 0..stage_count {
        let name = all_diagnostics[0].stages()[i].0;
        let total: f64 = all_diagnostics
            .iter()
            .map(|d| d.stages()[i].1.duration.as_secs_f64() * 1000.0)
            .sum();
        let stage_mean = total / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
