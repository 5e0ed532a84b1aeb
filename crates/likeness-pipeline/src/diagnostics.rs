//! Outline diagnostics: timing and counts for each pipeline stage.
//!
//! Durations are measured through the [`Clock`] trait so the library
//! stays sans-IO and tests can drive time by hand. [`SystemClock`] is the
//! ordinary implementation, backed by `web-time` (which uses
//! `performance.now()` on WASM and `std::time::Instant` on native).
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mask::BinaryMask;
use crate::pipeline::{Pipeline, StagedOutline};
use crate::types::{Dimensions, PipelineConfig, RgbaImage};

/// Source of monotonic time.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single outline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineDiagnostics {
    /// Reduction to working resolution.
    pub downsample: StageDiagnostics,
    /// Luminance conversion.
    pub grayscale: StageDiagnostics,
    /// Box blur.
    pub blur: StageDiagnostics,
    /// Sobel gradient.
    pub edge_detection: StageDiagnostics,
    /// Normalized cutoff.
    pub threshold: StageDiagnostics,
    /// Morphology, pruning, component filtering.
    pub clean: StageDiagnostics,
    /// Boundary extraction.
    pub boundary: StageDiagnostics,
    /// Nearest-neighbour resize to the target.
    pub upscale: StageDiagnostics,
    /// Total wall-clock duration (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    Downsample {
        /// Source size.
        source: Dimensions,
        /// Working size.
        working: Dimensions,
        /// Source-to-working scale factor.
        scale: f64,
    },
    Grayscale {
        width: u32,
        height: u32,
    },
    Blur {
        /// Integer window half-width actually applied.
        radius: usize,
    },
    EdgeDetection {
        /// Strongest gradient observed.
        max_magnitude: f32,
    },
    Threshold {
        /// Fraction of the maximum a pixel must exceed.
        cutoff: f32,
        on_pixels: usize,
        total_pixels: usize,
    },
    Clean {
        pixels_before: usize,
        pixels_after: usize,
        min_neighbours: u8,
        min_component_pixels: u32,
        close: bool,
        /// Whether the relaxed retry was taken.
        retried: bool,
    },
    Boundary {
        on_pixels: usize,
    },
    Upscale {
        target: Dimensions,
        on_pixels: usize,
    },
}

impl OutlineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Outline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());
        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.join("\n")
    }

    /// Stages in execution order, with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 8] {
        [
            ("Downsample", &self.downsample),
            ("Grayscale", &self.grayscale),
            ("Blur", &self.blur),
            ("Edge Detection", &self.edge_detection),
            ("Threshold", &self.threshold),
            ("Clean", &self.clean),
            ("Boundary", &self.boundary),
            ("Upscale", &self.upscale),
        ]
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Downsample {
            source,
            working,
            scale,
        } => format!(
            "{}x{} -> {}x{} (x{scale:.3})",
            source.width, source.height, working.width, working.height,
        ),
        StageMetrics::Grayscale { width, height } => format!("{width}x{height}"),
        StageMetrics::Blur { radius } => format!("radius={radius}"),
        StageMetrics::EdgeDetection { max_magnitude } => format!("max={max_magnitude:.1}"),
        StageMetrics::Threshold {
            cutoff,
            on_pixels,
            total_pixels,
        } => {
            let density = if *total_pixels > 0 {
                *on_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            format!("cutoff={cutoff:.2} on={on_pixels} ({density:.1}%)")
        }
        StageMetrics::Clean {
            pixels_before,
            pixels_after,
            min_neighbours,
            min_component_pixels,
            close,
            retried,
        } => format!(
            "{pixels_before}->{pixels_after} px (neighbours>={min_neighbours} component>={min_component_pixels} close={close}{})",
            if *retried { " retried" } else { "" },
        ),
        StageMetrics::Boundary { on_pixels } => format!("on={on_pixels}"),
        StageMetrics::Upscale { target, on_pixels } => {
            format!("{}x{} on={on_pixels}", target.width, target.height)
        }
    }
}

/// Time one stage transition, returning the new state and its duration.
fn timed<C: Clock, T>(clock: &C, f: impl FnOnce() -> T) -> (T, Duration) {
    let start = clock.now();
    let out = f();
    (out, clock.elapsed(&start))
}

fn on_pixels(mask: &BinaryMask) -> usize {
    mask.count_on()
}

/// Run the staged outline pipeline, timing every stage.
///
/// Produces the same [`StagedOutline`] as driving [`Pipeline`] by hand,
/// plus per-stage [`OutlineDiagnostics`].
pub fn generate_outline_with_diagnostics<C: Clock>(
    image: &RgbaImage,
    config: &PipelineConfig,
    target: Dimensions,
    clock: &C,
) -> (StagedOutline, OutlineDiagnostics) {
    let total_start = clock.now();
    let source = Dimensions::of(image);

    let pending = Pipeline::new(image, config.clone()).with_target(target);

    let (downsampled, d_downsample) = timed(clock, || pending.downsample());
    let downsample = StageDiagnostics {
        duration: d_downsample,
        metrics: StageMetrics::Downsample {
            source,
            working: Dimensions::of(downsampled.working()),
            scale: downsampled.scale(),
        },
    };

    let (grayscaled, d_gray) = timed(clock, || downsampled.grayscale());
    let grayscale = StageDiagnostics {
        duration: d_gray,
        metrics: StageMetrics::Grayscale {
            width: grayscaled.grayscale().width(),
            height: grayscaled.grayscale().height(),
        },
    };

    let (blurred, d_blur) = timed(clock, || grayscaled.blur());
    let blur = StageDiagnostics {
        duration: d_blur,
        metrics: StageMetrics::Blur {
            radius: crate::blur::window_radius(config.blur_radius),
        },
    };

    let (edged, d_edge) = timed(clock, || blurred.detect_edges());
    let edge_detection = StageDiagnostics {
        duration: d_edge,
        metrics: StageMetrics::EdgeDetection {
            max_magnitude: edged.edges().max_magnitude(),
        },
    };

    let (thresholded, d_threshold) = timed(clock, || edged.threshold());
    let threshold = StageDiagnostics {
        duration: d_threshold,
        metrics: StageMetrics::Threshold {
            cutoff: config.threshold,
            on_pixels: on_pixels(thresholded.thresholded()),
            total_pixels: thresholded.thresholded().dimensions().pixel_count(),
        },
    };
    let pixels_before = on_pixels(thresholded.thresholded());

    let (cleaned, d_clean) = timed(clock, || thresholded.clean());
    let clean_retried = cleaned.retried();
    let pixels_after = on_pixels(cleaned.cleaned());

    let (bounded, d_boundary) = timed(clock, || cleaned.extract_boundary());
    let boundary = StageDiagnostics {
        duration: d_boundary,
        metrics: StageMetrics::Boundary {
            on_pixels: on_pixels(bounded.boundary()),
        },
    };

    let (outlined, d_upscale) = timed(clock, || bounded.upscale());
    let staged = outlined.into_result();

    let clean = StageDiagnostics {
        duration: d_clean,
        metrics: StageMetrics::Clean {
            pixels_before,
            pixels_after,
            min_neighbours: staged.clean_params.min_neighbours,
            min_component_pixels: staged.clean_params.min_component_pixels,
            close: staged.clean_params.close,
            retried: clean_retried,
        },
    };
    let upscale = StageDiagnostics {
        duration: d_upscale,
        metrics: StageMetrics::Upscale {
            target: staged.dimensions,
            on_pixels: on_pixels(&staged.outline),
        },
    };

    let diagnostics = OutlineDiagnostics {
        downsample,
        grayscale,
        blur,
        edge_detection,
        threshold,
        clean,
        boundary,
        upscale,
        total_duration: clock.elapsed(&total_start),
    };
    log::debug!(
        "outline {}x{} in {:.3}ms",
        target.width,
        target.height,
        duration_ms(diagnostics.total_duration),
    );
    (staged, diagnostics)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Clock that advances one millisecond per reading.
    struct SteppingClock {
        ticks: Cell<u64>,
    }

    impl Clock for SteppingClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.ticks.get() + 1;
            self.ticks.set(t);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn square() -> RgbaImage {
        RgbaImage::from_fn(40, 40, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn diagnostics_match_staged_result() {
        let clock = SteppingClock { ticks: Cell::new(0) };
        let img = square();
        let (staged, diag) = generate_outline_with_diagnostics(
            &img,
            &PipelineConfig::default(),
            Dimensions::new(40, 40),
            &clock,
        );
        match diag.upscale.metrics {
            StageMetrics::Upscale { on_pixels, target } => {
                assert_eq!(on_pixels, staged.outline.count_on());
                assert_eq!(target, Dimensions::new(40, 40));
            }
            ref other => panic!("unexpected metrics {other:?}"),
        }
        // Each stage reads the clock twice, one tick apart.
        for (_, stage) in diag.stages() {
            assert_eq!(stage.duration, Duration::from_millis(1));
        }
        assert!(diag.total_duration >= Duration::from_millis(8));
    }

    #[test]
    fn report_lists_every_stage() {
        let clock = SteppingClock { ticks: Cell::new(0) };
        let img = square();
        let (_, diag) = generate_outline_with_diagnostics(
            &img,
            &PipelineConfig::default(),
            Dimensions::new(40, 40),
            &clock,
        );
        let report = diag.report();
        assert!(report.contains("Outline Diagnostics Report"));
        for (name, _) in diag.stages() {
            assert!(report.contains(name), "missing {name}");
        }
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let clock = SteppingClock { ticks: Cell::new(0) };
        let img = square();
        let (_, diag) = generate_outline_with_diagnostics(
            &img,
            &PipelineConfig::default(),
            Dimensions::new(40, 40),
            &clock,
        );
        let json = serde_json::to_value(&diag).unwrap();
        let blur_secs = json["blur"]["duration"].as_f64().unwrap();
        assert!((blur_secs - 0.001).abs() < 1e-9);
        let back: OutlineDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.blur.duration, Duration::from_millis(1));
    }
}
