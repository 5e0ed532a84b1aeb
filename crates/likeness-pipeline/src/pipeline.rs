//! Incremental outline pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use likeness_pipeline::{Pipeline, PipelineConfig, RgbaImage};
//! # fn run(image: &RgbaImage) {
//! let staged = Pipeline::new(image, PipelineConfig::default())
//!     .downsample()
//!     .grayscale()
//!     .blur()
//!     .detect_edges()
//!     .threshold()
//!     .clean()
//!     .extract_boundary()
//!     .upscale()
//!     .into_result();
//! let outline = staged.outline;
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, carrying
//! every intermediate forward so the final [`StagedOutline`] can be shown
//! stage by stage. Callers that only need the final mask should use
//! [`crate::generate_outline_mask`].

use crate::edge::EdgeField;
use crate::grayscale::GrayscaleBuffer;
use crate::mask::{BinaryMask, BorderPolicy, CleanParams};
use crate::types::{Dimensions, PipelineConfig, RgbaImage};

/// All intermediates of one outline run.
#[derive(Debug, Clone)]
pub struct StagedOutline {
    /// Image at working resolution.
    pub working: RgbaImage,
    /// Luminance of the working image.
    pub grayscale: GrayscaleBuffer,
    /// Box-blurred luminance.
    pub blurred: GrayscaleBuffer,
    /// Sobel magnitude.
    pub edges: EdgeField,
    /// Mask after the normalized cutoff.
    pub thresholded: BinaryMask,
    /// Mask after morphology and component filtering.
    pub cleaned: BinaryMask,
    /// One-pixel outline at working resolution.
    pub boundary: BinaryMask,
    /// Final outline at the target resolution.
    pub outline: BinaryMask,
    /// Cleanup parameters used by the first pass.
    pub clean_params: CleanParams,
    /// Whether cleanup fell back to relaxed parameters.
    pub clean_retried: bool,
    /// Working-resolution scale factor (`<= 1`).
    pub scale: f64,
    /// Dimensions of the final outline.
    pub dimensions: Dimensions,
}

/// Entry point for the staged outline pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Start a pipeline over `image`. The outline is produced at the
    /// image's own resolution unless [`Pending::with_target`] overrides it.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(image: &RgbaImage, config: PipelineConfig) -> Pending<'_> {
        Pending {
            target: Dimensions::of(image),
            image,
            config,
        }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing; call .downsample() to continue"]
pub struct Pending<'a> {
    config: PipelineConfig,
    image: &'a RgbaImage,
    target: Dimensions,
}

impl Pending<'_> {
    /// Produce the final outline at `target` instead of the source size,
    /// e.g. the size of the rectangle the image is displayed in.
    pub const fn with_target(mut self, target: Dimensions) -> Self {
        self.target = target;
        self
    }

    /// Advance to the downsample stage.
    pub fn downsample(self) -> Downsampled {
        let (working, scale, applied) =
            crate::downsample::downsample(self.image, self.config.max_side);
        if applied {
            log::debug!(
                "downsampled {}x{} -> {}x{}",
                self.image.width(),
                self.image.height(),
                working.width(),
                working.height(),
            );
        }
        Downsampled {
            config: self.config,
            target: self.target,
            working,
            scale,
        }
    }
}

// ───────────────────────── Stage 1: Downsampled ──────────────────────

/// Pipeline state after reducing to working resolution.
#[must_use = "pipeline stages are consumed by advancing; call .grayscale() to continue"]
pub struct Downsampled {
    config: PipelineConfig,
    target: Dimensions,
    working: RgbaImage,
    scale: f64,
}

impl Downsampled {
    /// The working-resolution image.
    #[must_use]
    pub const fn working(&self) -> &RgbaImage {
        &self.working
    }

    /// Scale factor from source to working resolution.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Advance to the grayscale stage.
    pub fn grayscale(self) -> Grayscaled {
        let grayscale = GrayscaleBuffer::from_rgba(&self.working);
        Grayscaled {
            config: self.config,
            target: self.target,
            working: self.working,
            scale: self.scale,
            grayscale,
        }
    }
}

// ───────────────────────── Stage 2: Grayscaled ───────────────────────

/// Pipeline state after luminance conversion.
#[must_use = "pipeline stages are consumed by advancing; call .blur() to continue"]
pub struct Grayscaled {
    config: PipelineConfig,
    target: Dimensions,
    working: RgbaImage,
    scale: f64,
    grayscale: GrayscaleBuffer,
}

impl Grayscaled {
    /// The luminance buffer.
    #[must_use]
    pub const fn grayscale(&self) -> &GrayscaleBuffer {
        &self.grayscale
    }

    /// Advance to the blur stage.
    pub fn blur(self) -> Blurred {
        let radius = crate::blur::window_radius(self.config.blur_radius);
        let blurred = crate::blur::box_blur(&self.grayscale, radius);
        Blurred {
            config: self.config,
            target: self.target,
            working: self.working,
            scale: self.scale,
            grayscale: self.grayscale,
            blurred,
        }
    }
}

// ───────────────────────── Stage 3: Blurred ──────────────────────────

/// Pipeline state after box blur.
#[must_use = "pipeline stages are consumed by advancing; call .detect_edges() to continue"]
pub struct Blurred {
    config: PipelineConfig,
    target: Dimensions,
    working: RgbaImage,
    scale: f64,
    grayscale: GrayscaleBuffer,
    blurred: GrayscaleBuffer,
}

impl Blurred {
    /// The blurred luminance buffer.
    #[must_use]
    pub const fn blurred(&self) -> &GrayscaleBuffer {
        &self.blurred
    }

    /// Advance to the Sobel stage.
    pub fn detect_edges(self) -> EdgesDetected {
        let edges = crate::edge::sobel(&self.blurred);
        EdgesDetected {
            config: self.config,
            target: self.target,
            working: self.working,
            scale: self.scale,
            grayscale: self.grayscale,
            blurred: self.blurred,
            edges,
        }
    }
}

// ───────────────────────── Stage 4: EdgesDetected ────────────────────

/// Pipeline state after Sobel gradient computation.
#[must_use = "pipeline stages are consumed by advancing; call .threshold() to continue"]
pub struct EdgesDetected {
    config: PipelineConfig,
    target: Dimensions,
    working: RgbaImage,
    scale: f64,
    grayscale: GrayscaleBuffer,
    blurred: GrayscaleBuffer,
    edges: EdgeField,
}

impl EdgesDetected {
    /// The edge field.
    #[must_use]
    pub const fn edges(&self) -> &EdgeField {
        &self.edges
    }

    /// Advance to the threshold stage.
    pub fn threshold(self) -> Thresholded {
        let thresholded = crate::mask::threshold(&self.edges, self.config.threshold);
        Thresholded {
            config: self.config,
            target: self.target,
            working: self.working,
            scale: self.scale,
            grayscale: self.grayscale,
            blurred: self.blurred,
            edges: self.edges,
            thresholded,
        }
    }
}

// ───────────────────────── Stage 5: Thresholded ──────────────────────

/// Pipeline state after binarization.
#[must_use = "pipeline stages are consumed by advancing; call .clean() to continue"]
pub struct Thresholded {
    config: PipelineConfig,
    target: Dimensions,
    working: RgbaImage,
    scale: f64,
    grayscale: GrayscaleBuffer,
    blurred: GrayscaleBuffer,
    edges: EdgeField,
    thresholded: BinaryMask,
}

impl Thresholded {
    /// The raw binary mask.
    #[must_use]
    pub const fn thresholded(&self) -> &BinaryMask {
        &self.thresholded
    }

    /// Advance to the cleanup stage.
    pub fn clean(self) -> Cleaned {
        let clean_params = CleanParams::from_refinement(
            self.config.refinement_level,
            self.config.min_component_pixels,
            self.scale,
        );
        let outcome = crate::mask::clean(&self.thresholded, clean_params);
        Cleaned {
            config: self.config,
            target: self.target,
            working: self.working,
            scale: self.scale,
            grayscale: self.grayscale,
            blurred: self.blurred,
            edges: self.edges,
            thresholded: self.thresholded,
            cleaned: outcome.mask,
            clean_params,
            clean_retried: outcome.retried,
        }
    }
}

// ───────────────────────── Stage 6: Cleaned ──────────────────────────

/// Pipeline state after morphological cleanup.
#[must_use = "pipeline stages are consumed by advancing; call .extract_boundary() to continue"]
pub struct Cleaned {
    config: PipelineConfig,
    target: Dimensions,
    working: RgbaImage,
    scale: f64,
    grayscale: GrayscaleBuffer,
    blurred: GrayscaleBuffer,
    edges: EdgeField,
    thresholded: BinaryMask,
    cleaned: BinaryMask,
    clean_params: CleanParams,
    clean_retried: bool,
}

impl Cleaned {
    /// The cleaned mask.
    #[must_use]
    pub const fn cleaned(&self) -> &BinaryMask {
        &self.cleaned
    }

    /// Whether cleanup needed the relaxed retry.
    #[must_use]
    pub const fn retried(&self) -> bool {
        self.clean_retried
    }

    /// Advance to the boundary stage.
    pub fn extract_boundary(self) -> Bounded {
        let boundary = crate::mask::extract_boundary(&self.cleaned, BorderPolicy::Background);
        Bounded {
            target: self.target,
            working: self.working,
            scale: self.scale,
            grayscale: self.grayscale,
            blurred: self.blurred,
            edges: self.edges,
            thresholded: self.thresholded,
            cleaned: self.cleaned,
            clean_params: self.clean_params,
            clean_retried: self.clean_retried,
            boundary,
        }
    }
}

// ───────────────────────── Stage 7: Bounded ──────────────────────────

/// Pipeline state after boundary extraction, still at working
/// resolution.
#[must_use = "pipeline stages are consumed by advancing; call .upscale() to continue"]
pub struct Bounded {
    target: Dimensions,
    working: RgbaImage,
    scale: f64,
    grayscale: GrayscaleBuffer,
    blurred: GrayscaleBuffer,
    edges: EdgeField,
    thresholded: BinaryMask,
    cleaned: BinaryMask,
    clean_params: CleanParams,
    clean_retried: bool,
    boundary: BinaryMask,
}

impl Bounded {
    /// The working-resolution outline.
    #[must_use]
    pub const fn boundary(&self) -> &BinaryMask {
        &self.boundary
    }

    /// Advance to the final stage: nearest-neighbour resize to the
    /// target dimensions.
    pub fn upscale(self) -> Outlined {
        let outline = crate::downsample::resize_mask(&self.boundary, self.target);
        Outlined {
            staged: StagedOutline {
                working: self.working,
                grayscale: self.grayscale,
                blurred: self.blurred,
                edges: self.edges,
                thresholded: self.thresholded,
                cleaned: self.cleaned,
                boundary: self.boundary,
                outline,
                clean_params: self.clean_params,
                clean_retried: self.clean_retried,
                scale: self.scale,
                dimensions: self.target,
            },
        }
    }
}

// ───────────────────────── Stage 8: Outlined ─────────────────────────

/// Pipeline state after upscaling: the final stage.
#[must_use = "call .into_result() to extract the StagedOutline"]
pub struct Outlined {
    staged: StagedOutline,
}

impl Outlined {
    /// The final outline mask.
    #[must_use]
    pub const fn outline(&self) -> &BinaryMask {
        &self.staged.outline
    }

    /// Consume the pipeline and return every intermediate.
    #[must_use]
    pub fn into_result(self) -> StagedOutline {
        self.staged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_image(size: u32, lo: u32, hi: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn stages_preserve_working_dimensions() {
        let img = square_image(60, 20, 40);
        let bounded = Pipeline::new(&img, PipelineConfig::default())
            .downsample()
            .grayscale()
            .blur()
            .detect_edges()
            .threshold()
            .clean()
            .extract_boundary();
        let dims = Dimensions::new(60, 60);
        assert_eq!(bounded.boundary().dimensions(), dims);
        let staged = bounded.upscale().into_result();
        assert_eq!(staged.grayscale.dimensions(), dims);
        assert_eq!(staged.edges.dimensions(), dims);
        assert_eq!(staged.thresholded.dimensions(), dims);
        assert_eq!(staged.cleaned.dimensions(), dims);
        assert_eq!(staged.outline.dimensions(), dims);
        assert!(!staged.outline.is_blank());
    }

    #[test]
    fn large_image_runs_at_working_resolution() {
        let img = square_image(200, 60, 140);
        let config = PipelineConfig {
            max_side: 50,
            ..PipelineConfig::default()
        };
        let staged = Pipeline::new(&img, config)
            .downsample()
            .grayscale()
            .blur()
            .detect_edges()
            .threshold()
            .clean()
            .extract_boundary()
            .upscale()
            .into_result();
        assert_eq!(staged.working.dimensions(), (50, 50));
        assert!((staged.scale - 0.25).abs() < 1e-12);
        assert_eq!(staged.boundary.dimensions(), Dimensions::new(50, 50));
        assert_eq!(staged.outline.dimensions(), Dimensions::new(200, 200));
        // Component threshold shrinks with the working resolution.
        assert!(staged.clean_params.min_component_pixels < 45);
    }

    #[test]
    fn explicit_target_sets_output_size() {
        let img = square_image(40, 10, 30);
        let staged = Pipeline::new(&img, PipelineConfig::default())
            .with_target(Dimensions::new(80, 60))
            .downsample()
            .grayscale()
            .blur()
            .detect_edges()
            .threshold()
            .clean()
            .extract_boundary()
            .upscale()
            .into_result();
        assert_eq!(staged.outline.dimensions(), Dimensions::new(80, 60));
        assert_eq!(staged.dimensions, Dimensions::new(80, 60));
    }
}
