//! likeness-pipeline: Pure outline, alignment and difference engine
//! (sans-IO).
//!
//! Turns a raster image into a one-pixel outline mask through:
//! downsample -> grayscale -> box blur -> Sobel -> threshold ->
//! morphological cleanup -> boundary -> upscale.
//!
//! On top of the outlines it aligns a drawing to its reference with a
//! uniform scale plus offset (landmark least squares, bounding boxes,
//! content bounds or a center fit), scores outline overlap by IoU, and
//! computes a colour-difference heatmap.
//!
//! This crate has **no I/O dependencies**: it works on in-memory images
//! and returns structured data. Landmark detection is injected through
//! [`LandmarkDetector`]; timing through [`Clock`].

pub mod align;
pub mod blur;
pub mod contour;
pub mod diagnostics;
pub mod difference;
pub mod downsample;
pub mod edge;
pub mod grayscale;
pub mod landmarks;
pub mod layout;
pub mod mask;
pub mod negative_space;
pub mod pipeline;
pub mod score;
pub mod segments;
pub mod session;
pub mod simplify;
pub mod types;

pub use align::{AlignInputs, AlignStrategy, Alignment, SimilarityTransform, auto_align};
pub use contour::{ContourTracer, ContourTracerKind};
pub use diagnostics::{Clock, OutlineDiagnostics, SystemClock, generate_outline_with_diagnostics};
pub use difference::{Difference, compute_difference};
pub use edge::EdgeField;
pub use grayscale::GrayscaleBuffer;
pub use landmarks::{
    DetectorError, DetectorState, LandmarkDetector, LandmarkKind, LandmarkPair, LandmarkSet,
    ManagedDetector,
};
pub use mask::{BinaryMask, BorderPolicy};
pub use pipeline::{Pipeline, StagedOutline};
pub use score::{AlignmentScore, OutlineAssist, PlacedMask, score_outlines};
pub use segments::{SegmentComparison, SegmentPair, SegmentReport, Severity, compare_segments};
pub use session::{ImageRole, LayerBlend, RenderPlan, Session, ViewMode};
pub use types::{
    Dimensions, GrayImage, PipelineConfig, PipelineError, Point, Polyline, Rect, RgbaImage,
};

/// Blur `gray` with a box of `blur_radius` (rounded) and take its Sobel
/// magnitude.
#[must_use]
pub fn detect_edges(gray: &GrayscaleBuffer, blur_radius: f32) -> EdgeField {
    let blurred = blur::box_blur(gray, blur::window_radius(blur_radius));
    edge::sobel(&blurred)
}

/// Generate the outline mask of `image` at `target` size.
///
/// The work happens at most `config.max_side` pixels on the long side;
/// the one-pixel boundary is then resized (nearest) to `target`. A blank
/// or zero-area image yields an all-off mask.
///
/// Output depends only on the inputs: the same image and configuration
/// always give the same mask.
#[must_use]
pub fn generate_outline_mask(
    image: &RgbaImage,
    config: &PipelineConfig,
    target: Dimensions,
) -> BinaryMask {
    Pipeline::new(image, config.clone())
        .with_target(target)
        .downsample()
        .grayscale()
        .blur()
        .detect_edges()
        .threshold()
        .clean()
        .extract_boundary()
        .upscale()
        .into_result()
        .outline
}

/// [`generate_outline_mask`] at the size `rect` covers on the canvas.
#[must_use]
pub fn generate_outline_for_rect(image: &RgbaImage, config: &PipelineConfig, rect: Rect) -> BinaryMask {
    generate_outline_mask(image, config, layout::rect_pixels(rect))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: u32, lo: u32, hi: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn outline_matches_target_size() {
        let mask = generate_outline_mask(
            &square(60, 20, 40),
            &PipelineConfig::default(),
            Dimensions::new(90, 120),
        );
        assert_eq!(mask.dimensions(), Dimensions::new(90, 120));
        assert!(!mask.is_blank());
    }

    #[test]
    fn rect_variant_rounds_rect_size() {
        let mask = generate_outline_for_rect(
            &square(60, 20, 40),
            &PipelineConfig::default(),
            Rect::new(3.0, 4.0, 59.6, 30.2),
        );
        assert_eq!(mask.dimensions(), Dimensions::new(60, 30));
    }

    #[test]
    fn flat_image_has_no_edges() {
        let gray = GrayscaleBuffer::from_rgba(&RgbaImage::from_pixel(
            16,
            16,
            image::Rgba([120, 120, 120, 255]),
        ));
        let field = detect_edges(&gray, 2.0);
        assert!(field.max_magnitude() == 0.0);
    }
}
