//! Shared types for the likeness engine.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbaImage` so downstream crates can reference the
/// decoded reference and drawing images without depending on `image`
/// directly.
pub use image::RgbaImage;

/// A 2D point.
///
/// The coordinate space (image pixels or canvas pixels) is not encoded
/// in the type. Every API that crosses between the two spaces takes the
/// image [`Dimensions`] and the canvas [`Rect`] it is displayed in and
/// converts explicitly (see [`crate::layout`]).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Whether both coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// A sequence of connected points forming a path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of<P: image::Pixel>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Total pixel count.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// An axis-aligned rectangle in canvas (display) space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing every point, or `None` for an
    /// empty slice.
    #[must_use]
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            self.width.mul_add(0.5, self.x),
            self.height.mul_add(0.5, self.y),
        )
    }

    /// Returns `true` if the rectangle has no area.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Whether `p` lies inside the half-open rectangle.
    #[must_use]
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.x + self.width && p.y < self.y + self.height
    }
}

/// Configuration for the outline pipeline and the alignment assist.
///
/// All parameters have sensible defaults; see the `DEFAULT_*`
/// constants. Deserialization fills missing fields from [`Default`], so
/// partial JSON configs are accepted.
///
/// # Threshold policy
///
/// `threshold` is a fraction of the strongest gradient in the image
/// (normalized policy): a pixel is an edge when
/// `magnitude / max_magnitude > threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Box blur radius in pixels, applied before Sobel. Rounded to the
    /// nearest integer; `0` disables blurring.
    pub blur_radius: f32,

    /// Longest side of the working resolution. Larger images are
    /// downscaled before edge detection and the resulting mask is
    /// upscaled back.
    pub max_side: u32,

    /// Normalized edge cutoff in `[0, 1)`.
    pub threshold: f32,

    /// Minimum connected component size, in pixels at full resolution.
    /// Scaled by the square of the working-resolution factor.
    pub min_component_pixels: u32,

    /// IoU at or above which the outlines count as aligned.
    pub alignment_threshold: f64,

    /// Cleanup aggressiveness, `0..=100`.
    pub refinement_level: u8,

    /// Ramer-Douglas-Peucker tolerance for the simplified outline.
    pub simplify_tolerance: f64,
}

impl PipelineConfig {
    /// Default box blur radius.
    pub const DEFAULT_BLUR_RADIUS: f32 = 1.0;
    /// Default working resolution cap.
    pub const DEFAULT_MAX_SIDE: u32 = 640;
    /// Default normalized edge cutoff.
    pub const DEFAULT_THRESHOLD: f32 = 0.22;
    /// Default minimum component size.
    pub const DEFAULT_MIN_COMPONENT_PIXELS: u32 = 45;
    /// Default IoU alignment threshold.
    pub const DEFAULT_ALIGNMENT_THRESHOLD: f64 = 0.78;
    /// Default refinement level.
    pub const DEFAULT_REFINEMENT_LEVEL: u8 = 50;
    /// Default RDP tolerance for the simplified outline.
    pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 2.5;

    /// Check the configuration for out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first invalid
    /// field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.blur_radius.is_finite() || self.blur_radius < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "blur_radius must be finite and >= 0, got {}",
                self.blur_radius
            )));
        }
        if self.max_side == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_side must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold must be in [0, 1), got {}",
                self.threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.alignment_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "alignment_threshold must be in [0, 1], got {}",
                self.alignment_threshold
            )));
        }
        if self.refinement_level > 100 {
            return Err(PipelineError::InvalidConfig(format!(
                "refinement_level must be at most 100, got {}",
                self.refinement_level
            )));
        }
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "simplify_tolerance must be finite and >= 0, got {}",
                self.simplify_tolerance
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_radius: Self::DEFAULT_BLUR_RADIUS,
            max_side: Self::DEFAULT_MAX_SIDE,
            threshold: Self::DEFAULT_THRESHOLD,
            min_component_pixels: Self::DEFAULT_MIN_COMPONENT_PIXELS,
            alignment_threshold: Self::DEFAULT_ALIGNMENT_THRESHOLD,
            refinement_level: Self::DEFAULT_REFINEMENT_LEVEL,
            simplify_tolerance: Self::DEFAULT_SIMPLIFY_TOLERANCE,
        }
    }
}

/// Errors that can occur in the engine.
///
/// Degenerate inputs (blank images, empty landmark sets) are not
/// errors; they produce neutral results. Only decoding and configuration
/// problems surface here.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}
