//! Sobel gradient magnitude.
//!
//! Produces a continuous-valued [`EdgeField`] from a (usually blurred)
//! grayscale buffer. Binarization happens later in [`crate::mask`].

use crate::grayscale::GrayscaleBuffer;
use crate::types::{Dimensions, GrayImage};

/// Horizontal Sobel kernel, row-major.
const SOBEL_X: [f32; 9] = [-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0];

/// Vertical Sobel kernel (transpose of [`SOBEL_X`]), row-major.
const SOBEL_Y: [f32; 9] = [-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0];

/// Per-pixel gradient magnitude plus its observed maximum.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeField {
    width: u32,
    height: u32,
    magnitude: Vec<f32>,
    max_magnitude: f32,
}

impl EdgeField {
    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Field dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Row-major magnitudes.
    #[must_use]
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitude
    }

    /// Magnitude at `(x, y)`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.magnitude[y as usize * self.width as usize + x as usize]
    }

    /// Largest magnitude in the field (`0.0` for a flat or empty image).
    #[must_use]
    pub const fn max_magnitude(&self) -> f32 {
        self.max_magnitude
    }

    /// Magnitude normalized into `0..=255` for previews.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_gray_image(&self) -> GrayImage {
        let scale = if self.max_magnitude > 0.0 {
            255.0 / self.max_magnitude
        } else {
            0.0
        };
        let raw = self
            .magnitude
            .iter()
            .map(|&m| (m * scale).round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage::from_raw(self.width, self.height, raw).unwrap_or_default()
    }
}

/// Compute the Sobel gradient magnitude `hypot(gx, gy)` of every pixel.
///
/// The outermost rows and columns are left at zero because the kernel
/// needs a full 3×3 neighbourhood. Images smaller than 3×3 therefore
/// produce an all-zero field, and zero-area input an empty one.
#[must_use = "returns the edge field"]
pub fn sobel(image: &GrayscaleBuffer) -> EdgeField {
    let (w, h) = (image.width() as usize, image.height() as usize);
    let src = image.as_slice();
    let mut magnitude = vec![0.0_f32; src.len()];
    let mut max_magnitude = 0.0_f32;

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let mut gx = 0.0_f32;
            let mut gy = 0.0_f32;
            for ky in 0..3 {
                for kx in 0..3 {
                    let v = src[(y + ky - 1) * w + (x + kx - 1)];
                    gx = SOBEL_X[ky * 3 + kx].mul_add(v, gx);
                    gy = SOBEL_Y[ky * 3 + kx].mul_add(v, gy);
                }
            }
            let m = gx.hypot(gy);
            magnitude[y * w + x] = m;
            max_magnitude = max_magnitude.max(m);
        }
    }

    EdgeField {
        width: image.width(),
        height: image.height(),
        magnitude,
        max_magnitude,
    }
}
