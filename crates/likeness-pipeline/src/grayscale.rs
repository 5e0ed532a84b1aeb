//! Image decoding and grayscale conversion.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces an RGBA
//! raster, then converts RGBA rasters into a continuous-valued
//! [`GrayscaleBuffer`] for the edge detector.

use crate::types::{Dimensions, GrayImage, PipelineError, RgbaImage};

/// Luminance weights for red, green and blue.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// A single-channel floating-point image with values in `0.0..=255.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayscaleBuffer {
    width: u32,
    height: u32,
    luminance: Vec<f32>,
}

impl GrayscaleBuffer {
    /// Build a buffer from raw row-major luminance values.
    ///
    /// Returns `None` if `luminance.len() != width * height`.
    #[must_use]
    pub fn from_raw(width: u32, height: u32, luminance: Vec<f32>) -> Option<Self> {
        (luminance.len() == Dimensions::new(width, height).pixel_count()).then_some(Self {
            width,
            height,
            luminance,
        })
    }

    /// Convert an RGBA image using `0.299R + 0.587G + 0.114B`.
    ///
    /// Alpha is ignored.
    #[must_use]
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let luminance = image
            .pixels()
            .map(|p| {
                let [r, g, b, _] = p.0;
                luma(r, g, b)
            })
            .collect();
        Self {
            width: image.width(),
            height: image.height(),
            luminance,
        }
    }

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

    /// Buffer dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Row-major luminance values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.luminance
    }

    /// Luminance at `(x, y)`. Panics on out-of-range coordinates like
    /// slice indexing.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.luminance[y as usize * self.width as usize + x as usize]
    }

    /// Quantize into an 8-bit grayscale image for previews.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_gray_image(&self) -> GrayImage {
        let raw = self
            .luminance
            .iter()
            .map(|&v| v.round().clamp(0.0, 255.0) as u8)
            .collect();
        GrayImage::from_raw(self.width, self.height, raw).unwrap_or_default()
    }
}

/// Decode raw image bytes into an RGBA raster.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}

/// Quantize luminance into `levels` flat bands, preserving alpha.
///
/// Each pixel becomes `floor(luma / 255 * levels) / levels * 255`, so the
/// top band never reaches pure white. This is the banding behind
/// [`simplified_planes`]. A `levels` of zero is treated as one.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn posterize(image: &RgbaImage, levels: u32) -> RgbaImage {
    let levels = levels.max(1) as f32;
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let bucket = (luma(r, g, b) / 255.0 * levels).floor();
        let value = (bucket / levels * 255.0).clamp(0.0, 255.0) as u8;
        image::Rgba([value, value, value, a])
    })
}

/// Round the channel mean to the nearest of `levels` evenly spaced tones,
/// preserving alpha.
///
/// Tones are `k * 255 / (levels - 1)`, so pure black and pure white both
/// survive. This is the banding of the posterized view. Fewer than two
/// levels collapse everything to black or white.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn posterize_tones(image: &RgbaImage, levels: u32) -> RgbaImage {
    let step = 255.0 / levels.saturating_sub(1).max(1) as f32;
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let mean = (f32::from(r) + f32::from(g) + f32::from(b)) / 3.0;
        let value = ((mean / step).round() * step).clamp(0.0, 255.0) as u8;
        image::Rgba([value, value, value, a])
    })
}

/// Bands above this warm up, bands below cool down.
const WARM_ABOVE: u8 = 170;
const COOL_BELOW: u8 = 90;
const TEMPERATURE_SHIFT: u8 = 10;

/// Simplified planes: [`posterize`] into `levels` bands, with light
/// bands nudged warm (more red) and dark bands nudged cool (less blue)
/// so adjacent planes separate at a glance.
#[must_use]
pub fn simplified_planes(image: &RgbaImage, levels: u32) -> RgbaImage {
    let mut planes = posterize(image, levels);
    for pixel in planes.pixels_mut() {
        let [value, _, _, a] = pixel.0;
        let red = if value > WARM_ABOVE {
            value.saturating_add(TEMPERATURE_SHIFT)
        } else {
            value
        };
        let blue = if value < COOL_BELOW {
            value.saturating_sub(TEMPERATURE_SHIFT)
        } else {
            value
        };
        pixel.0 = [red, value, blue, a];
    }
    planes
}

fn luma(r: u8, g: u8, b: u8) -> f32 {
    LUMA_WEIGHTS[2].mul_add(
        f32::from(b),
        LUMA_WEIGHTS[0].mul_add(f32::from(r), LUMA_WEIGHTS[1] * f32::from(g)),
    )
}
