//! Resizing between the caller's resolution and the working resolution.
//!
//! Edge detection runs on an image whose longest side is at most
//! `max_side` pixels, bounding the cost of every downstream stage. Masks
//! produced at the working resolution are scaled back up with
//! nearest-neighbour sampling so outlines keep hard edges.

use image::imageops::{self, FilterType};

use crate::mask::BinaryMask;
use crate::types::{Dimensions, RgbaImage};

/// Scale factor (`<= 1`) that fits `dims` within `max_side` on its
/// longest axis.
#[must_use]
pub fn working_scale(dims: Dimensions, max_side: u32) -> f64 {
    let long_axis = dims.width.max(dims.height);
    if long_axis == 0 || long_axis <= max_side {
        1.0
    } else {
        f64::from(max_side) / f64::from(long_axis)
    }
}

/// Dimensions after applying `scale`, rounded and at least 1×1.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn scaled_dimensions(dims: Dimensions, scale: f64) -> Dimensions {
    let axis = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
    Dimensions::new(axis(dims.width), axis(dims.height))
}

/// Downsample so the longest axis is at most `max_side` pixels,
/// preserving aspect ratio.
///
/// Returns the (possibly unchanged) image, the scale factor applied, and
/// whether resampling actually happened.
#[must_use]
pub fn downsample(image: &RgbaImage, max_side: u32) -> (RgbaImage, f64, bool) {
    let dims = Dimensions::of(image);
    let scale = working_scale(dims, max_side);
    if (scale - 1.0).abs() < f64::EPSILON {
        return (image.clone(), 1.0, false);
    }
    let target = scaled_dimensions(dims, scale);
    let resized = imageops::resize(image, target.width, target.height, FilterType::Triangle);
    (resized, scale, true)
}

/// Resample an RGBA image to exactly `width × height`.
///
/// Used when two rasters must share a pixel grid (difference scoring,
/// content scans).
#[must_use]
pub fn resize_to(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.width() == width && image.height() == height {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Nearest-neighbour resize of a mask to `target`.
#[must_use]
pub fn resize_mask(mask: &BinaryMask, target: Dimensions) -> BinaryMask {
    if mask.dimensions() == target {
        return mask.clone();
    }
    let resized = imageops::resize(
        &mask.to_gray_image(),
        target.width,
        target.height,
        FilterType::Nearest,
    );
    BinaryMask::from_gray_image(&resized)
}
