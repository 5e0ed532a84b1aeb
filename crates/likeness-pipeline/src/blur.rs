//! Box blur for noise reduction before edge detection.
//!
//! A separable box filter: one horizontal pass then one vertical pass,
//! each maintaining a sliding-window running sum so the cost is linear
//! in the pixel count regardless of radius. Samples outside the image
//! repeat the nearest edge pixel.

use crate::grayscale::GrayscaleBuffer;

/// Convert a configured (possibly fractional) radius into the integer
/// window half-width used by [`box_blur`].
///
/// Non-finite and non-positive radii map to `0` (no blur).
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn window_radius(radius: f32) -> usize {
    if radius.is_finite() && radius > 0.0 {
        radius.round() as usize
    } else {
        0
    }
}

/// Apply a separable box blur with the given integer radius.
///
/// Each output pixel is the mean of the `(2r + 1)²` window around it.
/// A radius of zero returns the input unchanged.
#[must_use = "returns the blurred buffer"]
pub fn box_blur(image: &GrayscaleBuffer, radius: usize) -> GrayscaleBuffer {
    let (w, h) = (image.width() as usize, image.height() as usize);
    if radius == 0 || w == 0 || h == 0 {
        return image.clone();
    }

    let src = image.as_slice();
    let mut horizontal = vec![0.0_f32; src.len()];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        blur_line(row.len(), |i| row[i], radius, |i, v| horizontal[y * w + i] = v);
    }

    let mut vertical = vec![0.0_f32; src.len()];
    for x in 0..w {
        blur_line(h, |i| horizontal[i * w + x], radius, |i, v| {
            vertical[i * w + x] = v;
        });
    }

    GrayscaleBuffer::from_raw(image.width(), image.height(), vertical).unwrap_or_else(|| image.clone())
}

/// Running-sum box filter over a single line of `len` samples.
///
/// `read(i)` yields sample `i`; `write(i, v)` stores the result.
/// Indices outside `0..len` clamp to the nearest end.
#[allow(clippy::cast_precision_loss)]
fn blur_line(
    len: usize,
    read: impl Fn(usize) -> f32,
    radius: usize,
    mut write: impl FnMut(usize, f32),
) {
    let last = len - 1;
    let at = |i: isize| -> f32 {
        let clamped = i.clamp(0, last.cast_signed());
        read(clamped.cast_unsigned())
    };
    let r = radius.cast_signed();
    let window = (2 * radius + 1) as f32;

    let mut sum: f32 = (-r..=r).map(at).sum();
    for i in 0..len {
        write(i, sum / window);
        let i = i.cast_signed();
        sum += at(i + r + 1) - at(i - r);
    }
}
