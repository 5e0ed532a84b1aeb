//! Negative space: the parts of the reference that are not the subject.
//!
//! Anything brighter than a quarter of full luminance counts as subject;
//! the rest is washed with a translucent blue so the shapes around the
//! subject stand out.

use crate::grayscale::GrayscaleBuffer;
use crate::mask::BinaryMask;
use crate::types::RgbaImage;

/// Luminance a pixel must exceed to count as subject.
pub const SUBJECT_LUMA_CUTOFF: f32 = 0.25 * 255.0;

/// Straight RGBA wash laid over negative space.
pub const NEGATIVE_SPACE_WASH: [u8; 4] = [0, 120, 255, 64];

/// Pixels of `image` whose luminance is above [`SUBJECT_LUMA_CUTOFF`].
#[must_use]
pub fn subject_mask(image: &RgbaImage) -> BinaryMask {
    let gray = GrayscaleBuffer::from_rgba(image);
    BinaryMask::from_fn(gray.width(), gray.height(), |x, y| {
        gray.get(x, y) > SUBJECT_LUMA_CUTOFF
    })
}

/// Overlay for `subject`: [`NEGATIVE_SPACE_WASH`] where the mask is off,
/// transparent over the subject.
#[must_use]
pub fn negative_space_overlay(subject: &BinaryMask) -> RgbaImage {
    RgbaImage::from_fn(subject.width(), subject.height(), |x, y| {
        if subject.get(x, y) {
            image::Rgba([0, 0, 0, 0])
        } else {
            image::Rgba(NEGATIVE_SPACE_WASH)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_ramp() -> RgbaImage {
        RgbaImage::from_fn(256, 1, |x, _| {
            let v = u8::try_from(x).unwrap_or(u8::MAX);
            image::Rgba([v, v, v, 255])
        })
    }

    #[test]
    fn subject_starts_above_a_quarter_luminance() {
        let mask = subject_mask(&gray_ramp());
        // 63.75 is the cutoff: 63 is background, 64 is subject.
        assert!(!mask.get(63, 0));
        assert!(mask.get(64, 0));
        assert_eq!(mask.count_on(), 256 - 64);
    }

    #[test]
    fn overlay_washes_only_background() {
        let mask = subject_mask(&gray_ramp());
        let overlay = negative_space_overlay(&mask);
        assert_eq!(overlay.dimensions(), (256, 1));
        assert_eq!(overlay.get_pixel(0, 0).0, NEGATIVE_SPACE_WASH);
        assert_eq!(overlay.get_pixel(200, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn black_image_is_all_negative_space() {
        let image = RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 255]));
        let mask = subject_mask(&image);
        assert!(mask.is_blank());
        assert!(negative_space_overlay(&mask).pixels().all(|p| p.0 == NEGATIVE_SPACE_WASH));
    }
}
