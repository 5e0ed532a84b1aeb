//! Per-pixel colour difference between the reference and the drawing.
//!
//! Both images are resampled to a common size (the smaller of their
//! on-canvas extents, per axis) and compared channel by channel. The
//! result is a translucent red heatmap plus the mean difference as a
//! percentage.

use crate::downsample::resize_to;
use crate::types::{Dimensions, Rect, RgbaImage};

/// Heatmap opacity gain: a pixel reaches full opacity at ~71 % difference.
const HEATMAP_GAIN: f64 = 1.4;

/// Heatmap colour (RGB); alpha carries the difference.
const HEATMAP_RGB: [u8; 3] = [255, 64, 64];

/// Heatmap and summary of a difference comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    /// `(255, 64, 64, alpha)` per pixel, alpha proportional to the
    /// difference.
    pub heatmap: RgbaImage,
    /// Mean normalized difference, `0..=100`.
    pub average_difference_percent: f64,
}

impl Difference {
    /// Heatmap size.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.heatmap)
    }

    /// Where the heatmap is shown: centered on a canvas of size `canvas`.
    #[must_use]
    pub fn placement(&self, canvas: Dimensions) -> Rect {
        let (w, h) = (
            f64::from(self.heatmap.width()),
            f64::from(self.heatmap.height()),
        );
        Rect::new(
            (f64::from(canvas.width) - w) / 2.0,
            (f64::from(canvas.height) - h) / 2.0,
            w,
            h,
        )
    }
}

/// Compare `reference` and `drawing` as displayed in their rects.
///
/// Returns `None` when the common size rounds to zero on either axis.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn compute_difference(
    reference: &RgbaImage,
    drawing: &RgbaImage,
    reference_rect: Rect,
    drawing_rect: Rect,
) -> Option<Difference> {
    let width = reference_rect.width.min(drawing_rect.width).round();
    let height = reference_rect.height.min(drawing_rect.height).round();
    if !(width >= 1.0 && height >= 1.0) {
        return None;
    }
    let (width, height) = (width as u32, height as u32);
    if Dimensions::of(reference).is_empty() || Dimensions::of(drawing).is_empty() {
        return None;
    }

    let a = resize_to(reference, width, height);
    let b = resize_to(drawing, width, height);

    let mut total = 0.0;
    let mut heatmap = RgbaImage::new(width, height);
    for ((pa, pb), out) in a.pixels().zip(b.pixels()).zip(heatmap.pixels_mut()) {
        let channel_sum: u16 = (0..3).map(|c| u16::from(pa.0[c].abs_diff(pb.0[c]))).sum();
        let diff = f64::from(channel_sum) / 765.0;
        total += diff;
        let alpha = (diff * 255.0 * HEATMAP_GAIN).round().min(255.0) as u8;
        let [r, g, bl] = HEATMAP_RGB;
        *out = image::Rgba([r, g, bl, alpha]);
    }

    let count = f64::from(width) * f64::from(height);
    let average_difference_percent = total / count * 100.0;
    log::debug!("difference {width}x{height}: {average_difference_percent:.2}%");
    Some(Difference {
        heatmap,
        average_difference_percent,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            image::Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 90, 255])
        })
    }

    #[test]
    fn identical_images_have_no_difference() {
        let img = gradient(64, 48);
        let rect = Rect::new(0.0, 0.0, 64.0, 48.0);
        let d = compute_difference(&img, &img, rect, rect).unwrap();
        assert!(d.average_difference_percent == 0.0);
        assert!(d.heatmap.pixels().all(|p| p.0 == [255, 64, 64, 0]));
    }

    #[test]
    fn black_versus_white_is_total_difference() {
        let black = RgbaImage::from_pixel(10, 10, image::Rgba([0, 0, 0, 255]));
        let white = RgbaImage::from_pixel(10, 10, image::Rgba([255, 255, 255, 255]));
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let d = compute_difference(&black, &white, rect, rect).unwrap();
        assert!((d.average_difference_percent - 100.0).abs() < 1e-9);
        assert_eq!(d.heatmap.get_pixel(3, 3).0[3], 255);
    }

    #[test]
    fn heatmap_alpha_scales_with_gain() {
        // One channel off by 255: diff = 1/3, alpha = round(85 * 1.4) = 119.
        let a = RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255]));
        let b = RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 255]));
        let rect = Rect::new(0.0, 0.0, 4.0, 4.0);
        let d = compute_difference(&a, &b, rect, rect).unwrap();
        assert_eq!(d.heatmap.get_pixel(0, 0).0[3], 119);
        assert!((d.average_difference_percent - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn target_is_smaller_extent_per_axis() {
        let img = gradient(30, 30);
        let d = compute_difference(
            &img,
            &img,
            Rect::new(0.0, 0.0, 120.4, 40.0),
            Rect::new(5.0, 5.0, 80.0, 90.6),
        )
        .unwrap();
        assert_eq!(d.dimensions(), Dimensions::new(80, 40));
        assert_eq!(d.placement(Dimensions::new(100, 100)), Rect::new(10.0, 30.0, 80.0, 40.0));
    }

    #[test]
    fn zero_area_target_is_none() {
        let img = gradient(8, 8);
        let rect = Rect::new(0.0, 0.0, 8.0, 8.0);
        assert!(compute_difference(&img, &img, rect, Rect::new(0.0, 0.0, 0.4, 8.0)).is_none());
        assert!(compute_difference(&img, &img, Rect::default(), rect).is_none());
    }
}
