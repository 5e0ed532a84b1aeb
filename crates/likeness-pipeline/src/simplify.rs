//! Simplified outline: a clean, low-detail line drawing of an image's
//! bright regions.
//!
//! Pixels brighter than a luminance cutoff form a mask; its region
//! borders are traced, reduced with Ramer-Douglas-Peucker, and redrawn as
//! closed one-pixel polylines. The result reads as the "big shapes" of a
//! photo, which is what an artist blocks in first.

use image::Luma;
use imageproc::drawing::draw_line_segment_mut;

use crate::contour::{ContourTracer, ContourTracerKind};
use crate::grayscale::GrayscaleBuffer;
use crate::mask::BinaryMask;
use crate::types::{GrayImage, Point, Polyline, RgbaImage};

/// Luminance a pixel must exceed to count as a bright region.
pub const DEFAULT_LUMA_CUTOFF: f32 = 128.0;

/// Simplify a single polyline with Ramer-Douglas-Peucker.
///
/// Points within `tolerance` of the chord between kept neighbours are
/// dropped; endpoints are always kept. Polylines shorter than three
/// points come back unchanged, as does everything when `tolerance` is 0.
#[must_use = "returns the simplified polyline"]
pub fn simplify(polyline: &Polyline, tolerance: f64) -> Polyline {
    let points = polyline.points();
    if points.len() < 3 {
        return polyline.clone();
    }

    let last = points.len() - 1;
    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[last] = true;

    // Explicit work stack; contours of large masks can run to thousands
    // of points.
    let mut spans = vec![(0, last)];
    while let Some((start, end)) = spans.pop() {
        if end <= start + 1 {
            continue;
        }
        let (far, dist) = (start + 1..end)
            .map(|i| (i, chord_distance(points[i], points[start], points[end])))
            .fold((start, 0.0_f64), |best, cur| if cur.1 > best.1 { cur } else { best });
        if dist > tolerance {
            kept[far] = true;
            spans.push((start, far));
            spans.push((far, end));
        }
    }

    Polyline::new(
        points
            .iter()
            .zip(&kept)
            .filter_map(|(&p, &k)| k.then_some(p))
            .collect(),
    )
}

/// Distance from `p` to the line through `a` and `b`, or to `a` when the
/// two coincide.
fn chord_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = dx.hypot(dy);
    if len == 0.0 {
        return p.distance(a);
    }
    dx.mul_add(a.y - p.y, -(dy * (a.x - p.x))).abs() / len
}

/// Draw each polyline as a closed loop into a mask of the given size.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn rasterize_closed(polylines: &[Polyline], width: u32, height: u32) -> BinaryMask {
    let mut canvas = GrayImage::new(width, height);
    let ink = Luma([255_u8]);
    for polyline in polylines {
        let pts = polyline.points();
        match pts {
            [] => {}
            [only] => draw_line_segment_mut(
                &mut canvas,
                (only.x as f32, only.y as f32),
                (only.x as f32, only.y as f32),
                ink,
            ),
            _ => {
                for (i, a) in pts.iter().enumerate() {
                    let b = pts[(i + 1) % pts.len()];
                    draw_line_segment_mut(
                        &mut canvas,
                        (a.x as f32, a.y as f32),
                        (b.x as f32, b.y as f32),
                        ink,
                    );
                }
            }
        }
    }
    BinaryMask::from_gray_image(&canvas)
}

/// Produce the simplified outline of `image`.
///
/// `luma_cutoff` selects the bright regions (luminance strictly above
/// it); `tolerance` is the RDP distance in pixels.
#[must_use]
pub fn simplified_outline(image: &RgbaImage, luma_cutoff: f32, tolerance: f64) -> BinaryMask {
    let gray = GrayscaleBuffer::from_rgba(image);
    let bright = BinaryMask::from_fn(gray.width(), gray.height(), |x, y| {
        gray.get(x, y) > luma_cutoff
    });
    let contours = ContourTracerKind::BorderFollowing.trace(&bright);
    let simplified: Vec<Polyline> = contours.iter().map(|c| simplify(c, tolerance)).collect();
    log::debug!(
        "simplified outline: {} contours, {} -> {} points",
        contours.len(),
        contours.iter().map(Polyline::len).sum::<usize>(),
        simplified.iter().map(Polyline::len).sum::<usize>(),
    );
    rasterize_closed(&simplified, gray.width(), gray.height())
}
