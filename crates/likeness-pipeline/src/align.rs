//! Automatic alignment of the drawing onto the reference.
//!
//! Every strategy produces a [`SimilarityTransform`]: a uniform scale
//! about the center of the drawing's untransformed rect followed by a
//! translation. Rotation is never estimated.
//!
//! [`auto_align`] tries, in order:
//!
//! 1. a least-squares fit over corresponding landmarks (face, then pose),
//!    and then landmark bounding boxes, but only when landmarks are
//!    preferred;
//! 2. the bounding boxes of non-background content in both images,
//!    unless either image's content fills the frame;
//! 3. landmark bounding boxes;
//! 4. fitting the drawing's rect inside the reference's rect.

use serde::{Deserialize, Serialize};

use crate::landmarks::{LandmarkKind, LandmarkPair};
use crate::layout;
use crate::types::{Dimensions, Point, Rect, RgbaImage};

/// Most landmark pairs the least-squares fit samples.
const MAX_FIT_SAMPLES: usize = 200;

/// Longest side of the raster scanned by [`content_bounds`].
const CONTENT_SCAN_SIDE: u32 = 320;

/// Alpha a pixel must exceed to count as content.
const CONTENT_MIN_ALPHA: u8 = 20;

/// Mean channel brightness at or above which a pixel is background
/// (paper white).
const CONTENT_MAX_BRIGHTNESS: f64 = 250.0;

/// Content spanning at least this fraction of both axes is treated as a
/// full-frame photo and not used for alignment.
const FULL_FRAME_FRACTION: f64 = 0.9;

/// Uniform scale plus translation.
///
/// A canvas point `p` on the drawing maps to
/// `center + (p - center) * scale + offset`, where `center` is the
/// center of the drawing's untransformed rect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for SimilarityTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SimilarityTransform {
    /// Smallest allowed scale.
    pub const MIN_SCALE: f64 = 0.1;
    /// Largest allowed scale.
    pub const MAX_SCALE: f64 = 8.0;

    /// No scaling, no offset.
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    /// Build a transform, clamping `scale` into range.
    #[must_use]
    pub const fn new(scale: f64, offset_x: f64, offset_y: f64) -> Self {
        Self {
            scale: Self::clamp_scale(scale),
            offset_x,
            offset_y,
        }
    }

    /// Clamp into `[MIN_SCALE, MAX_SCALE]`. Non-finite input becomes 1.
    #[must_use]
    pub const fn clamp_scale(scale: f64) -> f64 {
        if scale.is_finite() {
            scale.clamp(Self::MIN_SCALE, Self::MAX_SCALE)
        } else {
            1.0
        }
    }

    /// The translation component.
    #[must_use]
    pub const fn offset(&self) -> Point {
        Point::new(self.offset_x, self.offset_y)
    }

    /// Map a canvas point of the untransformed drawing.
    #[must_use]
    pub fn apply(&self, p: Point, center: Point) -> Point {
        Point::new(
            (p.x - center.x).mul_add(self.scale, center.x) + self.offset_x,
            (p.y - center.y).mul_add(self.scale, center.y) + self.offset_y,
        )
    }
}

/// Which strategy produced an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignStrategy {
    /// Least-squares fit over landmark correspondences.
    LandmarkFit(LandmarkKind),
    /// Bounding boxes of all landmarks.
    LandmarkBounds(LandmarkKind),
    /// Bounding boxes of non-background content.
    ContentBounds,
    /// Fit the drawing's rect inside the reference's.
    CenterFit,
}

/// A transform and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub transform: SimilarityTransform,
    pub strategy: AlignStrategy,
}

/// Least-squares similarity fit mapping `drawing` points onto
/// `reference` points.
///
/// Points pair up by index, up to the shorter list; long lists are
/// sampled with stride `ceil(n / 200)`. Coordinates are taken relative to
/// `center`, which must be the center the transform is applied about.
///
/// Returns `None` when there are no usable pairs, when the drawing
/// points have no spread, or when the scale is not finite.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fit_least_squares(
    reference: &[Point],
    drawing: &[Point],
    center: Point,
) -> Option<SimilarityTransform> {
    let n = reference.len().min(drawing.len());
    let step = n.div_ceil(MAX_FIT_SAMPLES).max(1);
    let pairs: Vec<(Point, Point)> = reference
        .iter()
        .zip(drawing)
        .take(n)
        .step_by(step)
        .filter(|(p, q)| p.is_finite() && q.is_finite())
        .map(|(p, q)| {
            (
                Point::new(p.x - center.x, p.y - center.y),
                Point::new(q.x - center.x, q.y - center.y),
            )
        })
        .collect();
    if pairs.is_empty() {
        return None;
    }

    let count = pairs.len() as f64;
    let (sum_p, sum_q) = pairs.iter().fold(
        (Point::default(), Point::default()),
        |(sp, sq), (p, q)| (Point::new(sp.x + p.x, sp.y + p.y), Point::new(sq.x + q.x, sq.y + q.y)),
    );
    let mean_p = Point::new(sum_p.x / count, sum_p.y / count);
    let mean_q = Point::new(sum_q.x / count, sum_q.y / count);

    let mut sum_cross = 0.0;
    let mut sum_qq = 0.0;
    for (p, q) in &pairs {
        let (px, py) = (p.x - mean_p.x, p.y - mean_p.y);
        let (qx, qy) = (q.x - mean_q.x, q.y - mean_q.y);
        sum_cross += qx.mul_add(px, qy * py);
        sum_qq += qx.mul_add(qx, qy * qy);
    }
    if sum_qq == 0.0 {
        return None;
    }
    let raw = sum_cross / sum_qq;
    if !raw.is_finite() {
        return None;
    }
    let scale = SimilarityTransform::clamp_scale(raw);
    Some(SimilarityTransform {
        scale,
        offset_x: scale.mul_add(-mean_q.x, mean_p.x),
        offset_y: scale.mul_add(-mean_q.y, mean_p.y),
    })
}

/// Scale and shift so the `drawing` box lands on the `reference` box.
///
/// Scale is the mean of the width and height ratios (a zero drawing
/// extent contributes `1`); the offset puts the scaled drawing box's
/// center on the reference box's center. Both boxes are in canvas space,
/// `center` is the drawing transform's center.
#[must_use]
pub fn match_bounds(reference: Rect, drawing: Rect, center: Point) -> SimilarityTransform {
    let ratio = |r: f64, d: f64| if d == 0.0 { 1.0 } else { r / d };
    let mean = f64::midpoint(
        ratio(reference.width, drawing.width),
        ratio(reference.height, drawing.height),
    );
    let scale = SimilarityTransform::clamp_scale(if mean == 0.0 { 1.0 } else { mean });
    let target = reference.center();
    let moved = SimilarityTransform::new(scale, 0.0, 0.0).apply(drawing.center(), center);
    SimilarityTransform {
        scale,
        offset_x: target.x - moved.x,
        offset_y: target.y - moved.y,
    }
}

/// Fit the drawing's rect inside the reference's rect, centered.
#[must_use]
pub fn center_fit(reference: Rect, drawing: Rect) -> SimilarityTransform {
    let scale = if drawing.is_empty() {
        1.0
    } else {
        (reference.width / drawing.width).min(reference.height / drawing.height)
    };
    let scale = SimilarityTransform::clamp_scale(scale);
    let target = reference.center();
    let from = drawing.center();
    SimilarityTransform {
        scale,
        offset_x: target.x - from.x,
        offset_y: target.y - from.y,
    }
}

/// Bounding box, in image pixels, of pixels that look like content:
/// visible (`alpha > 20`) and darker than paper (mean of RGB `< 250`).
///
/// The scan runs on a copy at most 320 px on its long side; the box is
/// scaled back to full resolution. `None` if nothing qualifies.
#[must_use]
pub fn content_bounds(image: &RgbaImage) -> Option<Rect> {
    let dims = Dimensions::of(image);
    if dims.is_empty() {
        return None;
    }
    let scale = crate::downsample::working_scale(dims, CONTENT_SCAN_SIDE);
    let scan_dims = crate::downsample::scaled_dimensions(dims, scale);
    let scan = crate::downsample::resize_to(image, scan_dims.width, scan_dims.height);

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, px) in scan.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let brightness = f64::from(u16::from(r) + u16::from(g) + u16::from(b)) / 3.0;
        if a > CONTENT_MIN_ALPHA && brightness < CONTENT_MAX_BRIGHTNESS {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    let (x0, y0, x1, y1) = bounds?;
    let back = 1.0 / scale;
    Some(Rect::new(
        f64::from(x0) * back,
        f64::from(y0) * back,
        f64::from(x1 - x0 + 1) * back,
        f64::from(y1 - y0 + 1) * back,
    ))
}

/// Whether content covers at least 90 % of both axes of `dims`.
#[must_use]
pub fn is_full_frame(content: Rect, dims: Dimensions) -> bool {
    if dims.is_empty() {
        return true;
    }
    content.width / f64::from(dims.width) >= FULL_FRAME_FRACTION
        && content.height / f64::from(dims.height) >= FULL_FRAME_FRACTION
}

/// Everything [`auto_align`] looks at.
#[derive(Debug, Clone, Copy)]
pub struct AlignInputs<'a> {
    /// Canvas both images are fit into.
    pub canvas: Dimensions,
    pub reference: &'a RgbaImage,
    pub drawing: &'a RgbaImage,
    pub face: Option<&'a LandmarkPair>,
    pub pose: Option<&'a LandmarkPair>,
    /// Try landmark strategies before content bounds.
    pub prefer_landmarks: bool,
}

impl AlignInputs<'_> {
    fn pair(&self, kind: LandmarkKind) -> Option<&LandmarkPair> {
        match kind {
            LandmarkKind::Face => self.face,
            LandmarkKind::Pose => self.pose,
        }
        .filter(|p| p.is_usable())
    }
}

/// Canvas rects of both images with the drawing untransformed.
struct Frames {
    reference: Rect,
    drawing: Rect,
    center: Point,
}

/// Compute the best available alignment.
#[must_use]
pub fn auto_align(inputs: &AlignInputs<'_>) -> Alignment {
    let reference = layout::fit_rect(inputs.canvas, Dimensions::of(inputs.reference));
    let drawing = layout::fit_rect(inputs.canvas, Dimensions::of(inputs.drawing));
    let frames = Frames {
        reference,
        drawing,
        center: drawing.center(),
    };

    let alignment = (inputs.prefer_landmarks && !frames.reference.is_empty() && !frames.drawing.is_empty())
        .then(|| landmark_fit(inputs, &frames).or_else(|| landmark_bounds(inputs, &frames)))
        .flatten()
        .or_else(|| content_fit(inputs, &frames))
        .or_else(|| landmark_bounds(inputs, &frames))
        .unwrap_or_else(|| Alignment {
            transform: center_fit(frames.reference, frames.drawing),
            strategy: AlignStrategy::CenterFit,
        });
    log::debug!(
        "auto-align via {:?}: scale {:.3}, offset ({:.1}, {:.1})",
        alignment.strategy,
        alignment.transform.scale,
        alignment.transform.offset_x,
        alignment.transform.offset_y,
    );
    alignment
}

fn landmark_fit(inputs: &AlignInputs<'_>, frames: &Frames) -> Option<Alignment> {
    LandmarkKind::ALL.into_iter().find_map(|kind| {
        let pair = inputs.pair(kind)?;
        let transform = fit_least_squares(
            &pair.reference.project(frames.reference),
            &pair.drawing.project(frames.drawing),
            frames.center,
        )?;
        Some(Alignment {
            transform,
            strategy: AlignStrategy::LandmarkFit(kind),
        })
    })
}

fn landmark_bounds(inputs: &AlignInputs<'_>, frames: &Frames) -> Option<Alignment> {
    LandmarkKind::ALL.into_iter().find_map(|kind| {
        let pair = inputs.pair(kind)?;
        let reference = Rect::bounding(&pair.reference.project(frames.reference))?;
        let drawing = Rect::bounding(&pair.drawing.project(frames.drawing))?;
        Some(Alignment {
            transform: match_bounds(reference, drawing, frames.center),
            strategy: AlignStrategy::LandmarkBounds(kind),
        })
    })
}

fn content_fit(inputs: &AlignInputs<'_>, frames: &Frames) -> Option<Alignment> {
    let ref_dims = Dimensions::of(inputs.reference);
    let draw_dims = Dimensions::of(inputs.drawing);
    let reference = content_bounds(inputs.reference).filter(|b| !is_full_frame(*b, ref_dims))?;
    let drawing = content_bounds(inputs.drawing).filter(|b| !is_full_frame(*b, draw_dims))?;
    let to_canvas = |b: Rect, rect: Rect, dims: Dimensions| {
        let origin = layout::project(Point::new(b.x, b.y), rect, dims);
        let corner = layout::project(Point::new(b.x + b.width, b.y + b.height), rect, dims);
        Rect::new(origin.x, origin.y, corner.x - origin.x, corner.y - origin.y)
    };
    Some(Alignment {
        transform: match_bounds(
            to_canvas(reference, frames.reference, ref_dims),
            to_canvas(drawing, frames.drawing, draw_dims),
            frames.center,
        ),
        strategy: AlignStrategy::ContentBounds,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkSet;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn pts(list: &[(f64, f64)]) -> Vec<Point> {
        list.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    fn white_with_square(size: u32, lo: u32, hi: u32) -> RgbaImage {
        RgbaImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn least_squares_recovers_scale_and_offset() {
        let reference = pts(&[(10.0, 10.0), (90.0, 10.0)]);
        let drawing = pts(&[(20.0, 20.0), (60.0, 20.0)]);
        let center = Point::new(50.0, 50.0);
        let t = fit_least_squares(&reference, &drawing, center).unwrap();
        assert!(close(t.scale, 2.0));
        assert!(close(t.offset_x, 20.0) && close(t.offset_y, 20.0));
        for (r, d) in reference.iter().zip(&drawing) {
            let mapped = t.apply(*d, center);
            assert!(close(mapped.x, r.x) && close(mapped.y, r.y));
        }
    }

    #[test]
    fn least_squares_rejects_degenerate_input() {
        let center = Point::new(0.0, 0.0);
        assert!(fit_least_squares(&[], &[], center).is_none());
        // All drawing points coincide: no spread.
        let reference = pts(&[(0.0, 0.0), (10.0, 0.0)]);
        let drawing = pts(&[(5.0, 5.0), (5.0, 5.0)]);
        assert!(fit_least_squares(&reference, &drawing, center).is_none());
        // Non-finite points are skipped, leaving nothing.
        let nan = pts(&[(f64::NAN, 0.0)]);
        assert!(fit_least_squares(&nan, &pts(&[(1.0, 1.0)]), center).is_none());
    }

    #[test]
    fn least_squares_scale_is_clamped() {
        let center = Point::new(0.0, 0.0);
        let reference = pts(&[(0.0, 0.0), (1000.0, 0.0)]);
        let drawing = pts(&[(0.0, 0.0), (1.0, 0.0)]);
        let t = fit_least_squares(&reference, &drawing, center).unwrap();
        assert!(close(t.scale, SimilarityTransform::MAX_SCALE));
        // Reflected correspondences give a negative raw scale.
        let flipped = pts(&[(1.0, 0.0), (0.0, 0.0)]);
        let t = fit_least_squares(&drawing, &flipped, center).unwrap();
        assert!(close(t.scale, SimilarityTransform::MIN_SCALE));
    }

    #[test]
    fn least_squares_pairs_up_to_shorter_list() {
        let center = Point::new(0.0, 0.0);
        let reference = pts(&[(0.0, 0.0), (4.0, 0.0), (100.0, 100.0)]);
        let drawing = pts(&[(0.0, 0.0), (2.0, 0.0)]);
        let t = fit_least_squares(&reference, &drawing, center).unwrap();
        assert!(close(t.scale, 2.0));
    }

    #[test]
    fn least_squares_samples_long_lists() {
        let center = Point::new(0.0, 0.0);
        let drawing: Vec<Point> = (0..1000).map(|i| Point::new(f64::from(i), 0.0)).collect();
        let reference: Vec<Point> = drawing.iter().map(|p| Point::new(p.x * 3.0 + 7.0, 1.0)).collect();
        let t = fit_least_squares(&reference, &drawing, center).unwrap();
        assert!(close(t.scale, 3.0));
        assert!(close(t.offset_x, 7.0) && close(t.offset_y, 1.0));
    }

    #[test]
    fn match_bounds_centers_scaled_box() {
        let reference = Rect::new(0.0, 0.0, 40.0, 40.0);
        let drawing = Rect::new(60.0, 60.0, 20.0, 20.0);
        let center = Point::new(50.0, 50.0);
        let t = match_bounds(reference, drawing, center);
        assert!(close(t.scale, 2.0));
        let mapped = t.apply(drawing.center(), center);
        assert!(close(mapped.x, 20.0) && close(mapped.y, 20.0));
    }

    #[test]
    fn match_bounds_zero_extent_counts_as_one() {
        let reference = Rect::new(0.0, 0.0, 30.0, 50.0);
        let drawing = Rect::new(0.0, 0.0, 10.0, 0.0);
        let t = match_bounds(reference, drawing, Point::default());
        assert!(close(t.scale, 2.0));
    }

    #[test]
    fn center_fit_uses_smaller_ratio() {
        let reference = Rect::new(0.0, 0.0, 200.0, 100.0);
        let drawing = Rect::new(50.0, 25.0, 100.0, 100.0);
        let t = center_fit(reference, drawing);
        assert!(close(t.scale, 1.0));
        assert!(close(t.offset_x, 0.0) && close(t.offset_y, -25.0));
    }

    #[test]
    fn content_bounds_finds_dark_square() {
        let b = content_bounds(&white_with_square(100, 30, 70)).unwrap();
        assert_eq!(b, Rect::new(30.0, 30.0, 40.0, 40.0));
        assert!(!is_full_frame(b, Dimensions::new(100, 100)));
    }

    #[test]
    fn content_bounds_ignores_paper_and_transparency() {
        let paper = RgbaImage::from_pixel(50, 50, image::Rgba([252, 252, 252, 255]));
        assert!(content_bounds(&paper).is_none());
        let clear = RgbaImage::from_pixel(50, 50, image::Rgba([0, 0, 0, 10]));
        assert!(content_bounds(&clear).is_none());
        assert!(content_bounds(&RgbaImage::new(0, 0)).is_none());
    }

    #[test]
    fn content_bounds_of_large_image_maps_back() {
        let b = content_bounds(&white_with_square(640, 160, 480)).unwrap();
        // Scanned at half resolution; edges may blur by one scan pixel.
        assert!((b.x - 160.0).abs() <= 2.0 && (b.y - 160.0).abs() <= 2.0);
        assert!((b.width - 320.0).abs() <= 6.0);
    }

    #[test]
    fn photo_content_is_full_frame() {
        let photo = RgbaImage::from_pixel(80, 60, image::Rgba([90, 120, 30, 255]));
        let b = content_bounds(&photo).unwrap();
        assert!(is_full_frame(b, Dimensions::new(80, 60)));
    }

    fn face_pair(reference: &[(f64, f64)], drawing: &[(f64, f64)]) -> LandmarkPair {
        LandmarkPair {
            reference: LandmarkSet::new(pts(reference), Dimensions::new(100, 100)),
            drawing: LandmarkSet::new(pts(drawing), Dimensions::new(100, 100)),
        }
    }

    #[test]
    fn auto_align_prefers_landmark_fit() {
        let reference = white_with_square(100, 20, 80);
        let drawing = white_with_square(100, 35, 65);
        let face = face_pair(&[(10.0, 10.0), (90.0, 10.0)], &[(20.0, 20.0), (60.0, 20.0)]);
        let alignment = auto_align(&AlignInputs {
            canvas: Dimensions::new(100, 100),
            reference: &reference,
            drawing: &drawing,
            face: Some(&face),
            pose: None,
            prefer_landmarks: true,
        });
        assert_eq!(alignment.strategy, AlignStrategy::LandmarkFit(LandmarkKind::Face));
        assert!(close(alignment.transform.scale, 2.0));
    }

    #[test]
    fn auto_align_uses_content_when_landmarks_not_preferred() {
        let reference = white_with_square(100, 20, 80);
        let drawing = white_with_square(100, 10, 40);
        let face = face_pair(&[(10.0, 10.0), (90.0, 10.0)], &[(20.0, 20.0), (60.0, 20.0)]);
        let alignment = auto_align(&AlignInputs {
            canvas: Dimensions::new(100, 100),
            reference: &reference,
            drawing: &drawing,
            face: Some(&face),
            pose: None,
            prefer_landmarks: false,
        });
        assert_eq!(alignment.strategy, AlignStrategy::ContentBounds);
        let t = alignment.transform;
        assert!(close(t.scale, 2.0));
        let mapped = t.apply(Point::new(25.0, 25.0), Point::new(50.0, 50.0));
        assert!(close(mapped.x, 50.0) && close(mapped.y, 50.0));
    }

    #[test]
    fn auto_align_falls_back_to_landmark_bounds_for_photos() {
        let photo = RgbaImage::from_pixel(100, 100, image::Rgba([90, 120, 30, 255]));
        let pose = face_pair(&[(0.0, 0.0), (40.0, 40.0)], &[(0.0, 0.0), (20.0, 20.0)]);
        let alignment = auto_align(&AlignInputs {
            canvas: Dimensions::new(100, 100),
            reference: &photo,
            drawing: &photo,
            face: None,
            pose: Some(&pose),
            prefer_landmarks: false,
        });
        assert_eq!(alignment.strategy, AlignStrategy::LandmarkBounds(LandmarkKind::Pose));
        assert!(close(alignment.transform.scale, 2.0));
    }

    #[test]
    fn auto_align_center_fits_when_nothing_else_works() {
        let reference = RgbaImage::from_pixel(200, 100, image::Rgba([255, 255, 255, 255]));
        let drawing = RgbaImage::from_pixel(100, 100, image::Rgba([255, 255, 255, 255]));
        let empty = LandmarkPair::default();
        let alignment = auto_align(&AlignInputs {
            canvas: Dimensions::new(200, 200),
            reference: &reference,
            drawing: &drawing,
            face: Some(&empty),
            pose: None,
            prefer_landmarks: true,
        });
        assert_eq!(alignment.strategy, AlignStrategy::CenterFit);
        // Reference fills 200x100, drawing 200x200: shrink to half.
        assert!(close(alignment.transform.scale, 0.5));
        assert!(close(alignment.transform.offset_x, 0.0));
        assert!(close(alignment.transform.offset_y, 0.0));
    }
}
