//! Outline similarity: how well the drawing's outline overlaps the
//! reference's at their current positions on the canvas.
//!
//! Both masks are resampled (nearest) into a shared raster no larger
//! than 512 px on its long side, each into the canvas rect its image is
//! displayed in, and compared by intersection over union.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::Clock;
use crate::mask::BinaryMask;
use crate::types::{Dimensions, PipelineConfig, Point, Rect, RgbaImage};

/// Longest side of the shared scoring raster.
pub const SCORE_MAX_SIDE: u32 = 512;

/// Minimum time between two assist recomputations.
pub const ASSIST_DEBOUNCE: Duration = Duration::from_millis(100);

/// Result of one outline comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignmentScore {
    /// Intersection over union, `0..=1`.
    pub score: f64,
    /// `score >= threshold`.
    pub aligned: bool,
}

impl AlignmentScore {
    #[must_use]
    pub fn new(score: f64, threshold: f64) -> Self {
        Self {
            score,
            aligned: score >= threshold,
        }
    }

    /// Score as a whole percentage.
    #[must_use]
    pub fn percent(&self) -> f64 {
        (self.score * 100.0).round()
    }
}

/// An outline mask placed on the canvas.
#[derive(Debug, Clone, Copy)]
pub struct PlacedMask<'a> {
    pub mask: &'a BinaryMask,
    pub rect: Rect,
}

/// Shared raster size for a canvas, and raster pixels per canvas pixel.
fn shared_raster(canvas: Dimensions) -> (Dimensions, f64) {
    let scale = crate::downsample::working_scale(canvas, SCORE_MAX_SIDE);
    (crate::downsample::scaled_dimensions(canvas, scale), scale)
}

/// Nearest-sample `placed` into a raster of `size` covering the canvas
/// at `scale` raster pixels per canvas pixel.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn rasterize(placed: PlacedMask<'_>, size: Dimensions, scale: f64) -> BinaryMask {
    let PlacedMask { mask, rect } = placed;
    if rect.is_empty() || mask.dimensions().is_empty() {
        return BinaryMask::new(size.width, size.height);
    }
    let (mw, mh) = (f64::from(mask.width()), f64::from(mask.height()));
    BinaryMask::from_fn(size.width, size.height, |x, y| {
        let cx = (f64::from(x) + 0.5) / scale;
        let cy = (f64::from(y) + 0.5) / scale;
        if !rect.contains(Point::new(cx, cy)) {
            return false;
        }
        let mx = ((cx - rect.x) / rect.width * mw).floor().clamp(0.0, mw - 1.0) as u32;
        let my = ((cy - rect.y) / rect.height * mh).floor().clamp(0.0, mh - 1.0) as u32;
        mask.get(mx, my)
    })
}

/// Intersection over union of two same-sized masks; `0` when both are
/// empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn iou(a: &BinaryMask, b: &BinaryMask) -> f64 {
    let (intersection, union) = a
        .bits()
        .iter()
        .zip(b.bits())
        .fold((0_usize, 0_usize), |(i, u), (&x, &y)| {
            (i + usize::from(x && y), u + usize::from(x || y))
        });
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Score two placed outlines on a canvas of size `canvas`.
///
/// Symmetric in its two mask arguments.
#[must_use]
pub fn score_outlines(
    reference: PlacedMask<'_>,
    drawing: PlacedMask<'_>,
    canvas: Dimensions,
    threshold: f64,
) -> AlignmentScore {
    if canvas.is_empty() {
        return AlignmentScore::new(0.0, threshold);
    }
    let (size, scale) = shared_raster(canvas);
    let a = rasterize(reference, size, scale);
    let b = rasterize(drawing, size, scale);
    AlignmentScore::new(iou(&a, &b), threshold)
}

/// A reading from [`OutlineAssist`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssistReading {
    pub score: AlignmentScore,
    /// Whether this reading was recomputed rather than served from the
    /// debounce window.
    pub fresh: bool,
}

/// Debounced outline scoring for interactive use.
///
/// Recomputes at most once per [`ASSIST_DEBOUNCE`]; within the window the
/// previous score is returned.
pub struct OutlineAssist<C: Clock> {
    clock: C,
    threshold: f64,
    last_computed: Option<C::Instant>,
    last: AlignmentScore,
}

impl<C: Clock> OutlineAssist<C> {
    /// An assist with no score yet. A NaN `threshold` falls back to
    /// [`PipelineConfig::DEFAULT_ALIGNMENT_THRESHOLD`].
    #[must_use]
    pub fn new(clock: C, threshold: f64) -> Self {
        let mut assist = Self {
            clock,
            threshold: PipelineConfig::DEFAULT_ALIGNMENT_THRESHOLD,
            last_computed: None,
            last: AlignmentScore::default(),
        };
        assist.set_threshold(threshold);
        assist
    }

    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Set the alignment threshold, clamped into `0..=1`. NaN is ignored.
    pub fn set_threshold(&mut self, threshold: f64) {
        if !threshold.is_nan() {
            self.threshold = threshold.clamp(0.0, 1.0);
        }
    }

    /// The most recent score.
    #[must_use]
    pub const fn last(&self) -> AlignmentScore {
        self.last
    }

    /// Forget the previous score and timing.
    pub fn reset(&mut self) {
        self.last_computed = None;
        self.last = AlignmentScore::default();
    }

    /// Score the outlines unless the last score is younger than the
    /// debounce window. A missing outline scores `0`.
    pub fn update(
        &mut self,
        reference: Option<PlacedMask<'_>>,
        drawing: Option<PlacedMask<'_>>,
        canvas: Dimensions,
    ) -> AssistReading {
        if let Some(at) = &self.last_computed
            && self.clock.elapsed(at) < ASSIST_DEBOUNCE
        {
            return AssistReading {
                score: self.last,
                fresh: false,
            };
        }
        let score = match (reference, drawing) {
            (Some(r), Some(d)) => score_outlines(r, d, canvas, self.threshold),
            _ => AlignmentScore::default(),
        };
        self.last_computed = Some(self.clock.now());
        self.last = score;
        AssistReading { score, fresh: true }
    }
}

/// An RGB colour.
pub type Rgb = [u8; 3];

/// Reference outline colour in the ordinary outline views.
pub const REFERENCE_OUTLINE: Rgb = [0, 160, 255];
/// Drawing outline colour in the ordinary outline views.
pub const DRAWING_OUTLINE: Rgb = [255, 80, 80];
/// Both outlines when the assist reports alignment.
pub const ALIGNED_OUTLINE: Rgb = [34, 197, 94];
/// Reference outline when the assist reports misalignment.
pub const MISALIGNED_REFERENCE: Rgb = [239, 68, 68];
/// Drawing outline when the assist reports misalignment.
pub const MISALIGNED_DRAWING: Rgb = [59, 130, 246];
/// Reference outline in the base-unit view.
pub const BASE_UNIT_REFERENCE: Rgb = [0, 200, 255];
/// Drawing outline in the base-unit view.
pub const BASE_UNIT_DRAWING: Rgb = [255, 160, 120];

/// Colours for the reference and drawing outlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutlinePalette {
    pub reference: Rgb,
    pub drawing: Rgb,
}

impl OutlinePalette {
    /// Ordinary outline views.
    pub const PLAIN: Self = Self {
        reference: REFERENCE_OUTLINE,
        drawing: DRAWING_OUTLINE,
    };

    /// Base-unit view.
    pub const BASE_UNIT: Self = Self {
        reference: BASE_UNIT_REFERENCE,
        drawing: BASE_UNIT_DRAWING,
    };

    /// Colours while the assist is active.
    #[must_use]
    pub const fn assist(aligned: bool) -> Self {
        if aligned {
            Self {
                reference: ALIGNED_OUTLINE,
                drawing: ALIGNED_OUTLINE,
            }
        } else {
            Self {
                reference: MISALIGNED_REFERENCE,
                drawing: MISALIGNED_DRAWING,
            }
        }
    }
}

/// Render a mask as an RGBA layer: `colour` where on, transparent
/// elsewhere.
#[must_use]
pub fn tint(mask: &BinaryMask, colour: Rgb) -> RgbaImage {
    let [r, g, b] = colour;
    RgbaImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get(x, y) {
            image::Rgba([r, g, b, 255])
        } else {
            image::Rgba([0, 0, 0, 0])
        }
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Clock whose time is set by the test, in milliseconds.
    struct ManualClock<'a> {
        now: &'a Cell<u64>,
    }

    impl Clock for ManualClock<'_> {
        type Instant = u64;

        fn now(&self) -> u64 {
            self.now.get()
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now.get() - since)
        }
    }

    fn frame(size: u32, inset: u32) -> BinaryMask {
        BinaryMask::from_fn(size, size, |x, y| {
            let lo = inset;
            let hi = size - 1 - inset;
            (x == lo || x == hi || y == lo || y == hi)
                && (lo..=hi).contains(&x)
                && (lo..=hi).contains(&y)
        })
    }

    fn placed(mask: &BinaryMask, rect: Rect) -> PlacedMask<'_> {
        PlacedMask { mask, rect }
    }

    #[test]
    fn identical_placement_scores_one() {
        let mask = frame(100, 20);
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        let s = score_outlines(placed(&mask, rect), placed(&mask, rect), Dimensions::new(100, 100), 0.78);
        assert!((s.score - 1.0).abs() < 1e-12);
        assert!(s.aligned);
    }

    #[test]
    fn score_is_symmetric() {
        let a = frame(100, 20);
        let b = frame(100, 10);
        let ra = Rect::new(0.0, 0.0, 100.0, 100.0);
        let rb = Rect::new(7.0, 3.0, 90.0, 90.0);
        let canvas = Dimensions::new(120, 110);
        let ab = score_outlines(placed(&a, ra), placed(&b, rb), canvas, 0.78);
        let ba = score_outlines(placed(&b, rb), placed(&a, ra), canvas, 0.78);
        assert!((ab.score - ba.score).abs() < f64::EPSILON);
    }

    #[test]
    fn disjoint_and_empty_masks_score_zero() {
        let rect = Rect::new(0.0, 0.0, 50.0, 50.0);
        let blank = BinaryMask::new(50, 50);
        let s = score_outlines(placed(&blank, rect), placed(&blank, rect), Dimensions::new(50, 50), 0.5);
        assert!(s.score == 0.0 && !s.aligned);

        let a = BinaryMask::from_fn(50, 50, |x, _| x < 10);
        let b = BinaryMask::from_fn(50, 50, |x, _| x >= 40);
        let s = score_outlines(placed(&a, rect), placed(&b, rect), Dimensions::new(50, 50), 0.5);
        assert!(s.score == 0.0);
    }

    #[test]
    fn masks_follow_their_rects() {
        // The same solid mask drawn at two sizes overlaps only where the
        // smaller copy sits.
        let mask = BinaryMask::from_fn(10, 10, |_, _| true);
        let big = Rect::new(0.0, 0.0, 100.0, 100.0);
        let small = Rect::new(0.0, 0.0, 50.0, 50.0);
        let s = score_outlines(placed(&mask, big), placed(&mask, small), Dimensions::new(100, 100), 0.78);
        assert!((s.score - 0.25).abs() < 1e-12);
    }

    #[test]
    fn large_canvas_is_capped() {
        let (size, scale) = shared_raster(Dimensions::new(2048, 1024));
        assert_eq!(size, Dimensions::new(512, 256));
        assert!((scale - 0.25).abs() < 1e-12);
    }

    #[test]
    fn assist_debounces_recomputation() {
        let now = Cell::new(1_000);
        let mut assist = OutlineAssist::new(ManualClock { now: &now }, 0.78);
        let mask = frame(40, 5);
        let rect = Rect::new(0.0, 0.0, 40.0, 40.0);
        let canvas = Dimensions::new(40, 40);

        let first = assist.update(Some(placed(&mask, rect)), Some(placed(&mask, rect)), canvas);
        assert!(first.fresh && first.score.aligned);

        now.set(1_050);
        let cached = assist.update(None, None, canvas);
        assert!(!cached.fresh);
        assert_eq!(cached.score, first.score);

        now.set(1_100);
        let missing = assist.update(None, Some(placed(&mask, rect)), canvas);
        assert!(missing.fresh);
        assert!(missing.score.score == 0.0 && !missing.score.aligned);
    }

    #[test]
    fn assist_threshold_is_clamped() {
        let now = Cell::new(0);
        let mut assist = OutlineAssist::new(ManualClock { now: &now }, 2.0);
        assert!((assist.threshold() - 1.0).abs() < f64::EPSILON);
        assist.set_threshold(f64::NAN);
        assert!((assist.threshold() - 1.0).abs() < f64::EPSILON);
        assist.set_threshold(-0.5);
        assert!(assist.threshold() == 0.0);
    }

    #[test]
    fn palette_follows_alignment() {
        assert_eq!(OutlinePalette::assist(true).reference, ALIGNED_OUTLINE);
        assert_eq!(OutlinePalette::assist(false).drawing, MISALIGNED_DRAWING);
        assert_eq!(OutlinePalette::PLAIN.reference, [0, 160, 255]);
    }

    #[test]
    fn tint_colours_on_pixels_only() {
        let mask = BinaryMask::from_fn(3, 1, |x, _| x == 1);
        let layer = tint(&mask, [1, 2, 3]);
        assert_eq!(layer.get_pixel(1, 0).0, [1, 2, 3, 255]);
        assert_eq!(layer.get_pixel(0, 0).0[3], 0);
    }
}
