//! Proportion checks between matching segments of the reference and the
//! drawing, e.g. "eye to eye" against "eye to chin".

use serde::{Deserialize, Serialize};

use crate::types::Point;

/// A segment between two landmark indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentPair {
    pub a: usize,
    pub b: usize,
}

/// One segment measured on both images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentComparison {
    pub a: usize,
    pub b: usize,
    /// Reference length, `0` if an endpoint is missing.
    pub reference_length: f64,
    /// Drawing length, `0` if an endpoint is missing.
    pub drawing_length: f64,
    /// `drawing / reference`; `None` when the reference length is zero.
    pub ratio: Option<f64>,
    /// `(ratio - 1) * 100`: positive when the drawing runs long.
    pub error_percent: Option<f64>,
}

impl SegmentComparison {
    /// How far off this segment is. A segment with no error counts as
    /// close.
    #[must_use]
    pub fn severity(&self) -> Severity {
        Severity::from_error_percent(self.error_percent.unwrap_or(0.0))
    }
}

/// Absolute percent error below which a segment is close.
pub const CLOSE_BELOW_PERCENT: f64 = 8.0;
/// Absolute percent error below which a segment is off rather than wrong.
pub const OFF_BELOW_PERCENT: f64 = 20.0;

/// Error band of a segment, for colour-coding critiques.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Under 8% either way.
    Close,
    /// Under 20% either way.
    Off,
    Wrong,
}

impl Severity {
    /// Band a signed percent error by its magnitude.
    #[must_use]
    pub fn from_error_percent(error_percent: f64) -> Self {
        let magnitude = error_percent.abs();
        if magnitude < CLOSE_BELOW_PERCENT {
            Self::Close
        } else if magnitude < OFF_BELOW_PERCENT {
            Self::Off
        } else {
            Self::Wrong
        }
    }

    /// Straight RGBA colour for drawing the segment: green, amber or red.
    #[must_use]
    pub const fn colour(self) -> [u8; 4] {
        match self {
            Self::Close => [46, 204, 113, 217],
            Self::Off => [255, 193, 7, 230],
            Self::Wrong => [244, 67, 54, 230],
        }
    }
}

/// Every segment plus summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentReport {
    pub segments: Vec<SegmentComparison>,
    /// Mean absolute error over segments that have one.
    pub average_error_percent: Option<f64>,
    /// Segment with the largest absolute error (first wins ties).
    pub worst: Option<SegmentComparison>,
}

fn length(points: &[Point], pair: SegmentPair) -> f64 {
    match (points.get(pair.a), points.get(pair.b)) {
        (Some(&p), Some(&q)) => p.distance(q),
        _ => 0.0,
    }
}

/// Compare the lengths of `pairs` between the two point lists, which are
/// indexed alike.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compare_segments(reference: &[Point], drawing: &[Point], pairs: &[SegmentPair]) -> SegmentReport {
    let segments: Vec<SegmentComparison> = pairs
        .iter()
        .map(|&pair| {
            let reference_length = length(reference, pair);
            let drawing_length = length(drawing, pair);
            let ratio = (reference_length > 0.0).then(|| drawing_length / reference_length);
            SegmentComparison {
                a: pair.a,
                b: pair.b,
                reference_length,
                drawing_length,
                ratio,
                error_percent: ratio.map(|r| (r - 1.0) * 100.0),
            }
        })
        .collect();

    let errors: Vec<(SegmentComparison, f64)> = segments
        .iter()
        .filter_map(|s| s.error_percent.map(|e| (*s, e.abs())))
        .collect();
    let average_error_percent = (!errors.is_empty())
        .then(|| errors.iter().map(|(_, e)| e).sum::<f64>() / errors.len() as f64);
    let worst = errors
        .iter()
        .fold(None::<(SegmentComparison, f64)>, |best, &(s, e)| match best {
            Some((_, be)) if be >= e => best,
            _ => Some((s, e)),
        })
        .map(|(s, _)| s);

    SegmentReport {
        segments,
        average_error_percent,
        worst,
    }
}

/// Signed angle in degrees at `vertex` from `from` to `to`.
#[must_use]
pub fn angle_degrees(from: Point, vertex: Point, to: Point) -> f64 {
    let a = (from.y - vertex.y).atan2(from.x - vertex.x);
    let b = (to.y - vertex.y).atan2(to.x - vertex.x);
    (b - a).to_degrees()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pts(list: &[(f64, f64)]) -> Vec<Point> {
        list.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn reports_ratio_and_signed_error() {
        let reference = pts(&[(0.0, 0.0), (10.0, 0.0), (0.0, 20.0)]);
        let drawing = pts(&[(0.0, 0.0), (12.0, 0.0), (0.0, 15.0)]);
        let report = compare_segments(
            &reference,
            &drawing,
            &[SegmentPair { a: 0, b: 1 }, SegmentPair { a: 0, b: 2 }],
        );
        let first = report.segments[0];
        assert!((first.ratio.unwrap() - 1.2).abs() < 1e-12);
        assert!((first.error_percent.unwrap() - 20.0).abs() < 1e-9);
        let second = report.segments[1];
        assert!((second.error_percent.unwrap() + 25.0).abs() < 1e-9);
        assert!((report.average_error_percent.unwrap() - 22.5).abs() < 1e-9);
        assert_eq!(report.worst.unwrap().b, 2);
    }

    #[test]
    fn missing_or_zero_reference_segments_have_no_error() {
        let reference = pts(&[(1.0, 1.0), (1.0, 1.0)]);
        let drawing = pts(&[(0.0, 0.0), (3.0, 4.0)]);
        let report = compare_segments(
            &reference,
            &drawing,
            &[SegmentPair { a: 0, b: 1 }, SegmentPair { a: 0, b: 9 }],
        );
        assert_eq!(report.segments[0].ratio, None);
        assert!((report.segments[0].drawing_length - 5.0).abs() < 1e-12);
        assert!(report.segments[1].reference_length == 0.0);
        assert_eq!(report.average_error_percent, None);
        assert_eq!(report.worst, None);
    }

    #[test]
    fn severity_bands_on_magnitude() {
        let cases = [
            (0.0, Severity::Close),
            (7.9, Severity::Close),
            (-7.9, Severity::Close),
            (8.0, Severity::Off),
            (-8.0, Severity::Off),
            (19.9, Severity::Off),
            (20.0, Severity::Wrong),
            (-45.0, Severity::Wrong),
        ];
        for (error, expected) in cases {
            assert_eq!(Severity::from_error_percent(error), expected, "{error}%");
        }
        assert!(Severity::Close < Severity::Off && Severity::Off < Severity::Wrong);
        assert_eq!(Severity::Off.colour(), [255, 193, 7, 230]);
    }

    #[test]
    fn segment_severity_follows_its_error() {
        let reference = pts(&[(0.0, 0.0), (10.0, 0.0), (0.0, 20.0), (5.0, 5.0)]);
        let drawing = pts(&[(0.0, 0.0), (10.5, 0.0), (0.0, 15.0), (5.0, 5.0)]);
        let report = compare_segments(
            &reference,
            &drawing,
            &[
                SegmentPair { a: 0, b: 1 },
                SegmentPair { a: 0, b: 2 },
                SegmentPair { a: 3, b: 3 },
            ],
        );
        let severities: Vec<Severity> = report.segments.iter().map(SegmentComparison::severity).collect();
        // +5%, -25%, and a zero-length reference with no error.
        assert_eq!(severities, vec![Severity::Close, Severity::Wrong, Severity::Close]);
    }

    #[test]
    fn right_angle() {
        let deg = angle_degrees(Point::new(1.0, 0.0), Point::new(0.0, 0.0), Point::new(0.0, 1.0));
        assert!((deg - 90.0).abs() < 1e-9);
    }
}
