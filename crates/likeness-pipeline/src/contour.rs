//! Contour tracing: turn the regions of a [`BinaryMask`] into polylines.
//!
//! [`ContourTracer`] is the seam for swapping algorithms;
//! [`ContourTracerKind`] selects one at runtime. Only Suzuki-Abe border
//! following (through `imageproc`) is provided today.

use serde::{Deserialize, Serialize};

use crate::mask::BinaryMask;
use crate::types::{Point, Polyline};

/// Selects which contour tracing algorithm to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContourTracerKind {
    /// Suzuki-Abe border following via `imageproc::contours::find_contours`.
    /// Both outer borders and hole borders are returned.
    #[default]
    BorderFollowing,
}

/// Strategy for extracting region borders from a mask.
pub trait ContourTracer {
    /// Trace the borders of every on region. Each polyline is implicitly
    /// closed (last point connects back to the first).
    fn trace(&self, mask: &BinaryMask) -> Vec<Polyline>;
}

impl ContourTracer for ContourTracerKind {
    fn trace(&self, mask: &BinaryMask) -> Vec<Polyline> {
        match *self {
            Self::BorderFollowing => border_following(mask),
        }
    }
}

fn border_following(mask: &BinaryMask) -> Vec<Polyline> {
    if mask.is_blank() {
        return Vec::new();
    }
    imageproc::contours::find_contours::<u32>(&mask.to_gray_image())
        .into_iter()
        .filter(|c| c.points.len() >= 2)
        .map(|c| {
            Polyline::new(
                c.points
                    .iter()
                    .map(|p| Point::new(f64::from(p.x), f64::from(p.y)))
                    .collect(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_mask_has_no_contours() {
        let mask = BinaryMask::new(12, 12);
        assert!(ContourTracerKind::default().trace(&mask).is_empty());
    }

    #[test]
    fn isolated_pixel_is_dropped() {
        let mut mask = BinaryMask::new(9, 9);
        mask.set(4, 4, true);
        for polyline in ContourTracerKind::BorderFollowing.trace(&mask) {
            assert!(polyline.len() >= 2);
        }
    }

    #[test]
    fn filled_square_border_lies_on_its_edge() {
        let mask = BinaryMask::from_fn(20, 20, |x, y| (5..15).contains(&x) && (5..15).contains(&y));
        let contours = ContourTracerKind::BorderFollowing.trace(&mask);
        assert_eq!(contours.len(), 1);
        let outer = &contours[0];
        assert!(outer.len() >= 4);
        for p in outer.points() {
            let on_edge = p.x == 5.0 || p.x == 14.0 || p.y == 5.0 || p.y == 14.0;
            assert!(on_edge, "point {p:?} not on the square's border");
        }
    }

    #[test]
    fn ring_yields_outer_and_hole_borders() {
        let mask = BinaryMask::from_fn(20, 20, |x, y| {
            let inside = |lo: u32, hi: u32| (lo..hi).contains(&x) && (lo..hi).contains(&y);
            inside(3, 17) && !inside(7, 13)
        });
        assert_eq!(ContourTracerKind::BorderFollowing.trace(&mask).len(), 2);
    }
}
