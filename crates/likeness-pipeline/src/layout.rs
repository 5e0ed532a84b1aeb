//! Where images sit on the shared canvas.
//!
//! Both images are aspect-fit and centered on the canvas ([`fit_rect`]).
//! The drawing additionally carries a [`SimilarityTransform`] that scales
//! its rect about the rect's center and then offsets it
//! ([`drawing_rect`]). Points move between image pixels and canvas
//! coordinates with [`project`] and [`unproject`].

use crate::align::SimilarityTransform;
use crate::types::{Dimensions, Point, Rect};

/// Aspect-fit `image` inside `canvas`, centered. Zero-area inputs give an
/// empty rect at the origin.
#[must_use]
pub fn fit_rect(canvas: Dimensions, image: Dimensions) -> Rect {
    if canvas.is_empty() || image.is_empty() {
        return Rect::default();
    }
    let (cw, ch) = (f64::from(canvas.width), f64::from(canvas.height));
    let (iw, ih) = (f64::from(image.width), f64::from(image.height));
    let scale = (cw / iw).min(ch / ih);
    let (width, height) = (iw * scale, ih * scale);
    Rect::new((cw - width) / 2.0, (ch - height) / 2.0, width, height)
}

/// The rect the drawing occupies once `transform` is applied to its
/// untransformed rect `base`.
#[must_use]
pub fn drawing_rect(base: Rect, transform: SimilarityTransform) -> Rect {
    let center = base.center();
    let width = base.width * transform.scale;
    let height = base.height * transform.scale;
    Rect::new(
        center.x - width / 2.0 + transform.offset_x,
        center.y - height / 2.0 + transform.offset_y,
        width,
        height,
    )
}

/// Map an image-pixel point into canvas coordinates for an image of size
/// `dims` displayed in `rect`. Degenerate rects or images map to the
/// origin.
#[must_use]
pub fn project(point: Point, rect: Rect, dims: Dimensions) -> Point {
    if rect.is_empty() || dims.is_empty() {
        return Point::default();
    }
    Point::new(
        rect.x + point.x * rect.width / f64::from(dims.width),
        rect.y + point.y * rect.height / f64::from(dims.height),
    )
}

/// Inverse of [`project`].
#[must_use]
pub fn unproject(point: Point, rect: Rect, dims: Dimensions) -> Point {
    if rect.is_empty() || dims.is_empty() {
        return Point::default();
    }
    Point::new(
        (point.x - rect.x) * f64::from(dims.width) / rect.width,
        (point.y - rect.y) * f64::from(dims.height) / rect.height,
    )
}

/// [`project`] every point.
#[must_use]
pub fn project_all(points: &[Point], rect: Rect, dims: Dimensions) -> Vec<Point> {
    points.iter().map(|&p| project(p, rect, dims)).collect()
}

/// Pixel size of `rect`, rounded, at least 1×1 unless the rect is empty.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rect_pixels(rect: Rect) -> Dimensions {
    if rect.is_empty() {
        return Dimensions::new(0, 0);
    }
    let axis = |v: f64| (v.round() as u32).max(1);
    Dimensions::new(axis(rect.width), axis(rect.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn fit_rect_letterboxes_wide_image() {
        let r = fit_rect(Dimensions::new(800, 600), Dimensions::new(400, 100));
        assert!(close(r.width, 800.0) && close(r.height, 200.0));
        assert!(close(r.x, 0.0) && close(r.y, 200.0));
    }

    #[test]
    fn fit_rect_pillarboxes_tall_image() {
        let r = fit_rect(Dimensions::new(800, 600), Dimensions::new(100, 300));
        assert!(close(r.width, 200.0) && close(r.height, 600.0));
        assert!(close(r.x, 300.0) && close(r.y, 0.0));
    }

    #[test]
    fn fit_rect_zero_area() {
        assert!(fit_rect(Dimensions::new(0, 10), Dimensions::new(5, 5)).is_empty());
        assert!(fit_rect(Dimensions::new(10, 10), Dimensions::new(0, 5)).is_empty());
    }

    #[test]
    fn identity_transform_keeps_base_rect() {
        let base = Rect::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(drawing_rect(base, SimilarityTransform::IDENTITY), base);
    }

    #[test]
    fn transform_scales_about_center_then_offsets() {
        let base = Rect::new(0.0, 0.0, 100.0, 100.0);
        let t = SimilarityTransform::new(2.0, 5.0, -5.0);
        let r = drawing_rect(base, t);
        assert!(close(r.x, -45.0) && close(r.y, -55.0));
        assert!(close(r.width, 200.0) && close(r.height, 200.0));
        // Corners follow the point transform.
        let corner = t.apply(Point::new(0.0, 0.0), base.center());
        assert!(close(corner.x, r.x) && close(corner.y, r.y));
    }

    #[test]
    fn project_unproject_invert() {
        let rect = Rect::new(50.0, 25.0, 200.0, 100.0);
        let dims = Dimensions::new(400, 200);
        let p = Point::new(120.0, 80.0);
        let c = project(p, rect, dims);
        assert!(close(c.x, 110.0) && close(c.y, 65.0));
        let back = unproject(c, rect, dims);
        assert!(close(back.x, p.x) && close(back.y, p.y));
    }

    #[test]
    fn degenerate_projection_maps_to_origin() {
        let p = project(Point::new(3.0, 4.0), Rect::default(), Dimensions::new(10, 10));
        assert_eq!(p, Point::default());
    }

    #[test]
    fn rect_pixels_rounds() {
        assert_eq!(rect_pixels(Rect::new(0.0, 0.0, 99.6, 0.2)), Dimensions::new(100, 1));
        assert_eq!(rect_pixels(Rect::default()), Dimensions::new(0, 0));
    }
}
