//! Face and pose landmarks, and the detector seam that produces them.
//!
//! The landmark model itself is an external capability behind
//! [`LandmarkDetector`]. Detection may be unavailable or fail at any time;
//! [`ManagedDetector`] tracks the load state and turns failures into empty
//! results so alignment silently falls back to non-landmark strategies.

use serde::{Deserialize, Serialize};

use crate::layout;
use crate::types::{Dimensions, Point, Rect, RgbaImage};

/// Face-mesh indices of the outer eye corners.
const FACE_EYE_CORNERS: [usize; 2] = [33, 263];
/// Face-mesh indices used for coarse alignment: eye corners, nose tip,
/// upper lip, chin.
const FACE_KEYPOINTS: [usize; 5] = [33, 263, 1, 13, 152];
/// Pose indices of the shoulders.
const POSE_SHOULDERS: [usize; 2] = [11, 12];
/// Pose indices used for coarse alignment: shoulders, hips, nose.
const POSE_KEYPOINTS: [usize; 5] = [11, 12, 23, 24, 0];

/// Which landmark model a set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandmarkKind {
    Face,
    Pose,
}

impl LandmarkKind {
    /// Both kinds, in alignment preference order.
    pub const ALL: [Self; 2] = [Self::Face, Self::Pose];

    /// Indices that anchor coarse alignment for this kind.
    #[must_use]
    pub const fn keypoints(self) -> &'static [usize] {
        match self {
            Self::Face => &FACE_KEYPOINTS,
            Self::Pose => &POSE_KEYPOINTS,
        }
    }

    /// The index pair whose distance measures the subject's scale.
    #[must_use]
    pub const fn scale_anchors(self) -> [usize; 2] {
        match self {
            Self::Face => FACE_EYE_CORNERS,
            Self::Pose => POSE_SHOULDERS,
        }
    }

    /// Lowercase display name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Face => "face",
            Self::Pose => "pose",
        }
    }
}

/// Landmarks detected on one image, in that image's pixel space.
///
/// Point order is the detector's index order and is stable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkSet {
    points: Vec<Point>,
    dimensions: Dimensions,
}

impl LandmarkSet {
    /// Landmarks already in pixel space of an image sized `dimensions`.
    #[must_use]
    pub const fn new(points: Vec<Point>, dimensions: Dimensions) -> Self {
        Self { points, dimensions }
    }

    /// Scale normalized (`0..1`) detector output to pixels.
    #[must_use]
    pub fn from_normalized(normalized: &[Point], dimensions: Dimensions) -> Self {
        let (w, h) = (f64::from(dimensions.width), f64::from(dimensions.height));
        let points = normalized
            .iter()
            .map(|p| Point::new(p.x * w, p.y * h))
            .collect();
        Self { points, dimensions }
    }

    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The landmarks at `indices`, skipping any the set doesn't have.
    #[must_use]
    pub fn pick(&self, indices: &[usize]) -> Vec<Point> {
        indices.iter().filter_map(|&i| self.points.get(i).copied()).collect()
    }

    /// Every landmark projected onto the canvas for an image displayed in
    /// `rect`.
    #[must_use]
    pub fn project(&self, rect: Rect) -> Vec<Point> {
        layout::project_all(&self.points, rect, self.dimensions)
    }

    /// Canvas-space distance between the two scale anchors of `kind`, or
    /// `None` if either anchor is missing.
    #[must_use]
    pub fn anchor_span(&self, kind: LandmarkKind, rect: Rect) -> Option<f64> {
        let [a, b] = kind.scale_anchors();
        let a = layout::project(*self.points.get(a)?, rect, self.dimensions);
        let b = layout::project(*self.points.get(b)?, rect, self.dimensions);
        Some(a.distance(b))
    }
}

/// Reference and drawing landmarks of the same kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkPair {
    pub reference: LandmarkSet,
    pub drawing: LandmarkSet,
}

impl LandmarkPair {
    /// Whether both sides have at least one landmark.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.reference.is_empty() && !self.drawing.is_empty()
    }
}

/// Errors from a landmark detector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum DetectorError {
    /// The model could not be loaded.
    #[error("landmark detector unavailable: {0}")]
    Unavailable(String),

    /// Inference ran but failed.
    #[error("landmark detection failed: {0}")]
    Failed(String),
}

/// Load state of a detector.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DetectorState {
    #[default]
    Unloaded,
    Loading,
    Ready,
    /// Last load attempt failed; the next request tries again.
    Failed(String),
}

/// A source of face and pose landmarks.
pub trait LandmarkDetector {
    /// Prepare the model. Called before the first detection and again
    /// after a failed load.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::Unavailable`] if the model can't be
    /// loaded.
    fn load(&mut self) -> Result<(), DetectorError> {
        Ok(())
    }

    /// Detect the landmarks of `kind` on `image`, as normalized (`0..1`)
    /// coordinates. An empty vector means nothing was found.
    ///
    /// # Errors
    ///
    /// Returns [`DetectorError::Failed`] if inference fails.
    fn detect(&mut self, kind: LandmarkKind, image: &RgbaImage)
    -> Result<Vec<Point>, DetectorError>;
}

/// A detector plus its load state.
#[derive(Debug)]
pub struct ManagedDetector<D> {
    detector: D,
    state: DetectorState,
}

impl<D: LandmarkDetector> ManagedDetector<D> {
    #[must_use]
    pub const fn new(detector: D) -> Self {
        Self {
            detector,
            state: DetectorState::Unloaded,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &DetectorState {
        &self.state
    }

    /// Load the model if it isn't ready. Returns whether it is ready now.
    pub fn ensure_ready(&mut self) -> bool {
        if self.state == DetectorState::Ready {
            return true;
        }
        self.state = DetectorState::Loading;
        match self.detector.load() {
            Ok(()) => {
                self.state = DetectorState::Ready;
                true
            }
            Err(e) => {
                log::warn!("{e}");
                self.state = DetectorState::Failed(e.to_string());
                false
            }
        }
    }

    /// Landmarks of `kind` on `image` in pixel space. Any failure yields
    /// an empty set.
    pub fn detect(&mut self, kind: LandmarkKind, image: &RgbaImage) -> LandmarkSet {
        let dimensions = Dimensions::of(image);
        if !self.ensure_ready() {
            return LandmarkSet::new(Vec::new(), dimensions);
        }
        match self.detector.detect(kind, image) {
            Ok(normalized) => LandmarkSet::from_normalized(&normalized, dimensions),
            Err(e) => {
                log::warn!("{} landmarks: {e}", kind.label());
                LandmarkSet::new(Vec::new(), dimensions)
            }
        }
    }

    /// Face landmarks, or `None` if none were found.
    pub fn detect_face(&mut self, image: &RgbaImage) -> Option<LandmarkSet> {
        Some(self.detect(LandmarkKind::Face, image)).filter(|set| !set.is_empty())
    }

    /// Pose landmarks, or `None` if none were found.
    pub fn detect_pose(&mut self, image: &RgbaImage) -> Option<LandmarkSet> {
        Some(self.detect(LandmarkKind::Pose, image)).filter(|set| !set.is_empty())
    }

    /// Detect `kind` on both images.
    pub fn detect_pair(
        &mut self,
        kind: LandmarkKind,
        reference: &RgbaImage,
        drawing: &RgbaImage,
    ) -> LandmarkPair {
        LandmarkPair {
            reference: self.detect(kind, reference),
            drawing: self.detect(kind, drawing),
        }
    }
}

/// Identifies one detection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Latest-wins bookkeeping for detection requests.
///
/// Each request takes a ticket from [`begin`](Self::begin); when its
/// result arrives, [`accept`](Self::accept) passes it through only if no
/// newer request has started since.
#[derive(Debug, Default)]
pub struct LandmarkRequests {
    latest: u64,
}

impl LandmarkRequests {
    #[must_use]
    pub const fn new() -> Self {
        Self { latest: 0 }
    }

    /// Start a request, superseding all earlier ones.
    pub const fn begin(&mut self) -> Ticket {
        self.latest += 1;
        Ticket(self.latest)
    }

    /// Make every outstanding ticket stale without starting a request,
    /// e.g. when the image it was issued for is replaced.
    pub const fn invalidate(&mut self) {
        self.latest += 1;
    }

    /// Whether `ticket` belongs to the newest request.
    #[must_use]
    pub const fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.latest
    }

    /// `Some(result)` if `ticket` is current, else `None` (stale).
    pub fn accept<T>(&self, ticket: Ticket, result: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(result)
        } else {
            log::debug!("discarding stale landmark result (ticket {})", ticket.0);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedDetector {
        loads_ok: bool,
        points: Vec<Point>,
        fail_detect: bool,
        load_calls: usize,
    }

    impl LandmarkDetector for ScriptedDetector {
        fn load(&mut self) -> Result<(), DetectorError> {
            self.load_calls += 1;
            if self.loads_ok {
                Ok(())
            } else {
                Err(DetectorError::Unavailable("offline".into()))
            }
        }

        fn detect(&mut self, _: LandmarkKind, _: &RgbaImage) -> Result<Vec<Point>, DetectorError> {
            if self.fail_detect {
                Err(DetectorError::Failed("bad input".into()))
            } else {
                Ok(self.points.clone())
            }
        }
    }

    fn scripted(loads_ok: bool, fail_detect: bool) -> ManagedDetector<ScriptedDetector> {
        ManagedDetector::new(ScriptedDetector {
            loads_ok,
            points: vec![Point::new(0.25, 0.5), Point::new(1.0, 1.0)],
            fail_detect,
            load_calls: 0,
        })
    }

    #[test]
    fn normalized_points_scale_to_pixels() {
        let set = LandmarkSet::from_normalized(
            &[Point::new(0.5, 0.25), Point::new(0.0, 1.0)],
            Dimensions::new(200, 100),
        );
        assert_eq!(set.points(), &[Point::new(100.0, 25.0), Point::new(0.0, 100.0)]);
    }

    #[test]
    fn keypoint_tables() {
        assert_eq!(LandmarkKind::Face.keypoints(), &[33, 263, 1, 13, 152]);
        assert_eq!(LandmarkKind::Pose.keypoints(), &[11, 12, 23, 24, 0]);
        assert_eq!(LandmarkKind::Face.scale_anchors(), [33, 263]);
        assert_eq!(LandmarkKind::Pose.scale_anchors(), [11, 12]);
    }

    #[test]
    fn pick_skips_missing_indices() {
        let set = LandmarkSet::new(
            (0..13).map(|i| Point::new(f64::from(i), 0.0)).collect(),
            Dimensions::new(10, 10),
        );
        let picked = set.pick(LandmarkKind::Pose.keypoints());
        assert_eq!(picked, vec![Point::new(11.0, 0.0), Point::new(12.0, 0.0), Point::new(0.0, 0.0)]);
        assert!(set.anchor_span(LandmarkKind::Face, Rect::new(0.0, 0.0, 10.0, 10.0)).is_none());
        let span = set.anchor_span(LandmarkKind::Pose, Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(span, Some(2.0));
    }

    #[test]
    fn ready_detector_maps_results() {
        let mut detector = scripted(true, false);
        let image = RgbaImage::new(40, 20);
        let set = detector.detect(LandmarkKind::Face, &image);
        assert_eq!(detector.state(), &DetectorState::Ready);
        assert_eq!(set.points(), &[Point::new(10.0, 10.0), Point::new(40.0, 20.0)]);
    }

    #[test]
    fn load_failure_is_silent_and_retried() {
        let mut detector = scripted(false, false);
        let image = RgbaImage::new(8, 8);
        let set = detector.detect(LandmarkKind::Pose, &image);
        assert!(set.is_empty());
        assert_eq!(set.dimensions(), Dimensions::new(8, 8));
        assert!(matches!(detector.state(), DetectorState::Failed(_)));
        let _ = detector.detect(LandmarkKind::Pose, &image);
        assert_eq!(detector.detector.load_calls, 2);
    }

    #[test]
    fn detection_failure_yields_empty_pair() {
        let mut detector = scripted(true, true);
        let image = RgbaImage::new(8, 8);
        let pair = detector.detect_pair(LandmarkKind::Face, &image, &image);
        assert!(!pair.is_usable());
        assert_eq!(detector.state(), &DetectorState::Ready);
        assert!(detector.detect_face(&image).is_none());
    }

    #[test]
    fn face_and_pose_shortcuts() {
        let mut detector = scripted(true, false);
        let image = RgbaImage::new(4, 4);
        assert_eq!(detector.detect_face(&image).map(|s| s.len()), Some(2));
        assert_eq!(detector.detect_pose(&image).map(|s| s.len()), Some(2));
    }

    #[test]
    fn stale_tickets_are_discarded() {
        let mut requests = LandmarkRequests::new();
        let first = requests.begin();
        let second = requests.begin();
        assert_eq!(requests.accept(first, 1), None);
        assert_eq!(requests.accept(second, 2), Some(2));
        assert!(requests.is_current(second));
    }

    #[test]
    fn invalidate_retires_outstanding_ticket() {
        let mut requests = LandmarkRequests::new();
        let ticket = requests.begin();
        requests.invalidate();
        assert!(!requests.is_current(ticket));
        assert_eq!(requests.accept(ticket, 1), None);
        let next = requests.begin();
        assert_eq!(requests.accept(next, 2), Some(2));
    }
}
