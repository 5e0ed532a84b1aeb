//! One comparison session: a reference, a drawing, and everything the
//! user has done to line them up.
//!
//! [`Session`] owns the drawing's [`SimilarityTransform`], the current
//! [`ViewMode`], landmarks, the outline assist and its listeners. It
//! does no drawing itself: [`Session::render`] returns a [`RenderPlan`]
//! describing what a front end should put on the canvas.

use serde::{Deserialize, Serialize};

use crate::align::{self, AlignInputs, Alignment, SimilarityTransform};
use crate::diagnostics::{Clock, SystemClock};
use crate::difference::{self, Difference};
use crate::downsample::resize_to;
use crate::grayscale;
use crate::landmarks::{LandmarkDetector, LandmarkKind, LandmarkPair, LandmarkRequests, ManagedDetector, Ticket};
use crate::layout;
use crate::mask::BinaryMask;
use crate::negative_space;
use crate::score::{self, AlignmentScore, OutlineAssist, OutlinePalette, PlacedMask};
use crate::simplify::{self, DEFAULT_LUMA_CUTOFF};
use crate::types::{Dimensions, PipelineConfig, PipelineError, Point, Rect, RgbaImage};

/// What the canvas shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    /// The images themselves.
    #[default]
    Normal,
    ReferenceOutline,
    DrawingOutline,
    BothOutlines,
    /// Outlines plus the base-unit anchor markers.
    BaseUnitOutline,
    /// The reference replaced by its simplified outline.
    SimplifiedOutline,
    /// The reference replaced by warm and cool luminance planes.
    SimplifiedPlanes { levels: u8 },
    /// The reference replaced by `levels` evenly spaced gray tones.
    Posterized { levels: u8 },
    /// Negative space washed blue over the reference.
    NegativeSpace,
}

impl ViewMode {
    /// Tone count of the posterized view unless chosen otherwise.
    pub const DEFAULT_POSTERIZE_LEVELS: u8 = 3;
    /// Band count of the simplified-planes view unless chosen otherwise.
    pub const DEFAULT_PLANE_LEVELS: u8 = 4;
}

/// Which of the two images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageRole {
    Reference,
    Drawing,
}

/// A tinted outline and where it goes on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineLayer {
    pub role: ImageRole,
    pub rect: Rect,
    pub layer: RgbaImage,
}

/// How a reference study layer combines with the reference image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerBlend {
    /// Draw the layer instead of the reference.
    Replace,
    /// Draw the reference, then the layer on top.
    Over,
}

/// Ink of the simplified outline.
const SIMPLIFIED_INK: score::Rgb = [255, 255, 255];

/// Matching base-unit anchors in canvas space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPair {
    pub reference: Point,
    pub drawing: Point,
}

/// What to draw for the current view.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPlan {
    /// Nothing loaded.
    Empty,
    /// Draw the images in their rects.
    Normal {
        reference: Option<Rect>,
        drawing: Option<Rect>,
    },
    /// Black background, then the outline layers in order.
    Outlines {
        layers: Vec<OutlineLayer>,
        /// Present when the assist scored this frame.
        assist: Option<AlignmentScore>,
    },
    /// Outline layers plus base-unit anchors.
    BaseUnit {
        layers: Vec<OutlineLayer>,
        anchor: Option<AnchorPair>,
    },
    /// The images, with a layer derived from the reference in the
    /// reference's rect.
    ReferenceLayer {
        reference: Rect,
        drawing: Option<Rect>,
        layer: RgbaImage,
        blend: LayerBlend,
    },
}

/// Callback invoked with each freshly computed assist score.
pub type ScoreListener = Box<dyn FnMut(AlignmentScore)>;

/// Outline masks cached per image at the size they were generated for.
#[derive(Debug, Default)]
struct OutlineCache {
    reference: Option<BinaryMask>,
    drawing: Option<BinaryMask>,
}

impl OutlineCache {
    const fn slot(&mut self, role: ImageRole) -> &mut Option<BinaryMask> {
        match role {
            ImageRole::Reference => &mut self.reference,
            ImageRole::Drawing => &mut self.drawing,
        }
    }

    const fn get(&self, role: ImageRole) -> Option<&BinaryMask> {
        match role {
            ImageRole::Reference => self.reference.as_ref(),
            ImageRole::Drawing => self.drawing.as_ref(),
        }
    }
}

fn placed(mask: Option<&BinaryMask>, rect: Option<Rect>) -> Option<PlacedMask<'_>> {
    Some(PlacedMask {
        mask: mask?,
        rect: rect?,
    })
}

/// The last reference study layer and what it was made for.
#[derive(Debug)]
struct StudyLayer {
    mode: ViewMode,
    target: Dimensions,
    layer: RgbaImage,
}

/// Base-unit anchors stored in image space so they follow the images.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BaseAnchor {
    reference: Point,
    drawing: Point,
}

/// State of one reference/drawing comparison.
pub struct Session<C: Clock = SystemClock> {
    config: PipelineConfig,
    canvas: Dimensions,
    reference: Option<RgbaImage>,
    drawing: Option<RgbaImage>,
    transform: SimilarityTransform,
    view_mode: ViewMode,
    assist_enabled: bool,
    assist: OutlineAssist<C>,
    show_base_drawing: bool,
    face: Option<LandmarkPair>,
    pose: Option<LandmarkPair>,
    requests: LandmarkRequests,
    base_anchor: Option<BaseAnchor>,
    outlines: OutlineCache,
    study: Option<StudyLayer>,
    listeners: Vec<ScoreListener>,
}

impl Session<SystemClock> {
    /// A session on a canvas of size `canvas`, timed by the system clock.
    #[must_use]
    pub fn new(canvas: Dimensions, config: PipelineConfig) -> Self {
        Self::with_clock(canvas, config, SystemClock)
    }
}

impl<C: Clock> Session<C> {
    /// A session driven by `clock`.
    #[must_use]
    pub fn with_clock(canvas: Dimensions, config: PipelineConfig, clock: C) -> Self {
        let assist = OutlineAssist::new(clock, config.alignment_threshold);
        Self {
            config,
            canvas,
            reference: None,
            drawing: None,
            transform: SimilarityTransform::IDENTITY,
            view_mode: ViewMode::Normal,
            assist_enabled: false,
            assist,
            show_base_drawing: true,
            face: None,
            pose: None,
            requests: LandmarkRequests::new(),
            base_anchor: None,
            outlines: OutlineCache::default(),
            study: None,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Replace the configuration. Cached outlines are regenerated lazily.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] and keeps the old
    /// configuration if `config` fails validation.
    pub fn set_config(&mut self, config: PipelineConfig) -> Result<(), PipelineError> {
        config.validate()?;
        self.assist.set_threshold(config.alignment_threshold);
        self.config = config;
        self.outlines = OutlineCache::default();
        self.study = None;
        Ok(())
    }

    #[must_use]
    pub const fn canvas(&self) -> Dimensions {
        self.canvas
    }

    /// Resize the canvas.
    pub fn set_canvas(&mut self, canvas: Dimensions) {
        if canvas != self.canvas {
            self.canvas = canvas;
            self.outlines = OutlineCache::default();
        }
    }

    // ───────────────────────── Images ──────────────────────────

    #[must_use]
    pub const fn image(&self, role: ImageRole) -> Option<&RgbaImage> {
        match role {
            ImageRole::Reference => self.reference.as_ref(),
            ImageRole::Drawing => self.drawing.as_ref(),
        }
    }

    /// Load an image. A new drawing starts untransformed; either image
    /// invalidates landmarks (including detections still in flight),
    /// anchors and cached outlines.
    pub fn set_image(&mut self, role: ImageRole, image: RgbaImage) {
        match role {
            ImageRole::Reference => self.reference = Some(image),
            ImageRole::Drawing => {
                self.drawing = Some(image);
                self.transform = SimilarityTransform::IDENTITY;
            }
        }
        self.face = None;
        self.pose = None;
        self.requests.invalidate();
        self.base_anchor = None;
        *self.outlines.slot(role) = None;
        if role == ImageRole::Reference {
            self.study = None;
        }
        self.assist.reset();
    }

    /// Decode encoded bytes (PNG, JPEG, BMP, WebP) and load them.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] or
    /// [`PipelineError::ImageDecode`] if the bytes can't be decoded.
    pub fn load_image(&mut self, role: ImageRole, bytes: &[u8]) -> Result<(), PipelineError> {
        let image = crate::grayscale::decode(bytes)?;
        self.set_image(role, image);
        Ok(())
    }

    // ───────────────────────── Layout ──────────────────────────

    /// The reference's rect on the canvas.
    #[must_use]
    pub fn reference_rect(&self) -> Option<Rect> {
        self.reference
            .as_ref()
            .map(|img| layout::fit_rect(self.canvas, Dimensions::of(img)))
    }

    /// The drawing's rect before its transform.
    #[must_use]
    pub fn drawing_base_rect(&self) -> Option<Rect> {
        self.drawing
            .as_ref()
            .map(|img| layout::fit_rect(self.canvas, Dimensions::of(img)))
    }

    /// The drawing's rect with its transform applied.
    #[must_use]
    pub fn drawing_rect(&self) -> Option<Rect> {
        self.drawing_base_rect()
            .map(|base| layout::drawing_rect(base, self.transform))
    }

    fn rect(&self, role: ImageRole) -> Option<Rect> {
        match role {
            ImageRole::Reference => self.reference_rect(),
            ImageRole::Drawing => self.drawing_rect(),
        }
    }

    // ───────────────────────── Transform ───────────────────────

    #[must_use]
    pub const fn transform(&self) -> SimilarityTransform {
        self.transform
    }

    /// Set the transform, clamping its scale.
    pub const fn set_transform(&mut self, transform: SimilarityTransform) {
        self.transform = SimilarityTransform::new(
            transform.scale,
            transform.offset_x,
            transform.offset_y,
        );
    }

    /// Move the drawing by `(dx, dy)` canvas pixels.
    pub fn nudge(&mut self, dx: f64, dy: f64) {
        if self.drawing.is_none() {
            return;
        }
        self.transform.offset_x += dx;
        self.transform.offset_y += dy;
    }

    /// Multiply the drawing's scale by `factor` (result clamped). With an
    /// `origin`, the canvas point under it stays put; otherwise the
    /// drawing grows about its own center.
    pub fn scale_about(&mut self, factor: f64, origin: Option<Point>) {
        if factor == 0.0 || !factor.is_finite() {
            return;
        }
        let Some(current) = self.drawing_rect() else {
            return;
        };
        let next = SimilarityTransform::clamp_scale(self.transform.scale * factor);
        let ratio = next / self.transform.scale;
        self.transform.scale = next;
        if let Some(origin) = origin
            && !current.is_empty()
        {
            let center = current.center();
            let moved_x = (center.x - origin.x).mul_add(ratio, origin.x);
            let moved_y = (center.y - origin.y).mul_add(ratio, origin.y);
            self.transform.offset_x += moved_x - center.x;
            self.transform.offset_y += moved_y - center.y;
        }
    }

    /// Back to identity.
    pub const fn reset_transform(&mut self) {
        self.transform = SimilarityTransform::IDENTITY;
    }

    /// Align the drawing automatically and adopt the result. `None` until
    /// both images are loaded.
    pub fn auto_align(&mut self, prefer_landmarks: bool) -> Option<Alignment> {
        let (reference, drawing) = (self.reference.as_ref()?, self.drawing.as_ref()?);
        let alignment = align::auto_align(&AlignInputs {
            canvas: self.canvas,
            reference,
            drawing,
            face: self.face.as_ref(),
            pose: self.pose.as_ref(),
            prefer_landmarks,
        });
        self.transform = alignment.transform;
        Some(alignment)
    }

    // ───────────────────────── Landmarks ───────────────────────

    #[must_use]
    pub const fn landmarks(&self, kind: LandmarkKind) -> Option<&LandmarkPair> {
        match kind {
            LandmarkKind::Face => self.face.as_ref(),
            LandmarkKind::Pose => self.pose.as_ref(),
        }
    }

    /// Store landmarks directly (e.g. user-placed).
    pub fn set_landmarks(&mut self, kind: LandmarkKind, pair: LandmarkPair) {
        match kind {
            LandmarkKind::Face => self.face = Some(pair),
            LandmarkKind::Pose => self.pose = Some(pair),
        }
    }

    /// Start a detection request; any earlier request becomes stale.
    pub const fn begin_landmark_request(&mut self) -> Ticket {
        self.requests.begin()
    }

    /// Store a detection result if `ticket` is still current. Returns
    /// whether it was kept.
    pub fn complete_landmark_request(
        &mut self,
        ticket: Ticket,
        kind: LandmarkKind,
        pair: LandmarkPair,
    ) -> bool {
        match self.requests.accept(ticket, pair) {
            Some(pair) => {
                self.set_landmarks(kind, pair);
                true
            }
            None => false,
        }
    }

    /// Detect face and pose landmarks on both images with `detector`.
    /// Returns whether any usable pair was found.
    pub fn detect_landmarks<D: LandmarkDetector>(&mut self, detector: &mut ManagedDetector<D>) -> bool {
        let (Some(reference), Some(drawing)) = (self.reference.as_ref(), self.drawing.as_ref()) else {
            return false;
        };
        let ticket = self.requests.begin();
        let found: Vec<(LandmarkKind, LandmarkPair)> = LandmarkKind::ALL
            .into_iter()
            .map(|kind| (kind, detector.detect_pair(kind, reference, drawing)))
            .collect();
        let mut usable = false;
        for (kind, pair) in found {
            usable |= pair.is_usable();
            self.complete_landmark_request(ticket, kind, pair);
        }
        usable
    }

    // ───────────────────────── Base unit ───────────────────────

    /// Pin matching base-unit anchors given in canvas space.
    pub fn set_base_anchor(&mut self, anchor: Option<AnchorPair>) {
        self.base_anchor = anchor.and_then(|a| {
            let (reference, drawing) = (self.reference.as_ref()?, self.drawing.as_ref()?);
            Some(BaseAnchor {
                reference: layout::unproject(a.reference, self.reference_rect()?, Dimensions::of(reference)),
                drawing: layout::unproject(a.drawing, self.drawing_rect()?, Dimensions::of(drawing)),
            })
        });
    }

    /// The anchors where they currently sit on the canvas.
    #[must_use]
    pub fn base_anchor(&self) -> Option<AnchorPair> {
        let anchor = self.base_anchor?;
        let reference = self.reference.as_ref()?;
        let drawing = self.drawing.as_ref()?;
        Some(AnchorPair {
            reference: layout::project(anchor.reference, self.reference_rect()?, Dimensions::of(reference)),
            drawing: layout::project(anchor.drawing, self.drawing_rect()?, Dimensions::of(drawing)),
        })
    }

    /// Show or hide the drawing's outline in the base-unit view.
    pub const fn set_base_drawing_visible(&mut self, visible: bool) {
        self.show_base_drawing = visible;
    }

    // ───────────────────────── Outlines and scoring ────────────

    #[must_use]
    pub const fn view_mode(&self) -> ViewMode {
        self.view_mode
    }

    pub const fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    /// Turn the outline assist on or off.
    pub fn set_outline_assist(&mut self, enabled: bool) {
        self.assist_enabled = enabled;
        if !enabled {
            self.assist.reset();
        }
    }

    /// Set the IoU the assist treats as aligned, clamped into `0..=1`.
    pub fn set_alignment_threshold(&mut self, threshold: f64) {
        self.assist.set_threshold(threshold);
        self.config.alignment_threshold = self.assist.threshold();
    }

    /// The most recent assist score.
    #[must_use]
    pub const fn last_score(&self) -> AlignmentScore {
        self.assist.last()
    }

    /// Register a callback for freshly computed assist scores.
    pub fn on_score(&mut self, listener: impl FnMut(AlignmentScore) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Generate (or reuse) the outline of `role` at its current on-canvas
    /// size.
    fn ensure_outline(&mut self, role: ImageRole) -> Option<Rect> {
        let rect = self.rect(role)?;
        let target = layout::rect_pixels(rect);
        if target.is_empty() {
            return None;
        }
        let image = self.image(role)?;
        let stale = self
            .outlines
            .get(role)
            .is_none_or(|mask| mask.dimensions() != target);
        if stale {
            let mask = crate::generate_outline_mask(image, &self.config, target);
            *self.outlines.slot(role) = Some(mask);
        }
        Some(rect)
    }

    /// The outline of `role` at its current on-canvas size.
    pub fn outline(&mut self, role: ImageRole) -> Option<&BinaryMask> {
        self.ensure_outline(role)?;
        self.outlines.get(role)
    }

    /// `role`'s image resampled to its on-canvas size.
    fn at_canvas_size(&self, role: ImageRole) -> Option<(Rect, RgbaImage)> {
        let rect = self.rect(role)?;
        let target = layout::rect_pixels(rect);
        if target.is_empty() {
            return None;
        }
        let image = self.image(role)?;
        Some((rect, resize_to(image, target.width, target.height)))
    }

    /// The simplified outline of `role` at its on-canvas size, traced with
    /// the configured `simplify_tolerance`.
    #[must_use]
    pub fn simplified_outline(&self, role: ImageRole) -> Option<BinaryMask> {
        let (_, image) = self.at_canvas_size(role)?;
        Some(simplify::simplified_outline(
            &image,
            DEFAULT_LUMA_CUTOFF,
            self.config.simplify_tolerance,
        ))
    }

    /// Score the outlines now, bypassing the debounce.
    pub fn score(&mut self) -> Option<AlignmentScore> {
        let reference_rect = self.ensure_outline(ImageRole::Reference)?;
        let drawing_rect = self.ensure_outline(ImageRole::Drawing)?;
        Some(score::score_outlines(
            PlacedMask {
                mask: self.outlines.reference.as_ref()?,
                rect: reference_rect,
            },
            PlacedMask {
                mask: self.outlines.drawing.as_ref()?,
                rect: drawing_rect,
            },
            self.canvas,
            self.assist.threshold(),
        ))
    }

    /// Heatmap difference of the two images as currently placed.
    #[must_use]
    pub fn difference(&self) -> Option<Difference> {
        difference::compute_difference(
            self.reference.as_ref()?,
            self.drawing.as_ref()?,
            self.reference_rect()?,
            self.drawing_rect()?,
        )
    }

    fn run_assist(&mut self, reference: Option<Rect>, drawing: Option<Rect>) -> AlignmentScore {
        let reading = self.assist.update(
            placed(self.outlines.reference.as_ref(), reference),
            placed(self.outlines.drawing.as_ref(), drawing),
            self.canvas,
        );
        if reading.fresh {
            for listener in &mut self.listeners {
                listener(reading.score);
            }
        }
        reading.score
    }

    fn layer(&self, role: ImageRole, rect: Option<Rect>, colour: score::Rgb) -> Option<OutlineLayer> {
        Some(OutlineLayer {
            role,
            rect: rect?,
            layer: score::tint(self.outlines.get(role)?, colour),
        })
    }

    /// Work out what to draw for the current view.
    ///
    /// An outline view that produces no layers (e.g. its image isn't
    /// loaded) drops back to [`ViewMode::Normal`].
    pub fn render(&mut self) -> RenderPlan {
        if self.reference.is_none() && self.drawing.is_none() {
            return RenderPlan::Empty;
        }
        let plan = match self.view_mode {
            ViewMode::Normal => None,
            ViewMode::ReferenceOutline => self.render_outlines(true, false),
            ViewMode::DrawingOutline => self.render_outlines(false, true),
            ViewMode::BothOutlines => self.render_outlines(true, true),
            ViewMode::BaseUnitOutline => self.render_base_unit(),
            mode @ (ViewMode::SimplifiedOutline
            | ViewMode::SimplifiedPlanes { .. }
            | ViewMode::Posterized { .. }
            | ViewMode::NegativeSpace) => self.render_reference_study(mode),
        };
        plan.unwrap_or_else(|| {
            if self.view_mode != ViewMode::Normal {
                log::debug!("{:?} has nothing to show; back to normal view", self.view_mode);
                self.view_mode = ViewMode::Normal;
            }
            RenderPlan::Normal {
                reference: self.reference_rect(),
                drawing: self.drawing_rect(),
            }
        })
    }

    fn render_outlines(&mut self, show_reference: bool, show_drawing: bool) -> Option<RenderPlan> {
        let assisted = self.assist_enabled && show_reference && show_drawing;
        let reference = if show_reference || assisted {
            self.ensure_outline(ImageRole::Reference)
        } else {
            None
        };
        let drawing = if show_drawing || assisted {
            self.ensure_outline(ImageRole::Drawing)
        } else {
            None
        };

        let assist = assisted.then(|| self.run_assist(reference, drawing));
        let palette = assist.map_or(OutlinePalette::PLAIN, |s| OutlinePalette::assist(s.aligned));

        let layers: Vec<OutlineLayer> = [
            show_reference
                .then(|| self.layer(ImageRole::Reference, reference, palette.reference))
                .flatten(),
            show_drawing
                .then(|| self.layer(ImageRole::Drawing, drawing, palette.drawing))
                .flatten(),
        ]
        .into_iter()
        .flatten()
        .collect();

        (!layers.is_empty()).then_some(RenderPlan::Outlines { layers, assist })
    }

    fn render_reference_study(&mut self, mode: ViewMode) -> Option<RenderPlan> {
        let rect = self.reference_rect()?;
        let target = layout::rect_pixels(rect);
        let cached = self
            .study
            .as_ref()
            .is_some_and(|s| s.mode == mode && s.target == target);
        if !cached {
            let (_, image) = self.at_canvas_size(ImageRole::Reference)?;
            let layer = match mode {
                ViewMode::SimplifiedOutline => score::tint(
                    &simplify::simplified_outline(&image, DEFAULT_LUMA_CUTOFF, self.config.simplify_tolerance),
                    SIMPLIFIED_INK,
                ),
                ViewMode::SimplifiedPlanes { levels } => {
                    grayscale::simplified_planes(&image, u32::from(levels))
                }
                ViewMode::Posterized { levels } => grayscale::posterize_tones(&image, u32::from(levels)),
                ViewMode::NegativeSpace => {
                    negative_space::negative_space_overlay(&negative_space::subject_mask(&image))
                }
                ViewMode::Normal
                | ViewMode::ReferenceOutline
                | ViewMode::DrawingOutline
                | ViewMode::BothOutlines
                | ViewMode::BaseUnitOutline => return None,
            };
            self.study = Some(StudyLayer { mode, target, layer });
        }
        let blend = if mode == ViewMode::NegativeSpace {
            LayerBlend::Over
        } else {
            LayerBlend::Replace
        };
        Some(RenderPlan::ReferenceLayer {
            reference: rect,
            drawing: self.drawing_rect(),
            layer: self.study.as_ref()?.layer.clone(),
            blend,
        })
    }

    fn render_base_unit(&mut self) -> Option<RenderPlan> {
        let reference = self.ensure_outline(ImageRole::Reference);
        let drawing = if self.show_base_drawing {
            self.ensure_outline(ImageRole::Drawing)
        } else {
            None
        };
        let palette = OutlinePalette::BASE_UNIT;
        let layers: Vec<OutlineLayer> = [
            self.layer(ImageRole::Reference, reference, palette.reference),
            self.layer(ImageRole::Drawing, drawing, palette.drawing),
        ]
        .into_iter()
        .flatten()
        .collect();
        if layers.is_empty() {
            return None;
        }
        Some(RenderPlan::BaseUnit {
            layers,
            anchor: self.base_anchor(),
        })
    }
}
