//! Binary masks: thresholding, morphology, speckle removal and
//! boundary extraction.
//!
//! These steps turn a continuous [`EdgeField`] into a clean outline:
//!
//! 1. [`threshold`]: normalized cutoff against the strongest gradient.
//! 2. [`clean`]: open (and optionally close), prune weakly supported
//!    pixels, drop small connected components. Retries once with relaxed
//!    thresholds if cleaning wipes out most of the signal.
//! 3. [`extract_boundary`]: keep only "on" pixels that touch "off"
//!    pixels, turning filled bands into thin outlines.

use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

use crate::edge::EdgeField;
use crate::types::{Dimensions, GrayImage};

/// Fraction of the pre-clean coverage below which cleaning is retried
/// with relaxed parameters.
pub const MIN_RETAINED_COVERAGE: f64 = 0.3;

/// Refinement level at or above which the relaxed retry is skipped: the
/// caller asked for aggressive cleanup.
pub const AGGRESSIVE_REFINEMENT: u8 = 85;

/// Offsets of the 8-connected neighbourhood.
const NEIGHBOURS: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// A set of "on" pixels over a fixed-size grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BinaryMask {
    /// An all-off mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; Dimensions::new(width, height).pixel_count()],
        }
    }

    /// Build a mask from a predicate over pixel coordinates.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let bits = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            bits,
        }
    }

    /// Interpret a grayscale image as a mask: non-zero pixels are on.
    #[must_use]
    pub fn from_gray_image(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            bits: image.pixels().map(|p| p.0[0] > 0).collect(),
        }
    }

    /// Render as a grayscale image with on = 255 and off = 0.
    #[must_use]
    pub fn to_gray_image(&self) -> GrayImage {
        let raw = self.bits.iter().map(|&on| if on { 255 } else { 0 }).collect();
        GrayImage::from_raw(self.width, self.height, raw).unwrap_or_default()
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Mask dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Whether `(x, y)` is on.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    /// Set `(x, y)`.
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        let i = y as usize * self.width as usize + x as usize;
        self.bits[i] = on;
    }

    /// Row-major bits.
    #[must_use]
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Number of on pixels.
    #[must_use]
    pub fn count_on(&self) -> usize {
        self.bits.iter().filter(|&&on| on).count()
    }

    /// Returns `true` if no pixel is on.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        !self.bits.iter().any(|&on| on)
    }

    /// Lookup with signed coordinates; `None` outside the grid.
    fn at(&self, x: i64, y: i64) -> Option<bool> {
        let xi = u32::try_from(x).ok().filter(|&v| v < self.width)?;
        let yi = u32::try_from(y).ok().filter(|&v| v < self.height)?;
        Some(self.get(xi, yi))
    }

    /// Number of on pixels among the 8 neighbours of `(x, y)`.
    fn on_neighbours(&self, x: u32, y: u32) -> usize {
        NEIGHBOURS
            .iter()
            .filter(|&&(dx, dy)| {
                self.at(i64::from(x) + dx, i64::from(y) + dy)
                    .unwrap_or(false)
            })
            .count()
    }

    fn map(&self, f: impl Fn(u32, u32) -> bool) -> Self {
        Self::from_fn(self.width, self.height, f)
    }
}

/// How pixels beyond the image edge are treated by [`extract_boundary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BorderPolicy {
    /// Off-image neighbours are background, so on pixels along the image
    /// edge are always boundary.
    #[default]
    Background,
    /// Off-image neighbours are ignored; only in-image off pixels make a
    /// boundary.
    Clamp,
}

/// Binarize an edge field with a normalized cutoff.
///
/// A pixel is on when `magnitude / max_magnitude > cutoff`. A field with
/// no gradient at all (maximum zero) yields an empty mask.
#[must_use]
pub fn threshold(field: &EdgeField, cutoff: f32) -> BinaryMask {
    let max = field.max_magnitude();
    let bits = if max > 0.0 {
        field.magnitudes().iter().map(|&m| m / max > cutoff).collect()
    } else {
        vec![false; field.magnitudes().len()]
    };
    BinaryMask {
        width: field.width(),
        height: field.height(),
        bits,
    }
}

/// 3×3 erosion: a pixel survives only if it and all 8 neighbours are on.
/// Pixels outside the image count as off.
#[must_use]
pub fn erode(mask: &BinaryMask) -> BinaryMask {
    mask.map(|x, y| {
        mask.get(x, y)
            && NEIGHBOURS.iter().all(|&(dx, dy)| {
                mask.at(i64::from(x) + dx, i64::from(y) + dy)
                    .unwrap_or(false)
            })
    })
}

/// 3×3 dilation: a pixel turns on if it or any 8-neighbour is on.
#[must_use]
pub fn dilate(mask: &BinaryMask) -> BinaryMask {
    mask.map(|x, y| mask.get(x, y) || mask.on_neighbours(x, y) > 0)
}

/// Morphological opening (erode, then dilate). Removes specks thinner
/// than the 3×3 structuring element.
#[must_use]
pub fn open(mask: &BinaryMask) -> BinaryMask {
    dilate(&erode(mask))
}

/// Morphological closing (dilate, then erode). Fills one-pixel gaps.
#[must_use]
pub fn close(mask: &BinaryMask) -> BinaryMask {
    erode(&dilate(mask))
}

/// Turn off on pixels with fewer than `min_neighbours` on 8-neighbours.
#[must_use]
pub fn prune_sparse(mask: &BinaryMask, min_neighbours: u8) -> BinaryMask {
    if min_neighbours == 0 {
        return mask.clone();
    }
    mask.map(|x, y| mask.get(x, y) && mask.on_neighbours(x, y) >= usize::from(min_neighbours))
}

/// Drop 8-connected components smaller than `min_pixels`.
#[must_use]
pub fn remove_small_components(mask: &BinaryMask, min_pixels: u32) -> BinaryMask {
    if min_pixels <= 1 || mask.is_blank() {
        return mask.clone();
    }
    let labels = connected_components(&mask.to_gray_image(), Connectivity::Eight, image::Luma([0]));

    let label_count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut sizes = vec![0_u32; label_count + 1];
    for p in labels.pixels() {
        sizes[p.0[0] as usize] += 1;
    }

    mask.map(|x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        label != 0 && sizes[label] >= min_pixels
    })
}

/// Keep on pixels that have at least one off 8-neighbour.
///
/// Converts a filled region into its one-pixel-wide outline. See
/// [`BorderPolicy`] for how the image edge is treated.
#[must_use]
pub fn extract_boundary(mask: &BinaryMask, policy: BorderPolicy) -> BinaryMask {
    mask.map(|x, y| {
        mask.get(x, y)
            && NEIGHBOURS.iter().any(|&(dx, dy)| {
                match mask.at(i64::from(x) + dx, i64::from(y) + dy) {
                    Some(on) => !on,
                    None => policy == BorderPolicy::Background,
                }
            })
    })
}

/// Parameters for [`clean`], usually derived from a refinement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanParams {
    /// Apply a closing pass after the opening.
    pub close: bool,
    /// Minimum on 8-neighbours for a pixel to survive pruning.
    pub min_neighbours: u8,
    /// Minimum connected component size in working-resolution pixels.
    pub min_component_pixels: u32,
    /// Refinement level the parameters came from (`0..=100`).
    pub refinement_level: u8,
}

impl CleanParams {
    /// Map a refinement level onto cleanup parameters.
    ///
    /// `base_min_pixels` is the component threshold at full resolution;
    /// it is multiplied by `0.5 + level / 100` and by `scale²`, where
    /// `scale` is the working-resolution factor (`<= 1`), so the
    /// threshold stays resolution-independent.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_refinement(level: u8, base_min_pixels: u32, scale: f64) -> Self {
        let level = level.min(100);
        let strength = f64::from(level) / 100.0;
        let min_neighbours = (strength * 4.0).round() as u8;
        let min_component_pixels =
            (f64::from(base_min_pixels) * (0.5 + strength) * scale * scale).round() as u32;
        Self {
            close: level >= 50,
            min_neighbours,
            min_component_pixels,
            refinement_level: level,
        }
    }

    /// The same parameters with neighbour and component thresholds
    /// halved.
    #[must_use]
    pub const fn relaxed(self) -> Self {
        Self {
            min_neighbours: self.min_neighbours / 2,
            min_component_pixels: self.min_component_pixels / 2,
            ..self
        }
    }
}

/// Result of [`clean`].
#[derive(Debug, Clone, PartialEq)]
pub struct CleanOutcome {
    /// The cleaned mask.
    pub mask: BinaryMask,
    /// On pixels before cleaning.
    pub pixels_before: usize,
    /// On pixels after cleaning.
    pub pixels_after: usize,
    /// Whether the relaxed retry ran.
    pub retried: bool,
}

impl CleanOutcome {
    /// Fraction of pre-clean pixels that survived (`1.0` for an empty
    /// input).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn retained(&self) -> f64 {
        if self.pixels_before == 0 {
            1.0
        } else {
            self.pixels_after as f64 / self.pixels_before as f64
        }
    }
}

/// Remove speckle noise from a thresholded mask.
///
/// Runs one cleaning pass with `params`. If fewer than
/// [`MIN_RETAINED_COVERAGE`] of the original pixels survive and the
/// refinement level is below [`AGGRESSIVE_REFINEMENT`], runs a second
/// pass with [`CleanParams::relaxed`] and keeps whichever result retained
/// more pixels. A sparse result is returned as-is rather than failing.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn clean(mask: &BinaryMask, params: CleanParams) -> CleanOutcome {
    let pixels_before = mask.count_on();
    let first = clean_pass(mask, params);
    let first_count = first.count_on();

    let coverage_floor = pixels_before as f64 * MIN_RETAINED_COVERAGE;
    if (first_count as f64) >= coverage_floor || params.refinement_level >= AGGRESSIVE_REFINEMENT
    {
        return CleanOutcome {
            mask: first,
            pixels_before,
            pixels_after: first_count,
            retried: false,
        };
    }

    log::warn!(
        "cleanup kept {first_count} of {pixels_before} pixels; retrying with relaxed thresholds"
    );
    let second = clean_pass(mask, params.relaxed());
    let second_count = second.count_on();
    let (mask, pixels_after) = if second_count > first_count {
        (second, second_count)
    } else {
        (first, first_count)
    };
    CleanOutcome {
        mask,
        pixels_before,
        pixels_after,
        retried: true,
    }
}

fn clean_pass(mask: &BinaryMask, params: CleanParams) -> BinaryMask {
    let mut out = open(mask);
    if params.close {
        out = close(&out);
    }
    out = prune_sparse(&out, params.min_neighbours);
    remove_small_components(&out, params.min_component_pixels)
}
