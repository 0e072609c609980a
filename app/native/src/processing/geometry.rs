//! Crop and placement geometry.

use serde::{Deserialize, Serialize};

/// Screen (or canvas) dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self { Self { width, height } }

    /// A 2K screen, used when nothing else is configured.
    #[must_use]
    pub const fn default_2k() -> Self { Self { width: 2560, height: 1440 } }

    #[must_use]
    pub const fn is_empty(self) -> bool { self.width == 0 || self.height == 0 }
}

impl Default for ScreenSize {
    fn default() -> Self { Self::default_2k() }
}

/// Axis-aligned rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self { Self { x, y, width, height } }
}

/// How a source image maps onto the output canvas.
///
/// `crop` is taken from the source and scaled into `placement` on a canvas
/// of size `canvas`; everything outside `placement` is black.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub source: ScreenSize,
    pub canvas: ScreenSize,
    pub crop: Rect,
    pub placement: Rect,
}

impl Geometry {
    /// Computes the geometry for `source` on `canvas`.
    ///
    /// With `optimize_layout` the source is cropped symmetrically along its
    /// dominant axis to the canvas aspect ratio and fills the canvas.
    /// Otherwise the whole source is fitted inside the canvas and
    /// letterboxed.
    #[must_use]
    pub fn compute(source: ScreenSize, canvas: ScreenSize, optimize_layout: bool) -> Self {
        if optimize_layout {
            Self {
                source,
                canvas,
                crop: cover_crop(source, canvas),
                placement: Rect::new(0, 0, canvas.width, canvas.height),
            }
        } else {
            Self {
                source,
                canvas,
                crop: Rect::new(0, 0, source.width, source.height),
                placement: fit_inside(source, canvas),
            }
        }
    }

    /// The same crop rendered onto a canvas of another size.
    #[must_use]
    pub fn scaled_to(&self, canvas: ScreenSize) -> Self {
        let crop_size = ScreenSize::new(self.crop.width, self.crop.height);
        let placement = if self.is_letterboxed() {
            fit_inside(crop_size, canvas)
        } else {
            Rect::new(0, 0, canvas.width, canvas.height)
        };

        Self {
            source: self.source,
            canvas,
            crop: self.crop,
            placement,
        }
    }

    /// `true` if the content does not cover the whole canvas.
    #[must_use]
    pub fn is_letterboxed(&self) -> bool {
        self.placement != Rect::new(0, 0, self.canvas.width, self.canvas.height)
    }
}

/// `a * b / c`, rounded to the nearest integer.
#[allow(clippy::cast_possible_truncation)]
fn mul_div_round(a: u32, b: u32, c: u32) -> u32 {
    let c = u64::from(c.max(1));
    ((u64::from(a) * u64::from(b) + c / 2) / c) as u32
}

/// Largest centered rectangle of the canvas's aspect ratio inside `source`.
fn cover_crop(source: ScreenSize, canvas: ScreenSize) -> Rect {
    let (sw, sh) = (source.width, source.height);
    let (cw, ch) = (canvas.width, canvas.height);

    // Compare sw/sh with cw/ch without floating point.
    if u64::from(sw) * u64::from(ch) > u64::from(sh) * u64::from(cw) {
        let width = mul_div_round(sh, cw, ch).clamp(1, sw);
        Rect::new((sw - width) / 2, 0, width, sh)
    } else {
        let height = mul_div_round(sw, ch, cw).clamp(1, sh);
        Rect::new(0, (sh - height) / 2, sw, height)
    }
}

/// Largest centered rectangle of the source's aspect ratio inside `canvas`.
fn fit_inside(source: ScreenSize, canvas: ScreenSize) -> Rect {
    let (sw, sh) = (source.width, source.height);
    let (cw, ch) = (canvas.width, canvas.height);

    if u64::from(sw) * u64::from(ch) >= u64::from(sh) * u64::from(cw) {
        let height = mul_div_round(sh, cw, sw).clamp(1, ch);
        Rect::new(0, (ch - height) / 2, cw, height)
    } else {
        let width = mul_div_round(sw, ch, sh).clamp(1, cw);
        Rect::new((cw - width) / 2, 0, width, ch)
    }
}
