//! Per-page scale-factor computation between the two extraction passes.
//!
//! The hi-res detection pass and the fast text pass rasterize the same page
//! at different pixel dimensions, so their rects live in different spaces.
//! The factor between them is a property of the page's DPI pairing, not a
//! universal constant, and rotated or rescanned pages can differ from their
//! neighbours. It is therefore computed here once per page from the reported
//! pixel dimensions and carried through the pipeline as a [`PageScale`]
//! value, never recomputed per element.

use crate::error::PageError;
use crate::geometry::BoundingRect;
use crate::model::ExtractionPass;
use tracing::debug;

/// The reconciliation factor for one page.
///
/// `factor` is hi-resolution over fast-resolution: dividing a hi-res
/// coordinate by it lands in the canonical (fast) space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageScale {
    pub page_number: u32,
    pub factor: f64,
}

impl PageScale {
    /// No-op scale for pages that arrived with a single pass.
    pub fn identity(page_number: u32) -> Self {
        Self {
            page_number,
            factor: 1.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.factor == 1.0
    }

    /// Compute the scale between a page's two passes.
    ///
    /// The width- and height-derived ratios must agree within `tolerance`
    /// (relative); disagreement means the passes do not describe the same
    /// layout (rotation, per-page DPI change) and the result is
    /// [`PageError::ResolutionMismatch`] rather than a silent average of two
    /// ratios that contradict each other.
    ///
    /// # Errors
    /// [`PageError::InvalidGeometry`] for non-positive or non-finite pixel
    /// dimensions; [`PageError::ResolutionMismatch`] when the ratios
    /// disagree.
    pub fn compute(
        hi: &ExtractionPass,
        fast: &ExtractionPass,
        tolerance: f64,
    ) -> Result<Self, PageError> {
        let page = fast.page_number;
        for (label, v) in [
            ("hi pixel_width", hi.pixel_width),
            ("hi pixel_height", hi.pixel_height),
            ("fast pixel_width", fast.pixel_width),
            ("fast pixel_height", fast.pixel_height),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(PageError::InvalidGeometry {
                    page,
                    detail: format!("{label} must be finite and positive, got {v}"),
                });
            }
        }

        let width_ratio = hi.pixel_width / fast.pixel_width;
        let height_ratio = hi.pixel_height / fast.pixel_height;
        let disagreement = (width_ratio - height_ratio).abs() / width_ratio.min(height_ratio);
        if disagreement > tolerance {
            return Err(PageError::ResolutionMismatch {
                page,
                width_ratio,
                height_ratio,
            });
        }

        // The ratios agree within tolerance; the midpoint is within
        // tolerance of both.
        let factor = (width_ratio + height_ratio) / 2.0;
        debug!(page, factor, "computed page scale");
        Ok(Self {
            page_number: page,
            factor,
        })
    }

    /// Convert a hi-res rect into the canonical (fast) space.
    pub fn to_canonical(&self, rect: &BoundingRect) -> Result<BoundingRect, PageError> {
        if self.is_identity() {
            return Ok(*rect);
        }
        rect.scale(1.0 / self.factor)
    }

    /// Convert a canonical-space rect back into hi-res space.
    pub fn to_hi(&self, rect: &BoundingRect) -> Result<BoundingRect, PageError> {
        if self.is_identity() {
            return Ok(*rect);
        }
        rect.scale(self.factor)
    }
}
