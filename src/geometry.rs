//! Bounding-rectangle type and the pure operations the pipeline is built on.
//!
//! Every rectangle carries the pixel dimensions of the page it was detected
//! on and the page number, because a coordinate pair is meaningless without
//! the space it lives in — the same figure is `{278, 278, 1390, 1390}` in a
//! hi-res pass and `{100, 100, 500, 500}` in the fast pass. Keeping the page
//! dimensions on the rect is what lets [`crate::pipeline::reconcile`] check
//! that a scale factor actually matches the rect it is applied to.
//!
//! All operations here are pure: queries (`area`, `intersection_area`,
//! `containment_ratio`, …) are total and never fail; constructors and
//! transforms (`new`, `scale`, `translate`) validate their inputs and fail
//! with [`PageError::InvalidGeometry`] on malformed values.

use crate::error::PageError;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in page-pixel coordinates.
///
/// Invariants, enforced at construction and preserved by every transform:
/// `x1 <= x2`, `y1 <= y2`, all values finite, page dimensions positive, and
/// all four coordinates inside `[0, page_width] × [0, page_height]`.
/// Coordinates slightly outside the page (detector jitter) are clamped in
/// rather than rejected. Zero-area rects are valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    /// Pixel width of the page this rect was detected on.
    pub page_width: f64,
    /// Pixel height of the page this rect was detected on.
    pub page_height: f64,
    /// 1-indexed page number.
    pub page_number: u32,
}

impl BoundingRect {
    /// Construct a validated rectangle.
    ///
    /// # Errors
    /// [`PageError::InvalidGeometry`] when a value is non-finite, the page
    /// dimensions are not positive, or `x1 > x2` / `y1 > y2`.
    pub fn new(
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        page_width: f64,
        page_height: f64,
        page_number: u32,
    ) -> Result<Self, PageError> {
        let invalid = |detail: String| PageError::InvalidGeometry {
            page: page_number,
            detail,
        };

        for (name, v) in [
            ("x1", x1),
            ("y1", y1),
            ("x2", x2),
            ("y2", y2),
            ("page_width", page_width),
            ("page_height", page_height),
        ] {
            if !v.is_finite() {
                return Err(invalid(format!("{name} is not finite ({v})")));
            }
        }
        if page_width <= 0.0 || page_height <= 0.0 {
            return Err(invalid(format!(
                "page dimensions must be positive, got {page_width}x{page_height}"
            )));
        }
        if x1 > x2 {
            return Err(invalid(format!("x1 ({x1}) > x2 ({x2})")));
        }
        if y1 > y2 {
            return Err(invalid(format!("y1 ({y1}) > y2 ({y2})")));
        }

        // Detector jitter: boxes a few pixels off the page edge are normal
        // output, so clamp rather than reject.
        let clamp_x = |v: f64| v.clamp(0.0, page_width);
        let clamp_y = |v: f64| v.clamp(0.0, page_height);

        Ok(Self {
            x1: clamp_x(x1),
            y1: clamp_y(y1),
            x2: clamp_x(x2),
            y2: clamp_y(y2),
            page_width,
            page_height,
            page_number,
        })
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Multiply all four coordinates and the page dimensions by `factor`,
    /// producing the same rect expressed in a resolution scaled by `factor`.
    ///
    /// # Errors
    /// [`PageError::InvalidGeometry`] when `factor` is not finite and
    /// positive.
    pub fn scale(&self, factor: f64) -> Result<Self, PageError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(PageError::InvalidGeometry {
                page: self.page_number,
                detail: format!("scale factor must be finite and positive, got {factor}"),
            });
        }
        Self::new(
            self.x1 * factor,
            self.y1 * factor,
            self.x2 * factor,
            self.y2 * factor,
            self.page_width * factor,
            self.page_height * factor,
            self.page_number,
        )
    }

    /// Move the rect by `(dx, dy)` within the same page space. Coordinates
    /// that leave the page are clamped back in.
    ///
    /// # Errors
    /// [`PageError::InvalidGeometry`] when `dx` or `dy` is not finite.
    pub fn translate(&self, dx: f64, dy: f64) -> Result<Self, PageError> {
        if !dx.is_finite() || !dy.is_finite() {
            return Err(PageError::InvalidGeometry {
                page: self.page_number,
                detail: format!("translate offsets must be finite, got ({dx}, {dy})"),
            });
        }
        Self::new(
            self.x1 + dx,
            self.y1 + dy,
            self.x2 + dx,
            self.y2 + dy,
            self.page_width,
            self.page_height,
            self.page_number,
        )
    }

    /// Area of the intersection of `self` and `other`, 0.0 when they do not
    /// overlap or live on different pages.
    pub fn intersection_area(&self, other: &Self) -> f64 {
        if self.page_number != other.page_number {
            return 0.0;
        }
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    /// Fraction of `other`'s area covered by its intersection with `self`.
    ///
    /// 1.0 means `other` lies entirely inside `self`. Total: returns 0.0
    /// when `other` has zero area.
    pub fn containment_ratio(&self, other: &Self) -> f64 {
        let denom = other.area();
        if denom <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / denom
    }

    /// Intersection area relative to the smaller of the two rects.
    ///
    /// This is the overlap measure the merge stage thresholds on: a small
    /// element half-buried in a large one scores 0.5 regardless of which is
    /// which. Total: returns 0.0 when either rect has zero area.
    pub fn overlap_ratio(&self, other: &Self) -> f64 {
        let denom = self.area().min(other.area());
        if denom <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / denom
    }

    /// Horizontal distance between the rects' nearer vertical edges, 0.0
    /// when their x-ranges overlap.
    pub fn horizontal_gap(&self, other: &Self) -> f64 {
        (self.x1.max(other.x1) - self.x2.min(other.x2)).max(0.0)
    }

    /// Vertical distance between the rects' nearer horizontal edges, 0.0
    /// when their y-ranges overlap.
    pub fn vertical_gap(&self, other: &Self) -> f64 {
        (self.y1.max(other.y1) - self.y2.min(other.y2)).max(0.0)
    }

    /// Overlap of the x-ranges relative to the narrower rect's width.
    ///
    /// Used by caption association: a caption sits below its figure with
    /// their horizontal spans largely shared. Total: 0.0 when either rect
    /// has zero width.
    pub fn horizontal_overlap_ratio(&self, other: &Self) -> f64 {
        let overlap = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let denom = self.width().min(other.width());
        if denom <= 0.0 {
            return 0.0;
        }
        overlap / denom
    }

    /// Smallest rect covering both `self` and `other`.
    ///
    /// Both rects are expected to be in the same coordinate space; the union
    /// takes the larger of the reported page dimensions so a clamped edge is
    /// never produced from two valid inputs.
    pub fn union(&self, other: &Self) -> Result<Self, PageError> {
        Self::new(
            self.x1.min(other.x1),
            self.y1.min(other.y1),
            self.x2.max(other.x2),
            self.y2.max(other.y2),
            self.page_width.max(other.page_width),
            self.page_height.max(other.page_height),
            self.page_number,
        )
    }

    /// Coordinate-wise approximate equality within `eps`, ignoring page
    /// number. Test helper for float round-trips.
    pub fn approx_eq(&self, other: &Self, eps: f64) -> bool {
        (self.x1 - other.x1).abs() <= eps
            && (self.y1 - other.y1).abs() <= eps
            && (self.x2 - other.x2).abs() <= eps
            && (self.y2 - other.y2).abs() <= eps
            && (self.page_width - other.page_width).abs() <= eps
            && (self.page_height - other.page_height).abs() <= eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingRect {
        BoundingRect::new(x1, y1, x2, y2, 1000.0, 1000.0, 1).unwrap()
    }

    #[test]
    fn construction_validates_ordering() {
        assert!(BoundingRect::new(10.0, 0.0, 4.0, 5.0, 100.0, 100.0, 1).is_err());
        assert!(BoundingRect::new(0.0, 10.0, 5.0, 4.0, 100.0, 100.0, 1).is_err());
    }

    #[test]
    fn construction_rejects_non_finite() {
        assert!(BoundingRect::new(f64::NAN, 0.0, 1.0, 1.0, 100.0, 100.0, 1).is_err());
        assert!(BoundingRect::new(0.0, 0.0, f64::INFINITY, 1.0, 100.0, 100.0, 1).is_err());
    }

    #[test]
    fn construction_rejects_bad_page_dims() {
        assert!(BoundingRect::new(0.0, 0.0, 1.0, 1.0, 0.0, 100.0, 1).is_err());
        assert!(BoundingRect::new(0.0, 0.0, 1.0, 1.0, 100.0, -5.0, 1).is_err());
    }

    #[test]
    fn construction_clamps_jitter() {
        let r = BoundingRect::new(-3.0, -1.5, 1005.0, 999.0, 1000.0, 1000.0, 1).unwrap();
        assert_eq!(r.x1, 0.0);
        assert_eq!(r.y1, 0.0);
        assert_eq!(r.x2, 1000.0);
        assert_eq!(r.y2, 999.0);
    }

    #[test]
    fn zero_area_is_valid() {
        let r = rect(10.0, 10.0, 10.0, 50.0);
        assert_eq!(r.area(), 0.0);
        let other = rect(0.0, 0.0, 100.0, 100.0);
        assert_eq!(other.containment_ratio(&r), 0.0);
        assert_eq!(other.overlap_ratio(&r), 0.0);
    }

    #[test]
    fn scale_round_trip() {
        let r = rect(10.0, 20.0, 300.0, 400.0);
        let f = 2.78;
        let back = r.scale(f).unwrap().scale(1.0 / f).unwrap();
        assert!(back.approx_eq(&r, 1e-9), "round trip drifted: {back:?}");
    }

    #[test]
    fn scale_rejects_bad_factor() {
        let r = rect(0.0, 0.0, 10.0, 10.0);
        assert!(r.scale(0.0).is_err());
        assert!(r.scale(-1.0).is_err());
        assert!(r.scale(f64::NAN).is_err());
    }

    #[test]
    fn scale_changes_page_dims() {
        let r = rect(10.0, 10.0, 20.0, 20.0);
        let s = r.scale(2.0).unwrap();
        assert_eq!(s.page_width, 2000.0);
        assert_eq!(s.page_height, 2000.0);
        assert_eq!(s.x2, 40.0);
    }

    #[test]
    fn translate_moves_and_clamps() {
        let r = rect(10.0, 10.0, 20.0, 20.0);
        let t = r.translate(5.0, -15.0).unwrap();
        assert_eq!(t.x1, 15.0);
        assert_eq!(t.y1, 0.0); // clamped
        assert_eq!(t.y2, 5.0);
        assert!(r.translate(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn intersection_and_containment() {
        let outer = rect(0.0, 0.0, 100.0, 100.0);
        let inner = rect(10.0, 10.0, 50.0, 50.0);
        assert_eq!(outer.intersection_area(&inner), 1600.0);
        assert!((outer.containment_ratio(&inner) - 1.0).abs() < 1e-12);
        assert!((inner.containment_ratio(&outer) - 0.16).abs() < 1e-12);
    }

    #[test]
    fn intersection_across_pages_is_zero() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let mut b = rect(0.0, 0.0, 100.0, 100.0);
        b.page_number = 2;
        assert_eq!(a.intersection_area(&b), 0.0);
    }

    #[test]
    fn overlap_ratio_relative_to_smaller() {
        let big = rect(0.0, 0.0, 100.0, 100.0);
        let half_in = rect(80.0, 0.0, 120.0, 100.0); // 40 wide, 20 inside
        assert!((big.overlap_ratio(&half_in) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn gaps() {
        let left = rect(0.0, 0.0, 100.0, 50.0);
        let right = rect(130.0, 0.0, 200.0, 50.0);
        assert_eq!(left.horizontal_gap(&right), 30.0);
        assert_eq!(right.horizontal_gap(&left), 30.0);
        assert_eq!(left.vertical_gap(&right), 0.0);

        let below = rect(0.0, 80.0, 100.0, 120.0);
        assert_eq!(left.vertical_gap(&below), 30.0);
    }

    #[test]
    fn horizontal_overlap_ratio_of_narrower() {
        let wide = rect(0.0, 0.0, 200.0, 10.0);
        let narrow = rect(150.0, 50.0, 250.0, 60.0); // 100 wide, 50 shared
        assert!((wide.horizontal_overlap_ratio(&narrow) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn union_covers_both() {
        let a = rect(10.0, 10.0, 50.0, 50.0);
        let b = rect(40.0, 5.0, 90.0, 45.0);
        let u = a.union(&b).unwrap();
        assert_eq!((u.x1, u.y1, u.x2, u.y2), (10.0, 5.0, 90.0, 50.0));
    }
}
