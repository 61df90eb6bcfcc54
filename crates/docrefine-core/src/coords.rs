//! Coordinate conversion between document units and page-raster pixels.
//!
//! The conversion stage emits bounding boxes in document units under one of
//! five origin conventions; the recognizers consume and produce pixel-space
//! boxes on the rendered page raster. Everything in this module is pure
//! geometry with no clamping: cropping clamps at the call site.

use crate::document::{BoundingBox, CoordOrigin};

/// Inset applied to each edge of a remapped table cell, in document units.
///
/// Structural predictions include the drawn cell border; shrinking the box
/// strips border artifacts before the cell region is re-recognized. Tuned
/// empirically against the upstream table-structure model.
pub const CELL_BORDER_MARGIN: f64 = 4.0;

/// Axis-aligned box in page-raster pixel space.
///
/// Edges are signed: boxes produced by [`to_pixel_bbox`] are unclamped and
/// may extend past the raster until the caller crops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelBox {
    /// Left edge.
    pub x1: i64,
    /// Top edge.
    pub y1: i64,
    /// Right edge.
    pub x2: i64,
    /// Bottom edge.
    pub y2: i64,
}

impl PixelBox {
    /// Creates a new pixel box.
    #[inline]
    #[must_use = "creates a new PixelBox"]
    pub const fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Signed area; non-positive for degenerate or inverted boxes.
    #[inline]
    #[must_use = "area is computed but not used"]
    pub const fn area(&self) -> i64 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// This box intersected with the raster bounds `[0, w) × [0, h)`.
    #[must_use = "returns the clamped box"]
    pub fn clamped(&self, img_w: u32, img_h: u32) -> Self {
        Self {
            x1: self.x1.clamp(0, i64::from(img_w)),
            y1: self.y1.clamp(0, i64::from(img_h)),
            x2: self.x2.clamp(0, i64::from(img_w)),
            y2: self.y2.clamp(0, i64::from(img_h)),
        }
    }

    /// Whether the box encloses no pixels.
    #[inline]
    #[must_use = "emptiness check result is returned but not used"]
    pub const fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }
}

/// Convert a document-space bounding box to raster pixel space.
///
/// `pdf_w`/`pdf_h` are the physical page dimensions in document units;
/// `img_w`/`img_h` the raster dimensions in pixels. The box's own
/// `coord_origin` selects the axis mapping:
///
/// - left origins (top-left, bottom-left, center) map `l`/`r` directly;
///   right origins mirror them across the page width;
/// - top origins map `t`/`b` directly; bottom origins mirror them across
///   the page height; a center origin measures both y edges from the page
///   midline and shifts by half the raster height.
///
/// Results are truncated to integers. No bounds clamping happens here.
// Truncation is the contract: the original conversion truncates rather
// than rounds, and cell matching depends on reproducing it exactly.
#[allow(clippy::cast_possible_truncation)]
#[must_use = "returns the converted pixel box"]
pub fn to_pixel_bbox(
    bbox: &BoundingBox,
    pdf_w: f64,
    pdf_h: f64,
    img_w: u32,
    img_h: u32,
) -> PixelBox {
    let (img_wf, img_hf) = (f64::from(img_w), f64::from(img_h));

    let (x1, x2) = match bbox.coord_origin {
        CoordOrigin::Topleft | CoordOrigin::Bottomleft | CoordOrigin::Center => (
            bbox.l / pdf_w * img_wf,
            bbox.r / pdf_w * img_wf,
        ),
        CoordOrigin::Topright | CoordOrigin::Bottomright => (
            (pdf_w - bbox.r) / pdf_w * img_wf,
            (pdf_w - bbox.l) / pdf_w * img_wf,
        ),
    };

    let (y1, y2) = match bbox.coord_origin {
        CoordOrigin::Topleft | CoordOrigin::Topright => (
            bbox.t / pdf_h * img_hf,
            bbox.b / pdf_h * img_hf,
        ),
        CoordOrigin::Bottomleft | CoordOrigin::Bottomright => (
            (pdf_h - bbox.t) / pdf_h * img_hf,
            (pdf_h - bbox.b) / pdf_h * img_hf,
        ),
        CoordOrigin::Center => {
            let cy = pdf_h / 2.0;
            (
                (cy - bbox.t) / pdf_h * img_hf + img_hf / 2.0,
                (cy - bbox.b) / pdf_h * img_hf + img_hf / 2.0,
            )
        }
    };

    PixelBox::new(x1 as i64, y1 as i64, x2 as i64, y2 as i64)
}

/// Fraction of `a` covered by `b`, in `[0, 1]`.
///
/// Asymmetric on purpose: this answers "how much of this text box sits
/// inside that occlusion box", so the intersection is normalized by the
/// area of `a` alone, not by a symmetric union. Returns `0.0` when `a`
/// has no area or the boxes are disjoint.
// Precision loss acceptable: pixel areas are far below 2^52.
#[allow(clippy::cast_precision_loss)]
#[must_use = "overlap ratio is computed but not used"]
pub fn overlap_ratio(a: &PixelBox, b: &PixelBox) -> f64 {
    let xa = a.x1.max(b.x1);
    let ya = a.y1.max(b.y1);
    let xb = a.x2.min(b.x2);
    let yb = a.y2.min(b.y2);

    let intersection = (xb - xa).max(0) * (yb - ya).max(0);
    let area_a = a.area();
    if area_a > 0 {
        intersection as f64 / area_a as f64
    } else {
        0.0
    }
}

/// Map a table-relative cell prediction back into document units.
///
/// `cell_px` is the predicted cell box in the cropped table image's pixel
/// space; `table_px` is the table's own box in full-page pixel space. The
/// cell is offset by the table's top-left pixel corner, inverse-mapped to
/// document units with the top-left pixel formula, then inset by
/// [`CELL_BORDER_MARGIN`] on every edge. The result always carries a
/// top-left origin: predictions originate in pixel space, which is
/// inherently top-left, regardless of the page's native convention.
#[must_use = "returns the remapped document-space box"]
pub fn pixel_cell_to_doc_bbox(
    cell_px: &PixelBox,
    table_px: &PixelBox,
    img_w: u32,
    img_h: u32,
    pdf_w: f64,
    pdf_h: f64,
) -> BoundingBox {
    // Precision loss acceptable: pixel coordinates are small integers.
    #[allow(clippy::cast_precision_loss)]
    let (full_x1, full_y1, full_x2, full_y2) = (
        (table_px.x1 + cell_px.x1) as f64,
        (table_px.y1 + cell_px.y1) as f64,
        (table_px.x1 + cell_px.x2) as f64,
        (table_px.y1 + cell_px.y2) as f64,
    );

    let l = full_x1 / f64::from(img_w) * pdf_w + CELL_BORDER_MARGIN;
    let t = full_y1 / f64::from(img_h) * pdf_h + CELL_BORDER_MARGIN;
    let r = full_x2 / f64::from(img_w) * pdf_w - CELL_BORDER_MARGIN;
    let b = full_y2 / f64::from(img_h) * pdf_h - CELL_BORDER_MARGIN;

    BoundingBox::new(l, t, r, b, CoordOrigin::Topleft)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn bbox(l: f64, t: f64, r: f64, b: f64, origin: CoordOrigin) -> BoundingBox {
        BoundingBox::new(l, t, r, b, origin)
    }

    #[test]
    fn topleft_same_scale_is_identity() {
        let input = bbox(12.0, 34.0, 56.0, 78.0, CoordOrigin::Topleft);
        let px = to_pixel_bbox(&input, 100.0, 200.0, 100, 200);
        assert_eq!(px, PixelBox::new(12, 34, 56, 78));
    }

    #[test]
    fn topright_mirrors_x_axis() {
        let input = bbox(0.0, 0.0, 100.0, 50.0, CoordOrigin::Topright);
        let px = to_pixel_bbox(&input, 200.0, 100.0, 200, 100);
        assert_eq!(px, PixelBox::new(100, 0, 200, 50));
    }

    #[rstest]
    #[case(CoordOrigin::Bottomleft, PixelBox::new(10, 180, 30, 160))]
    #[case(CoordOrigin::Bottomright, PixelBox::new(70, 180, 90, 160))]
    fn bottom_origins_flip_y(#[case] origin: CoordOrigin, #[case] expected: PixelBox) {
        // 100x200 page rendered 1:1; box l=10 t=20 r=30 b=40.
        let input = bbox(10.0, 20.0, 30.0, 40.0, origin);
        let px = to_pixel_bbox(&input, 100.0, 200.0, 100, 200);
        assert_eq!(px, expected);
    }

    #[test]
    fn center_origin_measures_from_midline() {
        // Page 100x100 rendered 1:1. A box from t=10 to b=-10 around the
        // midline lands centered on the raster: y1 = (50-10)/100*100+50.
        let input = bbox(-20.0, 10.0, 20.0, -10.0, CoordOrigin::Center);
        let px = to_pixel_bbox(&input, 100.0, 100.0, 100, 100);
        assert_eq!(px.y1, 90);
        assert_eq!(px.y2, 110);
    }

    #[test]
    fn scaling_applies_before_truncation() {
        let input = bbox(1.0, 1.0, 2.0, 2.0, CoordOrigin::Topleft);
        let px = to_pixel_bbox(&input, 3.0, 3.0, 100, 100);
        // 1/3*100 = 33.33 truncates to 33, 2/3*100 = 66.66 truncates to 66.
        assert_eq!(px, PixelBox::new(33, 33, 66, 66));
    }

    #[test]
    fn overlap_is_asymmetric() {
        let small = PixelBox::new(0, 0, 10, 10);
        let large = PixelBox::new(0, 0, 100, 100);
        assert!((overlap_ratio(&small, &large) - 1.0).abs() < f64::EPSILON);
        assert!((overlap_ratio(&large, &small) - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn overlap_of_identical_box_is_one() {
        let b = PixelBox::new(5, 5, 25, 45);
        assert!((overlap_ratio(&b, &b) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overlap_of_disjoint_boxes_is_zero() {
        let a = PixelBox::new(0, 0, 10, 10);
        let b = PixelBox::new(20, 20, 30, 30);
        assert_eq!(overlap_ratio(&a, &b), 0.0);
        assert_eq!(overlap_ratio(&b, &a), 0.0);
    }

    #[test]
    fn overlap_with_zero_area_first_argument_is_zero() {
        let degenerate = PixelBox::new(10, 10, 10, 20);
        let b = PixelBox::new(0, 0, 100, 100);
        assert_eq!(overlap_ratio(&degenerate, &b), 0.0);
    }

    #[test]
    fn cell_remap_offsets_and_insets() {
        // Table at (100, 50) in a 1000x500 raster of a 1000x500 page, so
        // pixel units equal document units and the margin is visible raw.
        let cell = PixelBox::new(10, 20, 110, 70);
        let table = PixelBox::new(100, 50, 400, 300);
        let doc = pixel_cell_to_doc_bbox(&cell, &table, 1000, 500, 1000.0, 500.0);
        assert!((doc.l - 114.0).abs() < f64::EPSILON);
        assert!((doc.t - 74.0).abs() < f64::EPSILON);
        assert!((doc.r - 206.0).abs() < f64::EPSILON);
        assert!((doc.b - 116.0).abs() < f64::EPSILON);
        assert_eq!(doc.coord_origin, CoordOrigin::Topleft);
    }

    #[rstest]
    #[case(CoordOrigin::Bottomleft)]
    #[case(CoordOrigin::Topright)]
    #[case(CoordOrigin::Center)]
    fn cell_remap_always_returns_topleft(#[case] _page_origin: CoordOrigin) {
        // The page's native origin never reaches the remap: predictions
        // come from pixel space and are written back top-left.
        let cell = PixelBox::new(0, 0, 50, 50);
        let table = PixelBox::new(0, 0, 200, 200);
        let doc = pixel_cell_to_doc_bbox(&cell, &table, 400, 400, 612.0, 792.0);
        assert_eq!(doc.coord_origin, CoordOrigin::Topleft);
    }

    #[test]
    fn clamped_restricts_to_raster() {
        let b = PixelBox::new(-10, -5, 150, 90);
        assert_eq!(b.clamped(100, 80), PixelBox::new(0, 0, 100, 80));
    }
}
