//! Page raster handling: embedded-image decode and region preparation.
//!
//! Pages arrive with their rendered raster embedded as a `data:` URI. The
//! enhancement pass decodes that once per page, converts to grayscale for
//! the recognizers, and prepares padded region crops for re-recognition.

use crate::coords::PixelBox;
use crate::error::{RefineError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{imageops, DynamicImage, GrayImage, Luma};

/// Padding added around a region crop before recognition, in pixels.
///
/// Tight crops starve the recognizer of context; a few pixels of slack
/// measurably improves accuracy. Tuned, not derived.
pub const REGION_PAD_PX: i64 = 5;

/// Canvas scale factor for the recognition background.
///
/// The padded crop is centered on a blank canvas this many times its own
/// width and height — recognition models are trained on larger receptive
/// fields than a tight crop provides.
pub const CANVAS_SCALE: u32 = 2;

/// Decode an embedded page image from its `data:` URI.
///
/// The URI is a self-describing header segment followed by a comma and a
/// base64 payload (`data:image/png;base64,...`).
///
/// # Errors
///
/// Returns [`RefineError::DataUri`] when the URI is not a `data:` URI or
/// the payload is not valid base64, and [`RefineError::ImageDecode`] when
/// the decoded bytes are not a decodable image.
pub fn decode_data_uri(uri: &str) -> Result<DynamicImage> {
    if !uri.starts_with("data:") {
        return Err(RefineError::DataUri(format!(
            "not a data URI: {}",
            truncate_for_log(uri)
        )));
    }

    let (_, payload) = uri
        .split_once(',')
        .ok_or_else(|| RefineError::DataUri("missing payload separator".to_string()))?;

    let bytes = BASE64
        .decode(payload)
        .map_err(|e| RefineError::DataUri(format!("invalid base64 payload: {e}")))?;

    Ok(image::load_from_memory(&bytes)?)
}

/// Convert a decoded page image to the single-channel form the
/// recognizers consume.
#[inline]
#[must_use = "returns the grayscale raster"]
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Prepare a region of the page raster for recognition.
///
/// Expands the region by [`REGION_PAD_PX`] on each side, clamped to the
/// raster bounds, crops it, and centers the crop on a white canvas
/// [`CANVAS_SCALE`]× the crop in each dimension. Returns `None` when the
/// region collapses to nothing inside the raster.
#[must_use = "returns the padded region crop"]
pub fn padded_region(page: &GrayImage, region: &PixelBox) -> Option<GrayImage> {
    let (img_w, img_h) = page.dimensions();

    let padded = PixelBox::new(
        region.x1 - REGION_PAD_PX,
        region.y1 - REGION_PAD_PX,
        region.x2 + REGION_PAD_PX,
        region.y2 + REGION_PAD_PX,
    )
    .clamped(img_w, img_h);

    if padded.is_empty() {
        return None;
    }

    // Clamping guarantees non-negative coordinates within u32 range.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let crop = imageops::crop_imm(
        page,
        padded.x1 as u32,
        padded.y1 as u32,
        (padded.x2 - padded.x1) as u32,
        (padded.y2 - padded.y1) as u32,
    )
    .to_image();

    let (crop_w, crop_h) = crop.dimensions();
    let mut canvas = GrayImage::from_pixel(crop_w * CANVAS_SCALE, crop_h * CANVAS_SCALE, Luma([255]));
    let paste_x = i64::from((canvas.width() - crop_w) / 2);
    let paste_y = i64::from((canvas.height() - crop_h) / 2);
    imageops::replace(&mut canvas, &crop, paste_x, paste_y);

    Some(canvas)
}

/// Crop a raw (unpadded) region, clamped to the raster bounds.
///
/// Used for table crops handed to structure recognition, where the
/// model expects the table borders to reach the image edge.
#[must_use = "returns the clamped region crop"]
pub fn crop_region(page: &GrayImage, region: &PixelBox) -> Option<GrayImage> {
    let (img_w, img_h) = page.dimensions();
    let clamped = region.clamped(img_w, img_h);
    if clamped.is_empty() {
        return None;
    }

    // Clamping guarantees non-negative coordinates within u32 range.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    Some(
        imageops::crop_imm(
            page,
            clamped.x1 as u32,
            clamped.y1 as u32,
            (clamped.x2 - clamped.x1) as u32,
            (clamped.y2 - clamped.y1) as u32,
        )
        .to_image(),
    )
}

fn truncate_for_log(uri: &str) -> &str {
    let end = uri
        .char_indices()
        .nth(32)
        .map_or(uri.len(), |(idx, _)| idx);
    &uri[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn page(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([128]))
    }

    fn data_uri_of(image: &GrayImage) -> String {
        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(image.clone())
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", BASE64.encode(&bytes))
    }

    #[test]
    fn data_uri_roundtrip() {
        let original = page(40, 30);
        let decoded = decode_data_uri(&data_uri_of(&original)).unwrap();
        assert_eq!(decoded.to_luma8().dimensions(), (40, 30));
    }

    #[test]
    fn non_data_uri_is_rejected() {
        assert!(decode_data_uri("https://example.com/page.png").is_err());
        assert!(decode_data_uri("data:image/png;base64").is_err());
        assert!(decode_data_uri("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn padded_region_is_scaled_canvas() {
        let img = page(200, 100);
        let region = PixelBox::new(50, 40, 90, 60);
        let result = padded_region(&img, &region).unwrap();
        // Crop grows by 5 px per side: 50x30, canvas doubles it.
        assert_eq!(result.dimensions(), (100, 60));
    }

    #[test]
    fn padded_region_clamps_at_raster_edge() {
        let img = page(100, 100);
        let region = PixelBox::new(-3, 0, 20, 10);
        let result = padded_region(&img, &region).unwrap();
        // Left/top clamp to 0, so the crop is 25x15.
        assert_eq!(result.dimensions(), (50, 30));
    }

    #[test]
    fn padded_crop_is_centered_on_white() {
        let img = page(100, 100);
        let region = PixelBox::new(40, 40, 60, 60);
        let canvas = padded_region(&img, &region).unwrap();
        let (w, h) = canvas.dimensions();
        // Corners are canvas background, the center is page content.
        assert_eq!(canvas.get_pixel(0, 0).0[0], 255);
        assert_eq!(canvas.get_pixel(w - 1, h - 1).0[0], 255);
        assert_eq!(canvas.get_pixel(w / 2, h / 2).0[0], 128);
    }

    #[test]
    fn degenerate_region_yields_none() {
        let img = page(100, 100);
        assert!(padded_region(&img, &PixelBox::new(300, 300, 320, 320)).is_none());
        assert!(crop_region(&img, &PixelBox::new(50, 50, 50, 80)).is_none());
    }

    #[test]
    fn crop_region_has_no_padding() {
        let img = page(100, 100);
        let crop = crop_region(&img, &PixelBox::new(10, 20, 50, 70)).unwrap();
        assert_eq!(crop.dimensions(), (40, 50));
    }
}
