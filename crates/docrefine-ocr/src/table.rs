//! Table structure prediction: DETR-style row/column decoding.
//!
//! The table model answers object-detection queries over a cropped table
//! image; labels distinguish rows, columns, headers, and spanning cells.
//! The cell grid the orchestrator consumes is reconstructed from the
//! detected row and column bands: cell `(r, c)` is the intersection of
//! the r-th row band with the c-th column band, in the crop's pixel
//! space.

use docrefine_core::{PixelBox, PredictedCell, RefineError, Result};
use image::{imageops::FilterType, DynamicImage, GrayImage};
use ndarray::Array3;
use ort::session::Session;

/// Square input size the table model expects.
const TABLE_INPUT_SIZE: u32 = 800;
/// Normalization, per channel: (pixel/255 - mean) / std.
const TABLE_NORM_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const TABLE_NORM_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Minimum class confidence for a detection to survive.
const MIN_DETECTION_CONFIDENCE: f32 = 0.5;
/// IoU above which two same-label detections are duplicates.
const NMS_IOU_THRESHOLD: f32 = 0.5;

/// IoU threshold for suppressing overlapping *row* bands.
///
/// Rows can be tightly packed; a higher threshold avoids suppressing
/// distinct adjacent rows when a cell holds two stacked text lines.
const ROW_BAND_MERGE_IOU: f32 = 0.6;

/// IoU threshold for suppressing overlapping *column* bands.
///
/// Columns separate more cleanly; a lower threshold removes duplicate
/// detections without collapsing true distinct columns.
const COL_BAND_MERGE_IOU: f32 = 0.3;

/// Model class indices.
const LABEL_COLUMN: usize = 1;
const LABEL_ROW: usize = 2;
const LABEL_NO_OBJECT: usize = 6;

/// One decoded query: class, confidence, and a normalized
/// center-size box `[cx, cy, w, h]` in `[0, 1]`.
#[derive(Debug, Clone, Copy)]
struct Detection {
    label: usize,
    score: f32,
    bbox: [f32; 4],
}

/// A detected row or column band: normalized `[start, end]` interval on
/// its axis, with the detection's confidence for suppression ordering.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    start: f32,
    end: f32,
    score: f32,
}

/// Predict the cell grid of a cropped table image.
///
/// # Errors
///
/// Returns [`RefineError::Inference`] when the session run fails.
pub(crate) fn predict_cells(session: &mut Session, table: &GrayImage) -> Result<Vec<PredictedCell>> {
    let (crop_w, crop_h) = table.dimensions();
    if crop_w == 0 || crop_h == 0 {
        return Ok(Vec::new());
    }

    let detections = run_detr(session, table)?;
    let cells = grid_from_detections(&detections, crop_w, crop_h);
    log::debug!(
        "table structure: {} detections -> {} grid cells",
        detections.len(),
        cells.len()
    );
    Ok(cells)
}

/// Preprocess, run the session, and decode raw detections.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn run_detr(session: &mut Session, table: &GrayImage) -> Result<Vec<Detection>> {
    let rgb = DynamicImage::ImageLuma8(table.clone()).to_rgb8();
    let resized = image::imageops::resize(
        &rgb,
        TABLE_INPUT_SIZE,
        TABLE_INPUT_SIZE,
        FilterType::CatmullRom,
    );

    let side = TABLE_INPUT_SIZE as usize;
    let mut input = Array3::<f32>::zeros((3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            input[[c, y as usize, x as usize]] =
                (f32::from(pixel[c]) / 255.0 - TABLE_NORM_MEAN[c]) / TABLE_NORM_STD[c];
        }
    }
    let input = input.insert_axis(ndarray::Axis(0));

    let shape = input.shape().to_vec();
    let data = input
        .as_slice()
        .ok_or_else(|| RefineError::Inference("table input not contiguous".to_string()))?;
    let value = ort::value::Value::from_array((shape.as_slice(), data.to_vec()))
        .map_err(|e| RefineError::Inference(e.to_string()))?;

    let outputs = session
        .run(ort::inputs![value])
        .map_err(|e| RefineError::Inference(format!("table structure run failed: {e}")))?;

    // logits: [1, num_queries, num_classes]; boxes: [1, num_queries, 4].
    let (logits_shape, logits_data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| RefineError::Inference(e.to_string()))?;
    let (_, boxes_data) = outputs[1]
        .try_extract_tensor::<f32>()
        .map_err(|e| RefineError::Inference(e.to_string()))?;

    let num_queries = logits_shape[1] as usize;
    let num_classes = logits_shape[2] as usize;

    let mut detections = Vec::new();
    for query in 0..num_queries {
        let logits = &logits_data[query * num_classes..(query + 1) * num_classes];
        let (label, score) = softmax_argmax(logits);

        if label == LABEL_NO_OBJECT || score < MIN_DETECTION_CONFIDENCE {
            continue;
        }

        let base = query * 4;
        detections.push(Detection {
            label,
            score,
            bbox: [
                boxes_data[base],
                boxes_data[base + 1],
                boxes_data[base + 2],
                boxes_data[base + 3],
            ],
        });
    }

    Ok(nms(detections))
}

/// Softmax over one query's logits, returning the argmax class and its
/// probability.
fn softmax_argmax(logits: &[f32]) -> (usize, f32) {
    let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp_sum: f32 = logits.iter().map(|&l| (l - max_logit).exp()).sum();

    let (label, best) = logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .unwrap_or((LABEL_NO_OBJECT, &f32::NEG_INFINITY));

    (label, (best - max_logit).exp() / exp_sum)
}

/// Per-label non-maximum suppression on center-size boxes.
fn nms(mut detections: Vec<Detection>) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep = vec![true; detections.len()];
    for i in 0..detections.len() {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..detections.len() {
            if keep[j]
                && detections[i].label == detections[j].label
                && box_iou(&detections[i].bbox, &detections[j].bbox) > NMS_IOU_THRESHOLD
            {
                keep[j] = false;
            }
        }
    }

    detections
        .into_iter()
        .zip(keep)
        .filter_map(|(d, k)| k.then_some(d))
        .collect()
}

/// IoU of two center-size boxes.
fn box_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let (al, at, ar, ab) = corners(a);
    let (bl, bt, br, bb) = corners(b);

    let iw = (ar.min(br) - al.max(bl)).max(0.0);
    let ih = (ab.min(bb) - at.max(bt)).max(0.0);
    let intersection = iw * ih;

    let union = (ar - al) * (ab - at) + (br - bl) * (bb - bt) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

const fn corners(b: &[f32; 4]) -> (f32, f32, f32, f32) {
    (
        b[0] - b[2] / 2.0,
        b[1] - b[3] / 2.0,
        b[0] + b[2] / 2.0,
        b[1] + b[3] / 2.0,
    )
}

/// Build the `(row, col)` cell grid from detected row/column bands.
#[allow(clippy::cast_possible_truncation)]
fn grid_from_detections(detections: &[Detection], crop_w: u32, crop_h: u32) -> Vec<PredictedCell> {
    let rows = merge_bands(
        detections
            .iter()
            .filter(|d| d.label == LABEL_ROW)
            .map(|d| Band {
                start: d.bbox[1] - d.bbox[3] / 2.0,
                end: d.bbox[1] + d.bbox[3] / 2.0,
                score: d.score,
            })
            .collect(),
        ROW_BAND_MERGE_IOU,
    );
    let cols = merge_bands(
        detections
            .iter()
            .filter(|d| d.label == LABEL_COLUMN)
            .map(|d| Band {
                start: d.bbox[0] - d.bbox[2] / 2.0,
                end: d.bbox[0] + d.bbox[2] / 2.0,
                score: d.score,
            })
            .collect(),
        COL_BAND_MERGE_IOU,
    );

    let (crop_wf, crop_hf) = (f64::from(crop_w), f64::from(crop_h));
    let mut cells = Vec::with_capacity(rows.len() * cols.len());
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, col) in cols.iter().enumerate() {
            cells.push(PredictedCell {
                row: row_idx as u32,
                col: col_idx as u32,
                bbox: PixelBox::new(
                    (f64::from(col.start.max(0.0)) * crop_wf) as i64,
                    (f64::from(row.start.max(0.0)) * crop_hf) as i64,
                    (f64::from(col.end.min(1.0)) * crop_wf) as i64,
                    (f64::from(row.end.min(1.0)) * crop_hf) as i64,
                ),
            });
        }
    }
    cells
}

/// 1D non-maximum suppression over bands, then sort by position.
///
/// The model frequently reports the same row or column twice; suppression
/// keeps the higher-confidence band of any overlapping pair.
fn merge_bands(mut bands: Vec<Band>, iou_threshold: f32) -> Vec<Band> {
    bands.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Band> = Vec::with_capacity(bands.len());
    for band in bands {
        let duplicate = kept
            .iter()
            .any(|k| interval_iou(k, &band) > iou_threshold);
        if !duplicate {
            kept.push(band);
        }
    }

    kept.sort_by(|a, b| a.start.total_cmp(&b.start));
    kept
}

fn interval_iou(a: &Band, b: &Band) -> f32 {
    let intersection = (a.end.min(b.end) - a.start.max(b.start)).max(0.0);
    let union = (a.end - a.start) + (b.end - b.start) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
