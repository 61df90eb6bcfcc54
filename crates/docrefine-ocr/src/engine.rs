//! ONNX recognition engine: text detection + CTC recognition sessions.

use docrefine_core::{PixelBox, RecognizedLine, RefineError, Result};
use image::{imageops::FilterType, DynamicImage, GrayImage, Luma, RgbImage};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use ndarray::{Array3, Array4};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::io::BufRead;
use std::path::Path;

/// Detection model file name inside the assets directory.
const DET_MODEL: &str = "text_det.onnx";
/// General recognition model and its character dictionary.
const REC_MODEL: &str = "text_rec.onnx";
const REC_CHARSET: &str = "text_rec_charset.txt";
/// Formula-tuned recognition model (optional).
const FORMULA_MODEL: &str = "formula_rec.onnx";
const FORMULA_CHARSET: &str = "formula_rec_charset.txt";
/// Table structure model (optional).
const TABLE_MODEL: &str = "table_structure.onnx";

/// Probability threshold binarizing the detection map.
const DET_PROB_THRESHOLD: f32 = 0.3;
/// Longest side the detection input is capped to.
const DET_MAX_SIDE: f32 = 960.0;
/// Contours with a shorter side than this are detection noise.
const DET_MIN_BOX_SIDE: f32 = 3.0;
/// Detection normalization, per channel: (pixel/255 - mean) / std.
const DET_NORM_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const DET_NORM_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Fixed input height of the recognition models.
const REC_HEIGHT: u32 = 48;
/// Cap on the dynamic recognition input width.
const REC_MAX_WIDTH: u32 = 1024;

/// Inference device for session construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// CUDA execution provider, with in-session CPU fallback.
    Cuda,
    /// CPU execution provider only.
    Cpu,
}

impl std::fmt::Display for Device {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Cpu => write!(f, "cpu"),
        }
    }
}

/// Loaded recognition sessions plus their character dictionaries.
pub struct RecognitionEngine {
    det: Session,
    rec: Session,
    rec_charset: Vec<String>,
    formula: Option<(Session, Vec<String>)>,
    table: Option<Session>,
}

impl std::fmt::Debug for RecognitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognitionEngine")
            .field("charset_len", &self.rec_charset.len())
            .field("formula", &self.formula.is_some())
            .field("table", &self.table.is_some())
            .finish()
    }
}

impl RecognitionEngine {
    /// Load all models found in `assets_dir` on the given device.
    ///
    /// Detection and general recognition are required; the formula and
    /// table models are optional and their absence only narrows
    /// capability (math mode falls back to the general recognizer, table
    /// structure returns no predictions).
    ///
    /// # Errors
    ///
    /// Returns [`RefineError::ModelLoad`] when a required model file is
    /// missing or a session fails to build.
    pub fn load(assets_dir: &Path, device: Device) -> Result<Self> {
        let det_path = assets_dir.join(DET_MODEL);
        let rec_path = assets_dir.join(REC_MODEL);
        let charset_path = assets_dir.join(REC_CHARSET);

        for (path, name) in [
            (&det_path, DET_MODEL),
            (&rec_path, REC_MODEL),
            (&charset_path, REC_CHARSET),
        ] {
            if !path.exists() {
                return Err(RefineError::ModelLoad {
                    model: name.to_string(),
                    reason: format!("file not found: {}", path.display()),
                });
            }
        }

        let det = build_session(&det_path, device, DET_MODEL)?;
        let rec = build_session(&rec_path, device, REC_MODEL)?;
        let rec_charset = load_charset(&charset_path)?;

        let formula_path = assets_dir.join(FORMULA_MODEL);
        let formula_charset_path = assets_dir.join(FORMULA_CHARSET);
        let formula = if formula_path.exists() && formula_charset_path.exists() {
            Some((
                build_session(&formula_path, device, FORMULA_MODEL)?,
                load_charset(&formula_charset_path)?,
            ))
        } else {
            log::debug!("no formula model in assets, math mode uses the general recognizer");
            None
        };

        let table_path = assets_dir.join(TABLE_MODEL);
        let table = if table_path.exists() {
            Some(build_session(&table_path, device, TABLE_MODEL)?)
        } else {
            log::debug!("no table structure model in assets");
            None
        };

        log::info!(
            "recognition models loaded on {device} (formula: {}, table: {})",
            formula.is_some(),
            table.is_some()
        );

        Ok(Self {
            det,
            rec,
            rec_charset,
            formula,
            table,
        })
    }

    /// Recognize text lines in a prepared region crop.
    ///
    /// Detects line boxes first, then reads each one. Returns an empty
    /// vector when nothing is detected.
    ///
    /// # Errors
    ///
    /// Returns [`RefineError::Inference`] when a session run fails.
    pub fn recognize_region(
        &mut self,
        region: &GrayImage,
        math_mode: bool,
    ) -> Result<Vec<RecognizedLine>> {
        let rgb = DynamicImage::ImageLuma8(region.clone()).to_rgb8();

        let line_boxes = detect_lines(&mut self.det, &rgb)?;
        if line_boxes.is_empty() {
            return Ok(Vec::new());
        }

        let (session, charset) = match (math_mode, self.formula.as_mut()) {
            (true, Some((session, charset))) => (session, &*charset),
            _ => (&mut self.rec, &self.rec_charset),
        };

        let mut lines = Vec::with_capacity(line_boxes.len());
        for line_box in &line_boxes {
            // Line boxes come from the detector, already inside bounds.
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let crop = image::imageops::crop_imm(
                &rgb,
                line_box.x1.max(0) as u32,
                line_box.y1.max(0) as u32,
                (line_box.x2 - line_box.x1).max(1) as u32,
                (line_box.y2 - line_box.y1).max(1) as u32,
            )
            .to_image();

            if let Some(line) = recognize_line(session, charset, &crop)? {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// Infer the cell grid of a cropped table image.
    ///
    /// Returns an empty vector when no table model is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`RefineError::Inference`] when the session run fails.
    pub fn table_structure(
        &mut self,
        table: &GrayImage,
    ) -> Result<Vec<docrefine_core::PredictedCell>> {
        match self.table.as_mut() {
            Some(session) => crate::table::predict_cells(session, table),
            None => Ok(Vec::new()),
        }
    }
}

/// Build one ONNX session on the requested device.
fn build_session(path: &Path, device: Device, model: &str) -> Result<Session> {
    let threads = std::thread::available_parallelism()
        .map(|p| p.get() / 2)
        .unwrap_or(4)
        .clamp(1, 8);

    let model_err = |e: ort::Error| RefineError::ModelLoad {
        model: model.to_string(),
        reason: e.to_string(),
    };

    let builder = Session::builder()
        .map_err(model_err)?
        .with_optimization_level(GraphOptimizationLevel::Level1)
        .map_err(model_err)?
        .with_intra_threads(threads)
        .map_err(model_err)?;

    let session = match device {
        Device::Cpu => builder.commit_from_file(path).map_err(model_err)?,
        Device::Cuda => builder
            .with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ])
            .map_err(model_err)?
            .commit_from_file(path)
            .map_err(model_err)?,
    };

    log::debug!("loaded {model} on {device} ({threads} threads)");
    Ok(session)
}

/// Load a CTC character dictionary: blank token, one character per line,
/// trailing space token.
fn load_charset(path: &Path) -> Result<Vec<String>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);

    let mut characters = vec!["blank".to_string()];
    for line in reader.lines() {
        let line = line?;
        let ch = line.trim_end_matches(['\r', '\n']).to_string();
        if !ch.is_empty() {
            characters.push(ch);
        }
    }
    characters.push(" ".to_string());
    Ok(characters)
}

/// Run detection over a region crop and return line boxes in the crop's
/// pixel space, sorted in reading order.
// Dimensions stay far below f32's exact integer range; truncation back to
// pixel indices is intended.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn detect_lines(det: &mut Session, rgb: &RgbImage) -> Result<Vec<PixelBox>> {
    let (orig_w, orig_h) = rgb.dimensions();
    let (orig_wf, orig_hf) = (orig_w as f32, orig_h as f32);

    let ratio = if orig_wf.max(orig_hf) > DET_MAX_SIDE {
        DET_MAX_SIDE / orig_wf.max(orig_hf)
    } else {
        1.0
    };
    let resize_w = (((orig_wf * ratio / 32.0).round() as u32) * 32).max(32);
    let resize_h = (((orig_hf * ratio / 32.0).round() as u32) * 32).max(32);

    let resized = image::imageops::resize(rgb, resize_w, resize_h, FilterType::CatmullRom);

    let mut input = Array3::<f32>::zeros((3, resize_h as usize, resize_w as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            input[[c, y as usize, x as usize]] =
                (f32::from(pixel[c]) / 255.0 - DET_NORM_MEAN[c]) / DET_NORM_STD[c];
        }
    }
    let input = input.insert_axis(ndarray::Axis(0));

    let (map_h, map_w, prob_map) = run_to_map(det, &input)?;

    // Binarize and thicken the probability map before tracing contours.
    let mut mask = GrayImage::new(map_w, map_h);
    for y in 0..map_h {
        for x in 0..map_w {
            let value = prob_map[(y * map_w + x) as usize];
            mask.put_pixel(x, y, Luma([if value > DET_PROB_THRESHOLD { 255 } else { 0 }]));
        }
    }
    let mask = dilate(&mask, Norm::L1, 1);

    let mut boxes = Vec::new();
    for contour in find_contours::<u32>(&mask) {
        if contour.points.is_empty() {
            continue;
        }
        let min_x = contour.points.iter().map(|p| p.x).min().unwrap_or(0) as f32;
        let max_x = contour.points.iter().map(|p| p.x).max().unwrap_or(0) as f32;
        let min_y = contour.points.iter().map(|p| p.y).min().unwrap_or(0) as f32;
        let max_y = contour.points.iter().map(|p| p.y).max().unwrap_or(0) as f32;

        if (max_x - min_x).min(max_y - min_y) < DET_MIN_BOX_SIDE {
            continue;
        }

        // Scale from map space back to the crop's pixel space.
        let scale_x = orig_wf / map_w as f32;
        let scale_y = orig_hf / map_h as f32;
        boxes.push(PixelBox::new(
            (min_x * scale_x) as i64,
            (min_y * scale_y) as i64,
            ((max_x + 1.0) * scale_x).min(orig_wf) as i64,
            ((max_y + 1.0) * scale_y).min(orig_hf) as i64,
        ));
    }

    boxes.sort_by_key(|b| (b.y1, b.x1));
    Ok(boxes)
}

/// Run the detection session and return `(height, width, data)` of the
/// probability map.
#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn run_to_map(det: &mut Session, input: &Array4<f32>) -> Result<(u32, u32, Vec<f32>)> {
    let shape = input.shape().to_vec();
    let data = input
        .as_slice()
        .ok_or_else(|| RefineError::Inference("detection input not contiguous".to_string()))?;
    let value = ort::value::Value::from_array((shape.as_slice(), data.to_vec()))
        .map_err(|e| RefineError::Inference(e.to_string()))?;

    let outputs = det
        .run(ort::inputs![value])
        .map_err(|e| RefineError::Inference(format!("detection run failed: {e}")))?;

    // Output shape: [1, 1, H, W].
    let (out_shape, out_data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| RefineError::Inference(e.to_string()))?;
    let map_h = out_shape[2] as u32;
    let map_w = out_shape[3] as u32;
    Ok((map_h, map_w, out_data.to_vec()))
}

/// Recognize one detected line crop. Returns `None` for empty decodes.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn recognize_line(
    session: &mut Session,
    charset: &[String],
    crop: &RgbImage,
) -> Result<Option<RecognizedLine>> {
    let (w, h) = crop.dimensions();
    let aspect = w as f32 / h as f32;
    let rec_w = ((REC_HEIGHT as f32 * aspect).ceil() as u32).clamp(REC_HEIGHT, REC_MAX_WIDTH);

    let resized = image::imageops::resize(crop, rec_w, REC_HEIGHT, FilterType::CatmullRom);

    let mut input = Array3::<f32>::zeros((3, REC_HEIGHT as usize, rec_w as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            input[[c, y as usize, x as usize]] = (f32::from(pixel[c]) / 255.0 - 0.5) / 0.5;
        }
    }
    let input = input.insert_axis(ndarray::Axis(0));

    let shape = input.shape().to_vec();
    let data = input
        .as_slice()
        .ok_or_else(|| RefineError::Inference("recognition input not contiguous".to_string()))?;
    let value = ort::value::Value::from_array((shape.as_slice(), data.to_vec()))
        .map_err(|e| RefineError::Inference(e.to_string()))?;

    let outputs = session
        .run(ort::inputs![value])
        .map_err(|e| RefineError::Inference(format!("recognition run failed: {e}")))?;

    // Output shape: [1, time_steps, num_classes].
    let (out_shape, out_data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| RefineError::Inference(e.to_string()))?;
    let time_steps = out_shape[1] as usize;
    let num_classes = out_shape[2] as usize;

    Ok(ctc_decode(out_data, time_steps, num_classes, charset))
}

/// CTC greedy decode: argmax per step, collapse repeats, drop blanks.
/// Confidence is the mean probability of the kept characters.
#[allow(clippy::cast_precision_loss)]
fn ctc_decode(
    preds: &[f32],
    time_steps: usize,
    num_classes: usize,
    charset: &[String],
) -> Option<RecognizedLine> {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut previous = 0usize; // CTC blank token

    for t in 0..time_steps {
        let row = &preds[t * num_classes..(t + 1) * num_classes];
        let (index, &probability) = row
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))?;

        if index != 0 && index != previous {
            if let Some(ch) = charset.get(index) {
                text.push_str(ch);
                confidences.push(probability);
            }
        }
        previous = index;
    }

    if text.is_empty() {
        return None;
    }
    let confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;
    Some(RecognizedLine::new(text, confidence))
}
