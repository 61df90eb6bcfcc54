//! # docrefine-ocr — ONNX Runtime recognition adapter
//!
//! Implements the [`docrefine_core::RegionRecognizer`] boundary on top of
//! ONNX Runtime sessions:
//!
//! 1. **Text detection** finds line boxes inside a prepared region crop
//!    (DB-style probability map, thresholded and traced to contours).
//! 2. **Text recognition** reads each detected line (CTC decoding against
//!    a character dictionary); a separate formula-tuned model handles
//!    math-mode requests when present.
//! 3. **Table structure** infers a row/column grid from a cropped table
//!    image (DETR-style query decoding) and reports `(row, col)`-indexed
//!    cell boxes.
//!
//! Models load lazily on first use, exactly once, behind a single lock;
//! CUDA is attempted first with CPU fallback. A failed load leaves the
//! adapter permanently disabled: every subsequent call returns empty
//! predictions instead of erroring, and the enhancement workflow keeps
//! the original document values.
//!
//! # Models
//!
//! The assets directory (see [`OcrAdapter::with_default_assets`]) holds:
//! - `text_det.onnx` — text line detection
//! - `text_rec.onnx` + `text_rec_charset.txt` — general recognition
//! - `formula_rec.onnx` + `formula_rec_charset.txt` — formula-mode
//!   recognition (optional; math mode falls back to the general model)
//! - `table_structure.onnx` — table row/column detection (optional)

mod adapter;
mod engine;
mod table;

pub use adapter::OcrAdapter;
pub use engine::{Device, RecognitionEngine};
