//! # docrefine-core — selective OCR re-enhancement
//!
//! Re-examines a layout-analyzed document (pages with text, table, and
//! picture elements, each carrying a bounding box and an embedded page
//! raster) and selectively re-runs recognition on regions whose extracted
//! text is judged low quality, while correcting table cell geometry from
//! a structural prediction.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      DocumentEnhancer                        │
//! │  per page: resolve raster → occlusion index → tables → text  │
//! └──────┬────────────────┬────────────────┬─────────────────────┘
//!        │                │                │
//!        ▼                ▼                ▼
//!    coords           quality          recognize
//!  (doc ↔ pixel      (encoding /     (RegionRecognizer
//!   geometry)         formula         trait boundary —
//!                     triggers)       impl in docrefine-ocr)
//! ```
//!
//! The core decides *when* to call a recognizer and *how* to map its
//! predictions back into the document's coordinate system; it never runs
//! a model itself. Enhancement is strictly best-effort and
//! non-destructive: every text or bounding box in the output is either
//! the original value or a validated replacement.
//!
//! ## Example
//!
//! ```rust,ignore
//! use docrefine_core::{Document, DocumentEnhancer, EnhancementOptions};
//! use docrefine_ocr::OcrAdapter;
//!
//! let mut doc = Document::from_json(&json)?;
//! let adapter = OcrAdapter::with_default_assets();
//! let options = EnhancementOptions {
//!     enable_formula_enrichment: true,
//!     enable_encoding_fix: true,
//! };
//! DocumentEnhancer::new(options, &adapter).enhance(&mut doc);
//! # Ok::<(), docrefine_core::RefineError>(())
//! ```

pub mod coords;
pub mod document;
pub mod enhance;
pub mod error;
pub mod options;
pub mod quality;
pub mod raster;
pub mod recognize;

pub use coords::{overlap_ratio, pixel_cell_to_doc_bbox, to_pixel_bbox, PixelBox};
pub use document::{
    BoundingBox, CoordOrigin, Document, PageItem, ProvenanceItem, Provenanced, TableCell,
    TableItem, TextItem,
};
pub use enhance::DocumentEnhancer;
pub use error::{RefineError, Result};
pub use options::{EnhancementOptions, EnhancementStore};
pub use quality::{assess, QualityFlags};
pub use recognize::{PredictedCell, RecognizedLine, RegionRecognizer};
