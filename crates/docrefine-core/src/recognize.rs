//! Recognition boundary: the trait the orchestrator drives.
//!
//! The core never runs a model itself. It hands pre-cropped grayscale
//! regions to a [`RegionRecognizer`] and maps the predictions back into
//! the document. The concrete ONNX-backed implementation lives in
//! `docrefine-ocr`; tests inject scripted recognizers.

use crate::coords::PixelBox;
use crate::error::Result;
use image::GrayImage;

/// Minimum confidence for a recognized line to contribute to the
/// replacement text. Lines at or below the threshold are discarded.
pub const MIN_LINE_CONFIDENCE: f32 = 0.5;

/// A single line of recognized text with its confidence score.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedLine {
    /// The recognized text content.
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f32,
}

impl RecognizedLine {
    /// Creates a new recognized line.
    #[inline]
    #[must_use = "recognized line is created but not used"]
    pub const fn new(text: String, confidence: f32) -> Self {
        Self { text, confidence }
    }
}

/// A table cell predicted by structure recognition.
///
/// Indices are grid positions; the box is in the pixel space of the
/// table crop handed to the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictedCell {
    /// Row index (0-based).
    pub row: u32,
    /// Column index (0-based).
    pub col: u32,
    /// Cell box relative to the table crop.
    pub bbox: PixelBox,
}

/// Recognition operations the enhancement workflow depends on.
///
/// Implementations must be safe to call from a disabled state: an adapter
/// whose models never loaded returns empty predictions rather than
/// erroring, and the orchestrator keeps the original values.
pub trait RegionRecognizer {
    /// Recognize text lines in a prepared region crop.
    ///
    /// `math_mode` selects formula-oriented recognition for spans flagged
    /// as mathematical notation.
    ///
    /// # Errors
    ///
    /// Returns an error when inference itself fails; the caller treats
    /// that as "keep the original text".
    fn recognize_region(&self, region: &GrayImage, math_mode: bool)
        -> Result<Vec<RecognizedLine>>;

    /// Infer the cell grid of a cropped table image.
    ///
    /// # Errors
    ///
    /// Returns an error when inference itself fails; the caller leaves
    /// the table untouched.
    fn recognize_table_structure(&self, table: &GrayImage) -> Result<Vec<PredictedCell>>;
}

/// Join recognized lines into replacement text.
///
/// Keeps lines with confidence above [`MIN_LINE_CONFIDENCE`], joined by
/// single spaces. Returns `None` when no line clears the threshold — the
/// caller then preserves the previous text unchanged.
#[must_use = "returns the joined replacement text"]
pub fn join_confident_lines(lines: &[RecognizedLine]) -> Option<String> {
    let joined = lines
        .iter()
        .filter(|line| line.confidence > MIN_LINE_CONFIDENCE)
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let joined = joined.trim();
    if joined.is_empty() {
        None
    } else {
        Some(joined.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_confident_lines_with_spaces() {
        let lines = vec![
            RecognizedLine::new("first".to_string(), 0.9),
            RecognizedLine::new("second".to_string(), 0.8),
        ];
        assert_eq!(join_confident_lines(&lines).as_deref(), Some("first second"));
    }

    #[test]
    fn drops_lines_at_or_below_threshold() {
        let lines = vec![
            RecognizedLine::new("kept".to_string(), 0.51),
            RecognizedLine::new("dropped".to_string(), 0.5),
            RecognizedLine::new("noise".to_string(), 0.1),
        ];
        assert_eq!(join_confident_lines(&lines).as_deref(), Some("kept"));
    }

    #[test]
    fn no_confident_lines_yields_none() {
        let lines = vec![RecognizedLine::new("faint".to_string(), 0.3)];
        assert_eq!(join_confident_lines(&lines), None);
        assert_eq!(join_confident_lines(&[]), None);
    }

    #[test]
    fn whitespace_only_result_yields_none() {
        let lines = vec![RecognizedLine::new("   ".to_string(), 0.9)];
        assert_eq!(join_confident_lines(&lines), None);
    }
}
