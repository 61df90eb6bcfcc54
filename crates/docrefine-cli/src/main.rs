//! Command-line harness: enhance a converted document JSON file.
//!
//! Mirrors the response-preparation flow of the surrounding service:
//! options are recorded when the request is accepted, consumed exactly
//! once when the response is prepared, and any document-level enhancement
//! failure falls back to the pre-enhancement document rather than failing
//! the request.

use anyhow::{Context, Result};
use clap::Parser;
use docrefine_core::{
    Document, DocumentEnhancer, EnhancementOptions, EnhancementStore, RegionRecognizer,
};
use docrefine_ocr::OcrAdapter;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

/// Selectively re-run OCR on low-quality regions of a converted document.
#[derive(Debug, Parser)]
#[command(name = "docrefine", version, about)]
struct Cli {
    /// Input document JSON, as emitted by the conversion stage.
    input: PathBuf,

    /// Output path for the enhanced JSON. Prints to stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Re-recognize spans that look like formulas, in formula mode.
    #[arg(long)]
    formula_enrichment: bool,

    /// Re-recognize spans showing corrupted-encoding symptoms.
    #[arg(long)]
    encoding_fix: bool,

    /// Directory holding the recognition models. Defaults to the
    /// adapter's standard assets location.
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let json = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;

    // Accept the "request": record options against the task, consume
    // them once at response preparation below.
    let store = EnhancementStore::new();
    let task_id = "cli";
    store.set_options(
        task_id,
        EnhancementOptions {
            enable_formula_enrichment: cli.formula_enrichment,
            enable_encoding_fix: cli.encoding_fix,
        },
    );

    let adapter = match &cli.models_dir {
        Some(dir) => OcrAdapter::with_assets(dir),
        None => OcrAdapter::with_default_assets(),
    };

    let options = store.get_options(task_id).unwrap_or_default();
    store.remove_options(task_id);
    let output = enhance_or_original(&json, options, &adapter);

    match &cli.output {
        Some(path) => fs::write(path, output)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{output}"),
    }
    Ok(())
}

/// Enhance a document JSON, falling back to the input on any
/// document-level failure: unparsable input, a panicking enhancement
/// pass, or unserializable output all yield the original text.
fn enhance_or_original(
    json: &str,
    options: EnhancementOptions,
    recognizer: &dyn RegionRecognizer,
) -> String {
    let mut doc = match Document::from_json(json) {
        Ok(doc) => doc,
        Err(e) => {
            log::error!("input is not a convertible document, passing through: {e}");
            return json.to_string();
        }
    };

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        DocumentEnhancer::new(options, recognizer).enhance(&mut doc);
    }));
    if outcome.is_err() {
        log::error!("enhancement failed at document level, returning original");
        return json.to_string();
    }

    match doc.to_json() {
        Ok(enhanced) => enhanced,
        Err(e) => {
            log::error!("could not serialize enhanced document, returning original: {e}");
            json.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrefine_core::{PredictedCell, RecognizedLine, RefineError};
    use image::GrayImage;

    struct NoopRecognizer;

    impl RegionRecognizer for NoopRecognizer {
        fn recognize_region(
            &self,
            _region: &GrayImage,
            _math_mode: bool,
        ) -> docrefine_core::Result<Vec<RecognizedLine>> {
            Ok(Vec::new())
        }

        fn recognize_table_structure(
            &self,
            _table: &GrayImage,
        ) -> docrefine_core::Result<Vec<PredictedCell>> {
            Ok(Vec::new())
        }
    }

    struct PanickingRecognizer;

    impl RegionRecognizer for PanickingRecognizer {
        fn recognize_region(
            &self,
            _region: &GrayImage,
            _math_mode: bool,
        ) -> docrefine_core::Result<Vec<RecognizedLine>> {
            panic!("model runtime crashed");
        }

        fn recognize_table_structure(
            &self,
            _table: &GrayImage,
        ) -> docrefine_core::Result<Vec<PredictedCell>> {
            Err(RefineError::Inference("unreachable".to_string()))
        }
    }

    fn minimal_doc_json() -> String {
        doc_json("fine text", None)
    }

    fn doc_json(text: &str, image_uri: Option<String>) -> String {
        let page = match image_uri {
            Some(uri) => serde_json::json!({
                "page_no": 1,
                "size": {"width": 100.0, "height": 100.0},
                "image": {"uri": uri}
            }),
            None => serde_json::json!({
                "page_no": 1,
                "size": {"width": 612.0, "height": 792.0}
            }),
        };
        serde_json::json!({
            "schema_name": "ConvertedDocument",
            "version": "1.0.0",
            "name": "sample",
            "texts": [{
                "self_ref": "#/texts/0",
                "label": "paragraph",
                "orig": text,
                "text": text,
                "prov": [{
                    "page_no": 1,
                    "bbox": {"l": 0.0, "t": 0.0, "r": 50.0, "b": 10.0,
                             "coord_origin": "TOPLEFT"},
                    "charspan": [0, text.chars().count()]
                }]
            }],
            "pages": {"1": page}
        })
        .to_string()
    }

    fn page_image_uri() -> String {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;
        use std::io::Cursor;

        let raster = GrayImage::from_pixel(100, 100, image::Luma([255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageLuma8(raster)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", STANDARD.encode(&bytes))
    }

    #[test]
    fn disabled_flags_yield_equal_document() {
        let json = minimal_doc_json();
        let out = enhance_or_original(&json, EnhancementOptions::default(), &NoopRecognizer);
        let before = Document::from_json(&json).unwrap();
        let after = Document::from_json(&out).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn invalid_json_passes_through_unchanged() {
        let garbage = "{not a document";
        let out = enhance_or_original(
            garbage,
            EnhancementOptions {
                enable_formula_enrichment: true,
                enable_encoding_fix: true,
            },
            &NoopRecognizer,
        );
        assert_eq!(out, garbage);
    }

    #[test]
    fn panicking_pipeline_falls_back_to_original() {
        // The damaged span reaches the recognizer, which blows up; the
        // original JSON must come back verbatim.
        let json = doc_json("broken \u{FFFD} span", Some(page_image_uri()));
        let out = enhance_or_original(
            &json,
            EnhancementOptions {
                enable_formula_enrichment: true,
                enable_encoding_fix: true,
            },
            &PanickingRecognizer,
        );
        assert_eq!(out, json);
    }

    #[test]
    fn file_roundtrip_preserves_document() {
        let dir = tempfile::tempdir().unwrap();
        let input_path = dir.path().join("doc.json");
        fs::write(&input_path, minimal_doc_json()).unwrap();

        let json = fs::read_to_string(&input_path).unwrap();
        let out = enhance_or_original(&json, EnhancementOptions::default(), &NoopRecognizer);

        let output_path = dir.path().join("out.json");
        fs::write(&output_path, &out).unwrap();
        let reread = Document::from_json(&fs::read_to_string(&output_path).unwrap()).unwrap();
        assert_eq!(reread, Document::from_json(&json).unwrap());
    }
}
