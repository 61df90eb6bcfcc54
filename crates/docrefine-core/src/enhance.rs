//! The enhancement workflow: one pass over a converted document.
//!
//! Per page, in page-number order: resolve the raster image, index
//! non-text occlusion boxes, correct and re-recognize table cells, then
//! re-recognize free text spans that fail quality checks and sit clear of
//! non-text regions. Every failure below the document level is contained:
//! a page that cannot resolve its image is skipped, a region whose
//! recognition fails keeps its original value. The pass mutates only
//! `text` and `bbox` fields of existing elements.

use crate::coords::{overlap_ratio, pixel_cell_to_doc_bbox, to_pixel_bbox, PixelBox};
use crate::document::{Document, PageItem, Provenanced, TableItem, TextItem};
use crate::options::EnhancementOptions;
use crate::quality::{assess, QualityFlags};
use crate::raster::{crop_region, decode_data_uri, padded_region, to_grayscale};
use crate::recognize::{join_confident_lines, RegionRecognizer};
use image::GrayImage;
use std::collections::HashMap;

/// Maximum fraction of a text box that may overlap a non-text region
/// before the span is presumed to be text baked inside a figure and
/// skipped. Tuned, not derived.
pub const OVERLAP_SKIP_THRESHOLD: f64 = 0.05;

/// Drives selective re-recognition over one document.
///
/// Holds the per-task flags and the recognizer boundary; all document
/// state stays in the document itself.
pub struct DocumentEnhancer<'a> {
    options: EnhancementOptions,
    recognizer: &'a dyn RegionRecognizer,
}

impl<'a> DocumentEnhancer<'a> {
    /// Creates an enhancer for one task's options.
    #[must_use = "creates a new DocumentEnhancer"]
    pub fn new(options: EnhancementOptions, recognizer: &'a dyn RegionRecognizer) -> Self {
        Self {
            options,
            recognizer,
        }
    }

    /// Run the enhancement pass over `doc`, mutating it in place.
    ///
    /// An identity transform when no enhancement flag is enabled.
    /// Never fails at the document level: pages and regions degrade
    /// individually.
    pub fn enhance(&self, doc: &mut Document) {
        if !self.options.any_enabled() {
            return;
        }

        let Document {
            pages,
            texts,
            tables,
            pictures,
            form_items,
            key_value_items,
            ..
        } = doc;

        for (&page_no, page) in pages.iter() {
            log::info!("Enhancing page {page_no}");

            let Some(raster) = resolve_page_image(page_no, page) else {
                continue;
            };

            let (img_w, img_h) = raster.dimensions();
            let (pdf_w, pdf_h) = (page.size.width, page.size.height);
            let ctx = PageContext {
                page_no,
                pdf_w,
                pdf_h,
                img_w,
                img_h,
            };

            let mut occlusions = Vec::new();
            collect_occlusions(pictures, &ctx, &mut occlusions);
            collect_occlusions(form_items, &ctx, &mut occlusions);
            collect_occlusions(key_value_items, &ctx, &mut occlusions);
            collect_occlusions(tables, &ctx, &mut occlusions);

            self.process_tables(tables, &raster, &ctx);
            self.process_texts(texts, &raster, &ctx, &occlusions);
        }
    }

    /// Table pass: structural cell-geometry correction, then per-cell
    /// text re-recognition.
    fn process_tables(&self, tables: &mut [TableItem], raster: &GrayImage, ctx: &PageContext) {
        for table in tables.iter_mut() {
            let Some(bbox) = table.bbox_on_page(ctx.page_no) else {
                continue;
            };
            let table_px = to_pixel_bbox(bbox, ctx.pdf_w, ctx.pdf_h, ctx.img_w, ctx.img_h);

            self.correct_cell_geometry(table, &table_px, raster, ctx);

            for cell in &mut table.data.table_cells {
                let flags = self.assess_text(&cell.text);
                if !flags.any() {
                    continue;
                }
                let Some(cell_bbox) = cell.bbox else {
                    continue;
                };
                let cell_px =
                    to_pixel_bbox(&cell_bbox, ctx.pdf_w, ctx.pdf_h, ctx.img_w, ctx.img_h);
                if let Some(new_text) = self.recognize_replacement(raster, &cell_px, flags.formula)
                {
                    if new_text != cell.text {
                        log::info!(
                            "Page {}: cell text '{}' -> '{}'",
                            ctx.page_no,
                            snippet(&cell.text),
                            snippet(&new_text)
                        );
                        cell.text = new_text;
                    }
                }
            }
        }
    }

    /// Rewrite cell bounding boxes from a structural prediction over the
    /// cropped table image. Predictions match existing cells strictly by
    /// `(row, col)`; unmatched cells stay untouched.
    fn correct_cell_geometry(
        &self,
        table: &mut TableItem,
        table_px: &PixelBox,
        raster: &GrayImage,
        ctx: &PageContext,
    ) {
        let Some(crop) = crop_region(raster, table_px) else {
            return;
        };

        let predicted = match self.recognizer.recognize_table_structure(&crop) {
            Ok(cells) => cells,
            Err(e) => {
                log::error!("Page {}: table structure recognition failed: {e}", ctx.page_no);
                return;
            }
        };
        if predicted.is_empty() {
            return;
        }

        let by_grid_pos: HashMap<(u32, u32), PixelBox> = predicted
            .iter()
            .map(|cell| ((cell.row, cell.col), cell.bbox))
            .collect();

        let mut corrected = 0usize;
        for cell in &mut table.data.table_cells {
            let key = (cell.start_row_offset_idx, cell.start_col_offset_idx);
            if let Some(cell_px) = by_grid_pos.get(&key) {
                cell.bbox = Some(pixel_cell_to_doc_bbox(
                    cell_px, table_px, ctx.img_w, ctx.img_h, ctx.pdf_w, ctx.pdf_h,
                ));
                corrected += 1;
            }
        }
        log::debug!(
            "Page {}: corrected {corrected}/{} cell boxes",
            ctx.page_no,
            table.data.table_cells.len()
        );
    }

    /// Free-text pass: skip spans occluded by non-text regions, then
    /// re-recognize the ones failing quality checks.
    fn process_texts(
        &self,
        texts: &mut [TextItem],
        raster: &GrayImage,
        ctx: &PageContext,
        occlusions: &[PixelBox],
    ) {
        for text in texts.iter_mut() {
            let Some(bbox) = text.bbox_on_page(ctx.page_no) else {
                continue;
            };
            let text_px = to_pixel_bbox(bbox, ctx.pdf_w, ctx.pdf_h, ctx.img_w, ctx.img_h);

            let occluded = occlusions
                .iter()
                .any(|other| overlap_ratio(&text_px, other) > OVERLAP_SKIP_THRESHOLD);
            if occluded {
                log::debug!(
                    "Page {}: skipping occluded text '{}'",
                    ctx.page_no,
                    snippet(&text.text)
                );
                continue;
            }

            let flags = self.assess_text(&text.text);
            if !flags.any() {
                continue;
            }

            if let Some(new_text) = self.recognize_replacement(raster, &text_px, flags.formula) {
                if new_text != text.text {
                    log::info!(
                        "Page {}: text '{}' -> '{}'",
                        ctx.page_no,
                        snippet(&text.text),
                        snippet(&new_text)
                    );
                    text.text = new_text;
                }
            }
        }
    }

    /// Pad-and-recognize one region. Returns the joined replacement text,
    /// or `None` when the region is degenerate, recognition fails, or no
    /// line clears the confidence threshold — all of which mean "keep the
    /// original".
    fn recognize_replacement(
        &self,
        raster: &GrayImage,
        region: &PixelBox,
        math_mode: bool,
    ) -> Option<String> {
        let crop = padded_region(raster, region)?;
        match self.recognizer.recognize_region(&crop, math_mode) {
            Ok(lines) => join_confident_lines(&lines),
            Err(e) => {
                log::error!("Region recognition failed: {e}");
                None
            }
        }
    }

    fn assess_text(&self, text: &str) -> QualityFlags {
        assess(
            text,
            self.options.enable_formula_enrichment,
            self.options.enable_encoding_fix,
        )
    }
}

/// Per-page dimensions threaded through the passes.
#[derive(Debug, Clone, Copy)]
struct PageContext {
    page_no: u32,
    pdf_w: f64,
    pdf_h: f64,
    img_w: u32,
    img_h: u32,
}

/// Decode a page's embedded raster to grayscale. Pages without an image,
/// or with an undecodable one, are skipped (logged, not fatal).
fn resolve_page_image(page_no: u32, page: &PageItem) -> Option<GrayImage> {
    let Some(image_ref) = page.image.as_ref() else {
        log::warn!("Page {page_no}: no embedded image, skipping enhancement");
        return None;
    };
    match decode_data_uri(&image_ref.uri) {
        Ok(decoded) => Some(to_grayscale(&decoded)),
        Err(e) => {
            log::warn!("Page {page_no}: could not decode page image: {e}");
            None
        }
    }
}

/// Pixel boxes of every element of one kind whose first provenance record
/// targets this page.
fn collect_occlusions<T: Provenanced>(items: &[T], ctx: &PageContext, out: &mut Vec<PixelBox>) {
    for item in items {
        if let Some(bbox) = item.bbox_on_page(ctx.page_no) {
            out.push(to_pixel_bbox(bbox, ctx.pdf_w, ctx.pdf_h, ctx.img_w, ctx.img_h));
        }
    }
}

fn snippet(text: &str) -> &str {
    let end = text
        .char_indices()
        .nth(40)
        .map_or(text.len(), |(idx, _)| idx);
    &text[..end]
}
