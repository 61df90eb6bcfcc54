//! Document model for the conversion stage's JSON output.
//!
//! These types mirror the structured-document schema emitted by the
//! upstream layout-analysis pipeline: flat collections of typed elements
//! (`texts`, `tables`, `pictures`, `form_items`, `key_value_items`), each
//! binding itself to source pages through provenance records, plus per-page
//! metadata carrying the page size and an embedded raster image.
//!
//! The enhancement workflow only ever mutates `text` and `bbox` fields of
//! existing elements; it never creates, deletes, or reorders them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coordinate system origin for bounding boxes.
///
/// Declares which corner (or the page center) coordinate values are
/// measured from. Conversion stages differ: PDF-native extractors emit
/// `BOTTOMLEFT`, image-space models emit `TOPLEFT`, and right-to-left
/// layouts occasionally arrive mirrored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoordOrigin {
    /// Origin at top-left corner (y increases downward).
    #[default]
    Topleft,
    /// Origin at top-right corner (x mirrored).
    Topright,
    /// Origin at bottom-left corner (y increases upward).
    Bottomleft,
    /// Origin at bottom-right corner (both axes mirrored).
    Bottomright,
    /// Origin at the page center.
    Center,
}

impl fmt::Display for CoordOrigin {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topleft => write!(f, "top-left"),
            Self::Topright => write!(f, "top-right"),
            Self::Bottomleft => write!(f, "bottom-left"),
            Self::Bottomright => write!(f, "bottom-right"),
            Self::Center => write!(f, "center"),
        }
    }
}

/// Bounding box for document elements, in document units.
///
/// Defines a rectangular region using left, top, right, and bottom edges.
/// Interpretation of the values depends on `coord_origin`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge x-coordinate.
    pub l: f64,
    /// Top edge y-coordinate.
    pub t: f64,
    /// Right edge x-coordinate.
    pub r: f64,
    /// Bottom edge y-coordinate.
    pub b: f64,
    /// Coordinate system origin for interpreting the edges.
    pub coord_origin: CoordOrigin,
}

impl BoundingBox {
    /// Creates a new bounding box.
    #[inline]
    #[must_use = "creates a new BoundingBox"]
    pub const fn new(l: f64, t: f64, r: f64, b: f64, coord_origin: CoordOrigin) -> Self {
        Self {
            l,
            t,
            r,
            b,
            coord_origin,
        }
    }
}

/// Provenance record binding a content element to one source page.
///
/// The first record of an element's `prov` list is authoritative for
/// per-page filtering during enhancement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceItem {
    /// Page number the content appears on.
    pub page_no: u32,
    /// Bounding box of the content on that page.
    pub bbox: BoundingBox,
    /// Character span (start, end) in the extracted text.
    #[serde(default)]
    pub charspan: (usize, usize),
}

/// Semantic label assigned by the layout model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocItemLabel {
    /// Document title.
    Title,
    /// Section or chapter heading.
    SectionHeader,
    /// Regular paragraph text.
    Paragraph,
    /// Tabular data.
    Table,
    /// Image or figure.
    Picture,
    /// Chart or graph visualization.
    Chart,
    /// Mathematical formula or equation.
    Formula,
    /// Source code block.
    Code,
    /// Item in a list.
    ListItem,
    /// Caption for a figure or table.
    Caption,
    /// Footnote text.
    Footnote,
    /// Page header.
    PageHeader,
    /// Page footer.
    PageFooter,
    /// Key-value pair region (forms, metadata).
    KeyValueRegion,
    /// Form field or input area.
    Form,
    /// Generic text (fallback label).
    #[default]
    Text,
}

/// Text content element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    /// JSON Pointer reference to this item (e.g. `"#/texts/0"`).
    #[serde(default)]
    pub self_ref: String,
    /// Semantic label.
    #[serde(default)]
    pub label: DocItemLabel,
    /// Original extracted text (before normalization).
    #[serde(default)]
    pub orig: String,
    /// Normalized text payload. Mutated in place on re-recognition.
    pub text: String,
    /// Provenance records linking to source pages.
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
}

/// Individual cell within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    /// Cell text content. Mutated in place on re-recognition.
    pub text: String,
    /// Number of rows this cell spans.
    #[serde(default = "one")]
    pub row_span: u32,
    /// Number of columns this cell spans.
    #[serde(default = "one")]
    pub col_span: u32,
    /// Starting row index (0-based). Match identity for structural
    /// predictions, together with `start_col_offset_idx`.
    pub start_row_offset_idx: u32,
    /// Ending row index (exclusive).
    #[serde(default)]
    pub end_row_offset_idx: u32,
    /// Starting column index (0-based).
    pub start_col_offset_idx: u32,
    /// Ending column index (exclusive).
    #[serde(default)]
    pub end_col_offset_idx: u32,
    /// Whether this cell is a column header.
    #[serde(default)]
    pub column_header: bool,
    /// Whether this cell is a row header.
    #[serde(default)]
    pub row_header: bool,
    /// Bounding box of the cell, in document units. Rewritten in place
    /// when a structural prediction matches this cell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

const fn one() -> u32 {
    1
}

/// Table structure data containing dimensions and cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    /// Total number of rows.
    #[serde(default)]
    pub num_rows: u32,
    /// Total number of columns.
    #[serde(default)]
    pub num_cols: u32,
    /// All cells (row-major order).
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
}

/// Table element with structure and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableItem {
    /// JSON Pointer reference to this item.
    #[serde(default)]
    pub self_ref: String,
    /// Semantic label (always `table`).
    #[serde(default)]
    pub label: DocItemLabel,
    /// Table structure and cell data.
    pub data: TableData,
    /// Provenance records linking to source pages.
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
}

/// Image or figure element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PictureItem {
    /// JSON Pointer reference to this item.
    #[serde(default)]
    pub self_ref: String,
    /// Semantic label (`picture`, `chart`).
    #[serde(default)]
    pub label: DocItemLabel,
    /// Provenance records linking to source pages.
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
}

/// Form element (input areas detected by the layout model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormItem {
    /// JSON Pointer reference to this item.
    #[serde(default)]
    pub self_ref: String,
    /// Provenance records linking to source pages.
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
}

/// Key-value region element (label/value pairs in forms and headers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueItem {
    /// JSON Pointer reference to this item.
    #[serde(default)]
    pub self_ref: String,
    /// Provenance records linking to source pages.
    #[serde(default)]
    pub prov: Vec<ProvenanceItem>,
}

/// Page dimensions in document units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    /// Page width.
    pub width: f64,
    /// Page height.
    pub height: f64,
}

/// Reference to an embedded page raster image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Self-describing embedded image: a `data:<mime>;base64,` header
    /// segment followed by a comma and the encoded payload.
    pub uri: String,
    /// MIME type of the encoded image, when the producer recorded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    /// Render DPI of the raster, when the producer recorded it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
}

/// Metadata for a single document page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageItem {
    /// Page number.
    pub page_no: u32,
    /// Physical page size in document units.
    pub size: Size,
    /// Rendered raster image of the page, if the conversion stage
    /// embedded one. Pages without an image are skipped by enhancement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
}

/// A converted, layout-analyzed document.
///
/// Flat element collections plus per-page metadata, as produced by the
/// conversion stage. The enhancement workflow reads `pages` in page-number
/// order (guaranteed by the `BTreeMap`) and mutates element text and cell
/// geometry in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Schema name recorded by the producer.
    #[serde(default)]
    pub schema_name: String,
    /// Schema version recorded by the producer.
    #[serde(default)]
    pub version: String,
    /// Document name.
    #[serde(default)]
    pub name: String,
    /// All extracted text elements.
    #[serde(default)]
    pub texts: Vec<TextItem>,
    /// All extracted tables.
    #[serde(default)]
    pub tables: Vec<TableItem>,
    /// All extracted pictures and figures.
    #[serde(default)]
    pub pictures: Vec<PictureItem>,
    /// Form elements.
    #[serde(default)]
    pub form_items: Vec<FormItem>,
    /// Key-value region elements.
    #[serde(default)]
    pub key_value_items: Vec<KeyValueItem>,
    /// Page metadata keyed by page number. JSON serializes the keys as
    /// strings, matching the producer's map shape.
    #[serde(default)]
    pub pages: BTreeMap<u32, PageItem>,
}

impl Document {
    /// Parse a document from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the schema.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the document back to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Shared access to element provenance.
///
/// Every element kind carries an ordered provenance list; the first record
/// is authoritative for per-page filtering. The element kinds form a closed
/// set, so the lookup resolves statically instead of by runtime attribute
/// inspection.
pub trait Provenanced {
    /// The element's provenance records, in order.
    fn prov(&self) -> &[ProvenanceItem];

    /// The authoritative bounding box of this element on `page_no`, i.e.
    /// the first provenance record's box when that record targets the page.
    #[inline]
    fn bbox_on_page(&self, page_no: u32) -> Option<&BoundingBox> {
        self.prov()
            .first()
            .filter(|p| p.page_no == page_no)
            .map(|p| &p.bbox)
    }
}

macro_rules! impl_provenanced {
    ($($ty:ty),+ $(,)?) => {
        $(impl Provenanced for $ty {
            #[inline]
            fn prov(&self) -> &[ProvenanceItem] {
                &self.prov
            }
        })+
    };
}

impl_provenanced!(TextItem, TableItem, PictureItem, FormItem, KeyValueItem);
