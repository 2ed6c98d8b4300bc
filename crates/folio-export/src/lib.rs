//! Accessible, self-contained HTML export.
//!
//! Takes an annotated LaTeX-like source and the HTML an external converter
//! rendered from it, and produces a portable document: typeset math is turned
//! back into TeX, and every rendered image gets the accessibility annotations
//! written for its exact occurrence in the source, with the image data
//! embedded.

pub mod accessibility;
pub mod dom;
pub mod images;
pub mod math;
pub mod notify;
pub mod occurrence;
pub mod preview;
pub mod raster;
pub mod registry;
pub mod session;
pub mod source;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use accessibility::{assess_accessibility, effective_alt_text};
pub use dom::Document;
pub use folio_common::{ExportConfig, ExportError};
pub use images::ImagePassReport;
pub use math::{MathConverter, MathReport, convert_rendered_math_to_source};
#[cfg(feature = "mathml")]
pub use math::render_math;
pub use occurrence::{OccurrenceCounters, OccurrenceMap, build_occurrence_map};
pub use raster::{EncodingFormat, ImageRasterizer, Rasterizer, choose_smaller_encoding};
pub use registry::{ImageRegistry, RegistryEntry};
pub use session::{ExportArtifact, ExportSession};
pub use source::{detect_image_references, extract_caption_at_position, parse_annotations};
pub use types::{
    AccessibilityLevel, AccessibilityReportRow, AccessibilityStatus, AnnotationFragment,
    Annotations,
};
