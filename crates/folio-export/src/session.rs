//! Export session: one source document, its registered images and the passes
//! that turn rendered markup into a portable artifact.

use std::fmt::Write as _;
use std::sync::Arc;

use bytes::Bytes;
use folio_common::{ExportConfig, ExportError, MathDelimiters, Retypeset};
use markdown_weaver_escape::escape_html_body_text;

use crate::dom::{Document, DocumentKind, Element, Node};
use crate::images::{ImagePass, ImagePassReport, PassMode};
use crate::math::{MathConverter, MathReport};
use crate::notify::{Notifier, NotifyLevel, TracingNotifier};
use crate::occurrence::{OccurrenceMap, build_occurrence_map};
use crate::preview::{MemoryPreviewStore, PreviewStore};
use crate::raster::{ImageRasterizer, Rasterizer};
use crate::registry::{ImageRegistry, RegistryEntry};
use crate::source;
use crate::types::{AccessibilityReportRow, AnnotationFragment};

const KATEX_CSS: &str = "https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.css";
const KATEX_JS: &str = "https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/katex.min.js";
const KATEX_AUTO_RENDER: &str =
    "https://cdn.jsdelivr.net/npm/katex@0.16.9/dist/contrib/auto-render.min.js";

/// Result of [`ExportSession::export_artifact`].
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    /// Standalone HTML document
    pub html: String,
    /// Every degraded path taken, in pass order
    pub warnings: Vec<String>,
    /// Source occurrences whose image was never registered
    pub missing: Vec<AnnotationFragment>,
    pub math: MathReport,
    pub images: ImagePassReport,
}

/// Owns the registry and occurrence map for one document.
///
/// Lifecycle: create, [`load_source`](Self::load_source), register images, run
/// the preview or export passes as often as needed, then
/// [`dispose`](Self::dispose).
pub struct ExportSession {
    config: ExportConfig,
    registry: ImageRegistry,
    notifier: Arc<dyn Notifier>,
    occurrences: OccurrenceMap,
}

impl std::fmt::Debug for ExportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportSession")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("occurrences", &self.occurrences.occurrence_count())
            .finish_non_exhaustive()
    }
}

impl Default for ExportSession {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}

impl ExportSession {
    pub fn new(config: ExportConfig) -> Self {
        let rasterizer = Arc::new(ImageRasterizer::new(config.jpeg_quality));
        Self::with_parts(
            config,
            rasterizer,
            Arc::new(MemoryPreviewStore::new()),
            Arc::new(TracingNotifier),
        )
    }

    pub fn with_parts(
        config: ExportConfig,
        rasterizer: Arc<dyn Rasterizer>,
        previews: Arc<dyn PreviewStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            registry: ImageRegistry::new(rasterizer, previews),
            notifier,
            occurrences: OccurrenceMap::default(),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn registry(&self) -> &ImageRegistry {
        &self.registry
    }

    pub fn occurrences(&self) -> &OccurrenceMap {
        &self.occurrences
    }

    /// Parses `source` and replaces the occurrence map.
    pub fn load_source(&mut self, source: &str) -> &OccurrenceMap {
        self.occurrences = build_occurrence_map(source::detect_image_references(source));
        tracing::debug!(
            files = self.occurrences.len(),
            occurrences = self.occurrences.occurrence_count(),
            "source loaded"
        );
        &self.occurrences
    }

    pub fn detect_image_references(&self, source: &str) -> Vec<AnnotationFragment> {
        source::detect_image_references(source)
    }

    /// Occurrences in `source` whose image is not registered.
    pub fn missing_images(&self, source: &str) -> Vec<AnnotationFragment> {
        source::detect_image_references(source)
            .into_iter()
            .filter(|fragment| self.registry.resolve(&fragment.filename).is_none())
            .collect()
    }

    pub fn all_images_available(&self, source: &str) -> bool {
        self.missing_images(source).is_empty()
    }

    pub fn accessibility_report(&self, source: &str) -> Vec<AccessibilityReportRow> {
        source::detect_image_references(source)
            .iter()
            .map(AccessibilityReportRow::from)
            .collect()
    }

    pub async fn register_image(
        &self,
        filename: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Result<Arc<RegistryEntry>, ExportError> {
        self.registry.register_image(filename, data).await
    }

    pub fn remove_image(&self, filename: &str) -> bool {
        self.registry.remove_image(filename)
    }

    pub fn clear_registry(&self) {
        self.registry.clear();
    }

    /// Points images at their preview references. Returns how many were
    /// substituted.
    pub fn replace_images_for_preview(&self, document: &mut Document) -> usize {
        self.run_image_pass(PassMode::Preview, document).replaced
    }

    pub fn export_images(&self, document: &mut Document) -> ImagePassReport {
        self.run_image_pass(PassMode::Export, document)
    }

    /// Embeds registered images into `markup` as data URLs.
    pub fn replace_images_for_export(&self, markup: &str) -> String {
        let mut document = Document::parse(markup);
        self.export_images(&mut document);
        document.to_html()
    }

    pub fn convert_rendered_math_to_source(&self, markup: &str) -> String {
        MathConverter::new(&self.config).convert_markup(markup).0
    }

    fn run_image_pass(&self, mode: PassMode, document: &mut Document) -> ImagePassReport {
        ImagePass::new(
            mode,
            &self.occurrences,
            &self.registry,
            &self.config.long_description_label,
        )
        .run(document)
    }

    /// Runs the whole pipeline on `rendered`, the converter's output for
    /// `source`, and produces a standalone document.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn export_artifact(&mut self, source: &str, rendered: &str) -> ExportArtifact {
        self.load_source(source);
        let mut document = Document::parse(rendered);

        let math = MathConverter::new(&self.config).convert(&mut document);
        let images = self.export_images(&mut document);
        let html = match document.kind {
            DocumentKind::Fragment => write_document(&self.config, &document),
            DocumentKind::Full => {
                add_head_assets(&self.config, &mut document);
                document.to_html()
            }
        };

        let warnings: Vec<String> = math
            .warnings
            .iter()
            .chain(&images.warnings)
            .cloned()
            .collect();
        for warning in &warnings {
            self.notifier.notify(NotifyLevel::Warning, warning);
        }
        let missing = self.missing_images(source);
        if !missing.is_empty() {
            self.notifier.notify(
                NotifyLevel::Warning,
                &format!("{} image occurrence(s) have no registered file", missing.len()),
            );
        }

        ExportArtifact {
            html,
            warnings,
            missing,
            math,
            images,
        }
    }

    /// Releases every preview reference held by the session.
    pub fn dispose(self) {
        self.registry.clear();
    }
}

fn head_assets(config: &ExportConfig) -> Vec<Element> {
    match config.retypeset {
        Retypeset::None => Vec::new(),
        Retypeset::KatexCdn => vec![
            Element::new("link")
                .with_attr("rel", "stylesheet")
                .with_attr("href", KATEX_CSS),
            Element::new("script")
                .with_attr("defer", "")
                .with_attr("src", KATEX_JS),
            Element::new("script")
                .with_attr("defer", "")
                .with_attr("src", KATEX_AUTO_RENDER)
                .with_attr("onload", auto_render_call(config.math_delimiters)),
        ],
    }
}

/// Auto-render hook recognising the delimiters math is exported with.
fn auto_render_call(delimiters: MathDelimiters) -> String {
    let pair = |display: bool| {
        let (left, right) = delimiters.pair(display);
        format!(
            "{{left: '{}', right: '{}', display: {display}}}",
            left.replace('\\', "\\\\"),
            right.replace('\\', "\\\\")
        )
    };
    // `$$` must be listed before `$`
    format!(
        "renderMathInElement(document.body, {{delimiters: [{}, {}]}});",
        pair(true),
        pair(false)
    )
}

/// Wraps a body fragment into a complete document.
pub fn write_document(config: &ExportConfig, body: &Document) -> String {
    let title = config.title.as_deref().unwrap_or("Untitled");
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n");
    out.push_str("<html lang=\"en\">\n");
    out.push_str("<head>\n");
    out.push_str("  <meta charset=\"utf-8\">\n");
    out.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    out.push_str("  <title>");
    let _ = escape_html_body_text(&mut out, title);
    out.push_str("</title>\n");
    for asset in head_assets(config) {
        let _ = writeln!(out, "  {}", asset.to_html());
    }
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&body.to_html());
    out.push_str("\n</body>\n");
    out.push_str("</html>\n");
    out
}

/// Appends typesetting assets to the `<head>` of a full document.
fn add_head_assets(config: &ExportConfig, document: &mut Document) {
    let Some(head) = document
        .children
        .iter_mut()
        .filter_map(Node::as_element_mut)
        .find(|element| element.is("html"))
        .and_then(|html| {
            html.children
                .iter_mut()
                .filter_map(Node::as_element_mut)
                .find(|element| element.is("head"))
        })
    else {
        return;
    };
    head.children
        .extend(head_assets(config).into_iter().map(Node::Element));
}

#[cfg(test)]
mod tests;
