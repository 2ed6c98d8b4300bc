//! Round-trip of typeset math back to TeX source
//!
//! Rendered expressions come out of KaTeX, MathJax or a MathML writer. Each
//! container is replaced by its TeX source in configurable delimiters so the
//! exported document can be typeset again by any engine. The TeX annotation
//! embedded by the engine is used when present; otherwise the visible glyph
//! text is flattened, which is lossy and always reported.

use folio_common::{ExportConfig, MathDelimiters, MathOutput};
#[cfg(feature = "mathml")]
use markdown_weaver_escape::escape_html;
#[cfg(feature = "mathml")]
use pulldown_latex::{
    Parser, Storage, config::DisplayMode, config::RenderConfig, mathml::push_mathml,
};

use crate::dom::{Document, Element, Node};
use crate::utils::collapse_whitespace;

const TEX_ENCODING: &str = "application/x-tex";
/// Deeper trees are treated as unrecoverable.
const MAX_EXTRACTION_DEPTH: usize = 256;

/// Result of attempting to render LaTeX math
pub enum MathResult {
    /// Successfully rendered MathML
    Success(String),
    /// Rendering failed
    Error { message: String },
}

/// Render LaTeX math to MathML, carrying `latex` as a TeX annotation
///
/// # Arguments
/// * `latex` - The LaTeX source string (without delimiters like $ or $$)
/// * `display_mode` - If true, render as display math (block); if false, inline
#[cfg(feature = "mathml")]
pub fn render_math(latex: &str, display_mode: bool) -> MathResult {
    let storage = Storage::new();
    let parser = Parser::new(latex, &storage);
    // The writer emits the annotation verbatim
    let mut annotation = String::new();
    let _ = escape_html(&mut annotation, latex);
    let config = RenderConfig {
        display_mode: if display_mode {
            DisplayMode::Block
        } else {
            DisplayMode::Inline
        },
        annotation: Some(annotation.as_str()),
        ..Default::default()
    };

    let mut mathml = String::new();

    let events: Vec<_> = parser.collect();
    let errors: Vec<String> = events
        .iter()
        .filter_map(|e| e.as_ref().err().map(|err| err.to_string()))
        .collect();

    if errors.is_empty() {
        if let Err(e) = push_mathml(&mut mathml, events.into_iter(), config) {
            return MathResult::Error {
                message: e.to_string(),
            };
        }
        MathResult::Success(mathml)
    } else {
        MathResult::Error {
            message: errors.join("; "),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Katex,
    MathJax,
    MathMl,
}

/// A typeset expression found in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    pub engine: Engine,
    pub display: bool,
}

impl Container {
    /// Recognizes the outer element of a typeset expression.
    pub fn classify(element: &Element) -> Option<Self> {
        let (engine, display) = if element.has_class("katex-display") {
            (Engine::Katex, true)
        } else if element.has_class("katex") {
            (Engine::Katex, false)
        } else if element.is("mjx-container") {
            (Engine::MathJax, element.attr("display") == Some("true"))
        } else if element.is("math") {
            (Engine::MathMl, element.attr("display") == Some("block"))
        } else {
            return None;
        };
        Some(Self { engine, display })
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("expression is nested deeper than {0} elements")]
    TooDeep(usize),
    #[error("expression has no visible text")]
    Empty,
}

/// How much of an expression's source could be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// TeX taken from the engine's semantic annotation; exact.
    HasSemanticAnnotation(String),
    /// Flattened glyph text; structure such as fractions and scripts is lost.
    HeuristicOnly(String),
    Unrecoverable(ExtractionError),
}

/// Recovers the source of one container element.
pub fn extract(container: &Element) -> Extraction {
    if let Some(annotation) = container.find_descendant(&is_tex_annotation) {
        let tex = annotation.text_content();
        let tex = tex.trim();
        if !tex.is_empty() {
            return Extraction::HasSemanticAnnotation(tex.to_owned());
        }
    }

    let visual = container
        .find_descendant(&|e| e.has_class("katex-html"))
        .or_else(|| container.find_descendant(&|e| e.is("mjx-assistive-mml")))
        .unwrap_or(container);
    let mut text = String::new();
    if let Err(e) = flatten(visual, 0, &mut text) {
        return Extraction::Unrecoverable(e);
    }
    let text = collapse_whitespace(&text.replace('\u{200b}', ""));
    if text.is_empty() {
        return Extraction::Unrecoverable(ExtractionError::Empty);
    }
    Extraction::HeuristicOnly(text)
}

fn is_tex_annotation(element: &Element) -> bool {
    element.is("annotation")
        && element
            .attr("encoding")
            .is_some_and(|encoding| encoding.eq_ignore_ascii_case(TEX_ENCODING))
}

fn flatten(element: &Element, depth: usize, out: &mut String) -> Result<(), ExtractionError> {
    if depth > MAX_EXTRACTION_DEPTH {
        return Err(ExtractionError::TooDeep(MAX_EXTRACTION_DEPTH));
    }
    for child in &element.children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if e.is("annotation") || e.is("annotation-xml") => {}
            Node::Element(e) => flatten(e, depth + 1, out)?,
            _ => {}
        }
    }
    Ok(())
}

/// What a conversion pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MathReport {
    pub semantic: usize,
    pub heuristic: usize,
    pub unrecoverable: usize,
    /// Expressions written back as native MathML
    pub retypeset: usize,
    pub assets_removed: usize,
    pub warnings: Vec<String>,
}

impl MathReport {
    pub fn converted(&self) -> usize {
        self.semantic + self.heuristic
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

#[derive(Debug, Clone)]
pub struct MathConverter {
    delimiters: MathDelimiters,
    output: MathOutput,
    strip_engine_assets: bool,
}

impl Default for MathConverter {
    fn default() -> Self {
        Self::new(&ExportConfig::default())
    }
}

impl MathConverter {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            delimiters: config.math_delimiters,
            output: config.math_output,
            strip_engine_assets: config.strip_engine_assets,
        }
    }

    pub fn with_delimiters(mut self, delimiters: MathDelimiters) -> Self {
        self.delimiters = delimiters;
        self
    }

    pub fn with_output(mut self, output: MathOutput) -> Self {
        self.output = output;
        self
    }

    /// Replaces every typeset expression in `document`, outermost container
    /// first, then removes leftover engine scripts and styles.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn convert(&self, document: &mut Document) -> MathReport {
        let mut report = MathReport::default();
        self.walk(&mut document.children, &mut report);
        if self.strip_engine_assets {
            report.assets_removed = strip_engine_assets(&mut document.children);
        }
        tracing::debug!(
            semantic = report.semantic,
            heuristic = report.heuristic,
            unrecoverable = report.unrecoverable,
            assets_removed = report.assets_removed,
            "math conversion finished"
        );
        report
    }

    pub fn convert_markup(&self, markup: &str) -> (String, MathReport) {
        let mut document = Document::parse(markup);
        let report = self.convert(&mut document);
        (document.to_html(), report)
    }

    fn walk(&self, nodes: &mut Vec<Node>, report: &mut MathReport) {
        let mut index = 0;
        while index < nodes.len() {
            let Node::Element(element) = &mut nodes[index] else {
                index += 1;
                continue;
            };
            let Some(container) = Container::classify(element) else {
                self.walk(&mut element.children, report);
                index += 1;
                continue;
            };

            let ordinal = report.semantic + report.heuristic + report.unrecoverable + 1;
            let replacement = match extract(element) {
                Extraction::HasSemanticAnnotation(tex) => {
                    report.semantic += 1;
                    self.emit(&tex, container.display, report)
                }
                Extraction::HeuristicOnly(text) => {
                    report.heuristic += 1;
                    report.warn(format!(
                        "math expression {ordinal} has no TeX annotation; \
                         recovered \"{text}\" from the rendered glyphs, check it by hand"
                    ));
                    vec![Node::text(self.delimiters.wrap(&text, container.display))]
                }
                Extraction::Unrecoverable(e) => {
                    report.unrecoverable += 1;
                    report.warn(format!(
                        "math expression {ordinal} could not be converted ({e}); kept as rendered"
                    ));
                    index += 1;
                    continue;
                }
            };

            let inserted = replacement.len();
            nodes.splice(index..=index, replacement);
            index += inserted;
        }
    }

    fn emit(&self, tex: &str, display: bool, report: &mut MathReport) -> Vec<Node> {
        match self.output {
            MathOutput::Source => vec![Node::text(self.delimiters.wrap(tex, display))],
            MathOutput::Mathml => match self.retypeset(tex, display) {
                Ok(nodes) => {
                    report.retypeset += 1;
                    nodes
                }
                Err(message) => {
                    report.warn(format!(
                        "could not typeset \"{tex}\" as MathML ({message}); writing TeX instead"
                    ));
                    vec![Node::text(self.delimiters.wrap(tex, display))]
                }
            },
        }
    }

    #[cfg(feature = "mathml")]
    fn retypeset(&self, tex: &str, display: bool) -> Result<Vec<Node>, String> {
        match render_math(tex, display) {
            MathResult::Success(mathml) => Ok(Document::parse_fragment(&mathml).children),
            MathResult::Error { message } => Err(message),
        }
    }

    #[cfg(not(feature = "mathml"))]
    fn retypeset(&self, _tex: &str, _display: bool) -> Result<Vec<Node>, String> {
        Err("built without MathML support".to_owned())
    }
}

/// Converts every typeset expression in `markup` back to TeX with the default
/// `\( \)` / `\[ \]` delimiters.
pub fn convert_rendered_math_to_source(markup: &str) -> String {
    MathConverter::default().convert_markup(markup).0
}

/// Removes KaTeX and MathJax scripts, styles and stylesheet links. Returns how
/// many elements were removed.
pub fn strip_engine_assets(nodes: &mut Vec<Node>) -> usize {
    let before = nodes.len();
    nodes.retain(|node| !node.as_element().is_some_and(is_engine_asset));
    let mut removed = before - nodes.len();
    for node in nodes.iter_mut() {
        if let Node::Element(element) = node {
            removed += strip_engine_assets(&mut element.children);
        }
    }
    removed
}

fn mentions_engine(text: &str) -> bool {
    let text = text.to_ascii_lowercase();
    text.contains("katex") || text.contains("mathjax") || text.contains("mjx-")
}

fn is_engine_asset(element: &Element) -> bool {
    if element.is("script") {
        element.attr("src").is_some_and(mentions_engine)
            || element
                .attr("type")
                .is_some_and(|ty| ty.to_ascii_lowercase().starts_with("math/tex"))
            || (element.attr("src").is_none() && mentions_engine(&element.text_content()))
    } else if element.is("style") {
        element.attr("id").is_some_and(mentions_engine) || mentions_engine(&element.text_content())
    } else if element.is("link") {
        element
            .attr("rel")
            .is_some_and(|rel| rel.eq_ignore_ascii_case("stylesheet"))
            && element.attr("href").is_some_and(mentions_engine)
    } else {
        false
    }
}
