//! Preview and export passes over the `<img>` elements of a rendered tree.
//!
//! Both passes walk images in document order and pair each one with the next
//! source occurrence of the same file. They differ only in what ends up in
//! `src`: a transient preview reference, or the portable data URL.

use std::collections::HashSet;

use crate::accessibility::effective_alt_text;
use crate::dom::{Document, Element, Node};
use crate::occurrence::{OccurrenceCounters, OccurrenceMap};
use crate::registry::ImageRegistry;
use crate::types::{AccessibilityLevel, AnnotationFragment};
use crate::utils::slugify;

/// Bookkeeping attribute naming the source key an image was matched to.
pub const FILENAME_ATTR: &str = "data-folio-filename";
/// Bookkeeping attribute holding the zero-based occurrence index.
pub const OCCURRENCE_ATTR: &str = "data-folio-occurrence";
const BOOKKEEPING_PREFIX: &str = "data-folio-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    Preview,
    Export,
}

/// What a single pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImagePassReport {
    /// Images whose `src` was substituted
    pub replaced: usize,
    /// Images that received alt text from an occurrence
    pub annotated: usize,
    /// Source keys referenced by the tree but not registered, deduplicated
    pub missing: Vec<String>,
    pub warnings: Vec<String>,
}

impl ImagePassReport {
    fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

pub struct ImagePass<'a> {
    mode: PassMode,
    occurrences: &'a OccurrenceMap,
    registry: &'a ImageRegistry,
    long_description_label: &'a str,
    counters: OccurrenceCounters,
    ids: HashSet<String>,
    report: ImagePassReport,
}

impl<'a> ImagePass<'a> {
    pub fn new(
        mode: PassMode,
        occurrences: &'a OccurrenceMap,
        registry: &'a ImageRegistry,
        long_description_label: &'a str,
    ) -> Self {
        Self {
            mode,
            occurrences,
            registry,
            long_description_label,
            counters: OccurrenceCounters::new(),
            ids: HashSet::new(),
            report: ImagePassReport::default(),
        }
    }

    #[tracing::instrument(level = "debug", skip_all, fields(mode = ?self.mode))]
    pub fn run(mut self, document: &mut Document) -> ImagePassReport {
        collect_ids(&document.children, &mut self.ids);
        // Disclosures for images outside any figure are spliced in place, so
        // nothing is ever left pending at the top level.
        let leftover = self.walk(&mut document.children, false);
        document.children.extend(leftover);
        tracing::debug!(
            replaced = self.report.replaced,
            annotated = self.report.annotated,
            missing = self.report.missing.len(),
            "image pass finished"
        );
        self.report
    }

    /// Rewrites images under `nodes`. Disclosures belonging inside a figure are
    /// returned so the caller can place them after that figure.
    fn walk(&mut self, nodes: &mut Vec<Node>, in_figure: bool) -> Vec<Node> {
        let mut pending = Vec::new();
        let mut index = 0;
        while index < nodes.len() {
            let mut after = Vec::new();
            if let Node::Element(element) = &mut nodes[index] {
                if element.is("img") {
                    if let Some(details) = self.rewrite_image(element) {
                        if in_figure {
                            pending.push(details);
                        } else {
                            after.push(details);
                        }
                    }
                } else if element.is("figure") {
                    after = self.walk(&mut element.children, true);
                } else {
                    pending.extend(self.walk(&mut element.children, in_figure));
                }
            }
            let inserted = after.len();
            for (offset, node) in after.into_iter().enumerate() {
                nodes.insert(index + 1 + offset, node);
            }
            index += 1 + inserted;
        }
        pending
    }

    fn rewrite_image(&mut self, img: &mut Element) -> Option<Node> {
        let reference = match img.attr(FILENAME_ATTR).or_else(|| img.attr("src")) {
            Some(reference) if !reference.starts_with("data:") => reference.to_owned(),
            _ => return None,
        };

        let key = match self.occurrences.resolve_key(&reference) {
            Some(key) => key.to_owned(),
            None => match self.registry.resolve(&reference) {
                Some(entry) => entry.filename.clone(),
                None => {
                    tracing::debug!(
                        %reference,
                        "image not referenced by the source, leaving as is"
                    );
                    return None;
                }
            },
        };
        let entry = self
            .registry
            .get(&key)
            .or_else(|| self.registry.resolve(&reference));

        let occurrences = self.occurrences;
        let occurrence = self.counters.peek(&key);
        let fragment = occurrences.next_occurrence(&mut self.counters, &key);

        match &entry {
            Some(entry) => {
                match self.mode {
                    PassMode::Preview => img.set_attr("src", entry.preview_url.as_str()),
                    PassMode::Export => img.set_attr("src", entry.data_url.as_str()),
                }
                self.report.replaced += 1;
            }
            None => {
                if !self.report.missing.contains(&key) {
                    self.report.missing.push(key.clone());
                }
                self.report.warn(format!(
                    "image {key} is not registered; its reference was left unchanged"
                ));
            }
        }

        match self.mode {
            PassMode::Preview => {
                img.set_attr(FILENAME_ATTR, key.as_str());
                img.set_attr(OCCURRENCE_ATTR, occurrence.to_string());
            }
            PassMode::Export => img.retain_attrs(|name, _| !name.starts_with(BOOKKEEPING_PREFIX)),
        }

        let Some(fragment) = fragment else {
            self.report.warn(format!(
                "image {key} is rendered more often than the source annotates it \
                 (occurrence {}); keeping the converter's attributes",
                occurrence + 1
            ));
            return None;
        };
        self.apply_annotations(img, fragment, occurrence)
    }

    fn apply_annotations(
        &mut self,
        img: &mut Element,
        fragment: &AnnotationFragment,
        occurrence: usize,
    ) -> Option<Node> {
        self.report.annotated += 1;
        if fragment.is_decorative {
            img.set_attr("alt", "");
            img.set_attr("role", "presentation");
            img.remove_attr("aria-describedby");
            return None;
        }

        img.set_attr("alt", effective_alt_text(fragment));
        match fragment.accessibility_status.level {
            AccessibilityLevel::Fallback => self.report.warn(format!(
                "{} (line {}): using the figure caption as alt text",
                fragment.filename, fragment.line
            )),
            AccessibilityLevel::Poor => self.report.warn(format!(
                "{} (line {}): no alt text or caption, using a generic description",
                fragment.filename, fragment.line
            )),
            AccessibilityLevel::Optimal | AccessibilityLevel::Good => {}
        }

        let description = fragment.long_description.as_deref()?;
        let id = format!("longdesc-{}-{}", slugify(&fragment.filename), occurrence + 1);
        img.set_attr("aria-describedby", id.as_str());
        if !self.ids.insert(id.clone()) {
            return None;
        }
        Some(Node::Element(long_description(
            &id,
            self.long_description_label,
            description,
        )))
    }
}

/// `<details>` disclosure carrying an extended description.
pub fn long_description(id: &str, label: &str, text: &str) -> Element {
    Element::new("details")
        .with_attr("class", "image-longdesc")
        .with_attr("id", id)
        .with_child(Node::Element(
            Element::new("summary").with_child(Node::text(label)),
        ))
        .with_child(Node::Element(Element::new("p").with_child(Node::text(text))))
}

fn collect_ids(nodes: &[Node], ids: &mut HashSet<String>) {
    for node in nodes {
        if let Node::Element(element) = node {
            if let Some(id) = element.attr("id") {
                ids.insert(id.to_owned());
            }
            collect_ids(&element.children, ids);
        }
    }
}
