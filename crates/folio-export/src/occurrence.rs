//! Per-filename occurrence bookkeeping.
//!
//! Filenames repeat across a document and the rendered tree carries no stable
//! identifiers, so the only correlation between a source annotation and a
//! rendered image is order: the n-th `<img>` for `shape.png` gets the n-th
//! annotation written for `shape.png`.

use std::collections::HashMap;

use crate::types::AnnotationFragment;
use crate::utils::same_basename;

/// `filename -> fragments in source order`. Rebuilt from scratch on every parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccurrenceMap {
    groups: HashMap<String, Vec<AnnotationFragment>>,
}

/// Per-pass cursor into an [`OccurrenceMap`]. Never reuse across passes.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceCounters {
    next: HashMap<String, usize>,
}

impl OccurrenceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next lookup for `filename` will return.
    pub fn peek(&self, filename: &str) -> usize {
        self.next.get(filename).copied().unwrap_or(0)
    }
}

/// Groups fragments by filename, preserving source order inside each group.
pub fn build_occurrence_map(
    fragments: impl IntoIterator<Item = AnnotationFragment>,
) -> OccurrenceMap {
    let mut groups: HashMap<String, Vec<AnnotationFragment>> = HashMap::new();
    for fragment in fragments {
        groups
            .entry(fragment.filename.clone())
            .or_default()
            .push(fragment);
    }
    OccurrenceMap { groups }
}

impl OccurrenceMap {
    pub fn get(&self, filename: &str) -> Option<&[AnnotationFragment]> {
        self.groups.get(filename).map(Vec::as_slice)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of occurrences across all filenames.
    pub fn occurrence_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Key under which `reference` (an `<img src>` or bookkeeping value) is
    /// grouped: an exact key first, otherwise a unique basename match.
    pub fn resolve_key(&self, reference: &str) -> Option<&str> {
        if let Some((key, _)) = self.groups.get_key_value(reference) {
            return Some(key);
        }
        let mut candidates = self.filenames().filter(|key| same_basename(reference, key));
        let first = candidates.next()?;
        if candidates.next().is_some() {
            tracing::warn!(
                reference,
                "image reference matches several source files by name; not guessing"
            );
            return None;
        }
        Some(first)
    }

    /// Returns the fragment at the counter's position for `filename` and
    /// advances the counter.
    ///
    /// `None` means more rendered images reference `filename` than the source
    /// annotates (or the filename is unknown). Never falls back to a
    /// neighbouring filename's annotation.
    pub fn next_occurrence(
        &self,
        counters: &mut OccurrenceCounters,
        filename: &str,
    ) -> Option<&AnnotationFragment> {
        let index = counters.next.entry(filename.to_owned()).or_insert(0);
        let current = *index;
        *index += 1;
        let fragment = self.groups.get(filename).and_then(|group| group.get(current));
        if fragment.is_none() {
            tracing::warn!(
                filename,
                occurrence = current + 1,
                annotated = self.groups.get(filename).map_or(0, Vec::len),
                "more rendered images than annotated occurrences"
            );
        }
        fragment
    }
}
