//! Source text scanning: image-inclusion commands, their comment annotations and
//! the caption of the figure that encloses each occurrence.
//!
//! Annotations are comment lines placed directly above a command:
//!
//! ```latex
//! % @alt: A red triangle on a white background
//! % @longdesc: The triangle is equilateral and
//! %   points upwards.
//! \includegraphics[width=3cm]{shape.png}
//! ```
//!
//! `@decorative` marks an image that carries no information.

use std::sync::LazyLock;

use regex::Regex;

use crate::accessibility::assess_accessibility;
use crate::types::{AnnotationFragment, Annotations};
use crate::utils::{collapse_whitespace, is_commented, line_of, line_start};

static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\includegraphics\*?\s*(?:\[[^\]]*\])?\s*\{(?P<file>[^}]*)\}")
        .expect("static regex is valid")
});

static FIGURE_ENV_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?P<kind>begin|end)\s*\{(?P<env>figure\*?|subfigure|wrapfigure)\}")
        .expect("static regex is valid")
});

static CAPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\caption\*?\s*(?:\[[^\]]*\])?\s*\{").expect("static regex is valid")
});

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\label\s*\{[^}]*\}").expect("static regex is valid"));

/// Finds every uncommented image-inclusion command, in source order, with its
/// annotations, caption and accessibility status.
pub fn detect_image_references(source: &str) -> Vec<AnnotationFragment> {
    INCLUDE_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let command = caps.get(0)?;
            if is_commented(source, command.start()) {
                return None;
            }
            let filename = caps.name("file")?.as_str().trim();
            if filename.is_empty() {
                tracing::warn!(
                    line = line_of(source, command.start()),
                    "image command without a file name"
                );
                return None;
            }
            Some(fragment_at(source, command.start(), filename))
        })
        .collect()
}

fn fragment_at(source: &str, position: usize, filename: &str) -> AnnotationFragment {
    let annotations = parse_annotations(source, position);
    let caption_text = extract_caption_at_position(source, position);
    let accessibility_status = assess_accessibility(&annotations, caption_text.as_deref());
    AnnotationFragment {
        filename: filename.to_owned(),
        alt_text: annotations.alt_text,
        is_decorative: annotations.is_decorative,
        long_description: annotations.long_description,
        caption_text,
        position,
        line: line_of(source, position),
        accessibility_status,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind<'a> {
    Blank,
    /// Comment body with the leading `%` characters removed
    Comment(&'a str),
    Other,
}

impl<'a> LineKind<'a> {
    fn classify(line: &'a str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            LineKind::Blank
        } else if let Some(body) = trimmed.strip_prefix('%') {
            LineKind::Comment(body.trim_start_matches('%').trim())
        } else {
            LineKind::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Next line index to look at, moving upwards
    Scanning { line: usize },
    Stopped,
}

impl ScanState {
    fn above(line: usize) -> Self {
        line.checked_sub(1)
            .map_or(ScanState::Stopped, |line| ScanState::Scanning { line })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive<'a> {
    Decorative,
    Alt(&'a str),
    LongDescription(&'a str),
    Unknown,
}

impl<'a> Directive<'a> {
    fn parse(body: &'a str) -> Option<Self> {
        let rest = body.strip_prefix('@')?;
        let name_len = rest
            .find(|c: char| c == ':' || c.is_whitespace())
            .unwrap_or(rest.len());
        let (name, value) = rest.split_at(name_len);
        let value = value.trim_start();
        let value = value.strip_prefix(':').unwrap_or(value).trim();
        Some(match name.to_ascii_lowercase().as_str() {
            "decorative" => Directive::Decorative,
            "alt" => Directive::Alt(value),
            "longdesc" | "long-description" | "longdescription" => {
                Directive::LongDescription(value)
            }
            _ => Directive::Unknown,
        })
    }
}

/// Reads the annotation comments directly above the command at `position`.
///
/// Lines are scanned upwards from the line before the command. Blank and
/// comment lines are consumed; the first other line stops the scan.
pub fn parse_annotations(source: &str, position: usize) -> Annotations {
    let preceding = &source[..line_start(source, position)];
    let lines: Vec<&str> = preceding.lines().collect();

    let mut consumed = Vec::new();
    let mut state = ScanState::above(lines.len());
    while let ScanState::Scanning { line } = state {
        state = match LineKind::classify(lines[line]) {
            kind @ (LineKind::Blank | LineKind::Comment(_)) => {
                consumed.push(kind);
                ScanState::above(line)
            }
            LineKind::Other => ScanState::Stopped,
        };
    }

    let mut annotations = Annotations::default();
    let mut long_parts: Vec<&str> = Vec::new();
    let mut in_long_description = false;

    // consumed is bottom-up; directives are read top-down
    for kind in consumed.into_iter().rev() {
        let body = match kind {
            LineKind::Comment(body) => body,
            _ => {
                in_long_description = false;
                continue;
            }
        };
        match Directive::parse(body) {
            Some(Directive::Decorative) => {
                annotations.is_decorative = true;
                in_long_description = false;
            }
            Some(Directive::Alt(text)) => {
                if !text.is_empty() {
                    annotations.alt_text = Some(text.to_owned());
                }
                in_long_description = false;
            }
            Some(Directive::LongDescription(text)) => {
                if !text.is_empty() {
                    long_parts.push(text);
                }
                in_long_description = true;
            }
            Some(Directive::Unknown) => in_long_description = false,
            None if in_long_description && !body.is_empty() => long_parts.push(body),
            None => {}
        }
    }

    if !long_parts.is_empty() {
        annotations.long_description = Some(long_parts.join(" "));
    }
    annotations
}

/// Caption of the innermost figure environment open at `position`, if any.
///
/// Environments that were already closed before `position` are never used, so
/// a reused filename in a later figure does not pick up an earlier caption.
pub fn extract_caption_at_position(source: &str, position: usize) -> Option<String> {
    let markers: Vec<_> = FIGURE_ENV_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if is_commented(source, whole.start()) {
                return None;
            }
            let is_begin = caps.name("kind")?.as_str() == "begin";
            let env = caps.name("env")?.as_str();
            Some((is_begin, env, whole.start(), whole.end()))
        })
        .collect();

    let mut open: Vec<(&str, usize)> = Vec::new();
    let mut after = markers.len();
    for (index, &(is_begin, env, start, end)) in markers.iter().enumerate() {
        if start >= position {
            after = index;
            break;
        }
        if is_begin {
            open.push((env, end));
        } else if let Some(depth) = open.iter().rposition(|(name, _)| *name == env) {
            open.truncate(depth);
        }
    }

    let (env, body_start) = *open.last()?;
    let mut depth = 0usize;
    let body_end = markers[after..]
        .iter()
        .filter(|(_, name, ..)| *name == env)
        .find_map(|&(is_begin, _, start, _)| {
            if is_begin {
                depth += 1;
                None
            } else if depth == 0 {
                Some(start)
            } else {
                depth -= 1;
                None
            }
        })?;

    first_caption(source, &markers, body_start, body_end)
}

/// First caption directly inside `start..end`, skipping captions of nested
/// environments.
fn first_caption(
    source: &str,
    markers: &[(bool, &str, usize, usize)],
    start: usize,
    end: usize,
) -> Option<String> {
    let nesting_at = |offset: usize| {
        markers
            .iter()
            .filter(|(_, _, marker, _)| (start..offset).contains(marker))
            .fold(0isize, |depth, &(is_begin, ..)| {
                if is_begin { depth + 1 } else { depth - 1 }
            })
    };
    let span = &source[start..end];
    CAPTION_RE
        .find_iter(span)
        .filter(|caption| !is_commented(source, start + caption.start()))
        .filter(|caption| nesting_at(start + caption.start()) == 0)
        .find_map(|caption| {
            let body = balanced_group(&span[caption.end()..])?;
            let text = collapse_whitespace(&LABEL_RE.replace_all(body, ""));
            (!text.is_empty()).then_some(text)
        })
}

/// Contents up to the brace closing an already opened group.
fn balanced_group(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '{' => depth += 1,
            '}' if depth == 0 => return Some(&text[..index]),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}
