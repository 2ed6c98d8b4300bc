use std::sync::LazyLock;

use regex::Regex;

pub const AVOID_ID_CHARS: &[char] = &[
    '!', '#', '$', '&', '\'', '(', ')', '*', '+', ',', ';', '=', ':', '@', '%', '[', ']', '?', '/',
    '~', '|', '{', '}', '^', '`', '.', '\\', '"', '<', '>',
];

/// Last path component of a reference, accepting both separators and ignoring
/// any query or fragment.
pub fn basename(reference: &str) -> &str {
    let reference = reference
        .split(['?', '#'])
        .next()
        .unwrap_or(reference);
    reference
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(reference)
}

/// Splits a basename into stem and extension. Leading dots are part of the stem.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => (&name[..dot], Some(&name[dot + 1..])),
        _ => (name, None),
    }
}

/// Does `reference` name the same file as `key`?
///
/// Exact matches are checked by the caller first; this is the basename fallback
/// used when the converter rewrote directories (`img/a.png` vs `a.png`). When
/// only one side carries an extension, as with `\includegraphics{shape}`
/// rendered to `shape.png`, the stems are compared instead.
pub fn same_basename(reference: &str, key: &str) -> bool {
    let (name, other) = (basename(reference), basename(key));
    if name.is_empty() || other.is_empty() {
        return false;
    }
    if name == other {
        return true;
    }
    match (split_extension(name), split_extension(other)) {
        ((stem, Some(_)), (other_stem, None)) | ((stem, None), (other_stem, Some(_))) => {
            stem == other_stem
        }
        _ => false,
    }
}

/// Lowercase, dash separated identifier fragment for an element id.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '_' || c == '-' || AVOID_ID_CHARS.contains(&c))
            && !slug.is_empty()
            && !slug.ends_with('-')
        {
            slug.push('-');
        } else if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// 1-based line number of a byte offset.
pub fn line_of(source: &str, position: usize) -> usize {
    source[..position.min(source.len())].matches('\n').count() + 1
}

/// Byte offset where the line containing `position` starts.
pub fn line_start(source: &str, position: usize) -> usize {
    source[..position.min(source.len())]
        .rfind('\n')
        .map_or(0, |newline| newline + 1)
}

/// Is `position` inside a `%` comment on its line?
pub fn is_commented(source: &str, position: usize) -> bool {
    let start = line_start(source, position);
    let mut escaped = false;
    for c in source[start..position].chars() {
        match c {
            '\\' => escaped = !escaped,
            '%' if !escaped => return true,
            _ => escaped = false,
        }
    }
    false
}

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex is valid"));

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text.trim(), " ").into_owned()
}
