//! Owned, mutable HTML tree
//!
//! The rendered markup comes from an external converter. It is parsed once with
//! `scraper` (html5ever) and copied into this small tree so the export passes can
//! rewrite attributes and splice in nodes, then serialized back to markup.

use markdown_weaver_escape::{escape_html, escape_html_body_text};
use scraper::{ElementRef, Html};

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose text content is written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    Doctype(String),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out, &|_| false);
        out
    }

    pub(crate) fn collect_text(&self, out: &mut String, skip: &dyn Fn(&Element) -> bool) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) if !skip(element) => {
                for child in &element.children {
                    child.collect_text(out, skip);
                }
            }
            _ => {}
        }
    }

    fn write_html(&self, out: &mut String, raw_text: bool) {
        match self {
            Node::Element(element) => element.write_html(out),
            Node::Text(text) if raw_text => out.push_str(text),
            Node::Text(text) => {
                let _ = escape_html_body_text(&mut *out, text);
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Doctype(name) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercase local name
    pub name: String,
    /// Attributes in source order
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Sets `name`, keeping its position if it already exists.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .attrs
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self
            .attrs
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.attrs.remove(index).1)
    }

    pub fn retain_attrs(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.attrs.retain(|(key, value)| keep(key, value));
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class))
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.iter().any(|void| self.is(void))
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out, &|_| false);
        }
        out
    }

    /// First descendant element (depth first, document order) matching `pred`.
    pub fn find_descendant(&self, pred: &dyn Fn(&Element) -> bool) -> Option<&Element> {
        self.children.iter().find_map(|child| {
            let element = child.as_element()?;
            if pred(element) {
                Some(element)
            } else {
                element.find_descendant(pred)
            }
        })
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            let _ = escape_html(&mut *out, value);
            out.push('"');
        }
        out.push('>');
        if self.is_void() {
            return;
        }
        let raw_text = RAW_TEXT_ELEMENTS.iter().any(|raw| self.is(raw));
        for child in &self.children {
            child.write_html(out, raw_text);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    fn from_scraper(element: ElementRef<'_>) -> Self {
        let value = element.value();
        Self {
            name: value.name().to_owned(),
            attrs: value
                .attrs()
                .map(|(key, value)| (key.to_owned(), value.to_owned()))
                .collect(),
            children: element
                .children()
                .filter_map(|child| {
                    if let Some(child) = ElementRef::wrap(child) {
                        return Some(Node::Element(Self::from_scraper(child)));
                    }
                    match child.value() {
                        scraper::Node::Text(text) => {
                            let text: &str = text;
                            Some(Node::Text(text.to_owned()))
                        }
                        scraper::Node::Comment(comment) => {
                            let comment: &str = comment;
                            Some(Node::Comment(comment.to_owned()))
                        }
                        _ => None,
                    }
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// Markup that is a body fragment, as produced by most converters
    Fragment,
    /// A complete document with doctype, head and body
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub kind: DocumentKind,
    pub children: Vec<Node>,
}

impl Document {
    /// Parses `markup`, treating it as a full document when it starts with a
    /// doctype or an `<html>` tag and as a fragment otherwise.
    pub fn parse(markup: &str) -> Self {
        let head = markup.trim_start().get(..9).unwrap_or_default();
        if head.eq_ignore_ascii_case("<!doctype")
            || head.to_ascii_lowercase().starts_with("<html")
        {
            Self::parse_document(markup)
        } else {
            Self::parse_fragment(markup)
        }
    }

    pub fn parse_fragment(markup: &str) -> Self {
        let html = Html::parse_fragment(markup);
        let children = html
            .root_element()
            .children()
            .filter_map(|child| match ElementRef::wrap(child) {
                Some(element) => Some(Node::Element(Element::from_scraper(element))),
                None => match child.value() {
                    scraper::Node::Text(text) => {
                        let text: &str = text;
                        Some(Node::Text(text.to_owned()))
                    }
                    scraper::Node::Comment(comment) => {
                        let comment: &str = comment;
                        Some(Node::Comment(comment.to_owned()))
                    }
                    _ => None,
                },
            })
            .collect();
        Self {
            kind: DocumentKind::Fragment,
            children,
        }
    }

    pub fn parse_document(markup: &str) -> Self {
        let html = Html::parse_document(markup);
        let children = html
            .tree
            .root()
            .children()
            .filter_map(|child| match ElementRef::wrap(child) {
                Some(element) => Some(Node::Element(Element::from_scraper(element))),
                None => match child.value() {
                    scraper::Node::Doctype(doctype) => {
                        Some(Node::Doctype(doctype.name().to_owned()))
                    }
                    scraper::Node::Comment(comment) => {
                        let comment: &str = comment;
                        Some(Node::Comment(comment.to_owned()))
                    }
                    _ => None,
                },
            })
            .collect();
        Self {
            kind: DocumentKind::Full,
            children,
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_html(&mut out, false);
            if matches!(child, Node::Doctype(_)) {
                out.push('\n');
            }
        }
        out
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out, &|_| false);
        }
        out
    }

    /// Whether any element in the tree carries `id`.
    pub fn contains_id(&self, id: &str) -> bool {
        fn walk(nodes: &[Node], id: &str) -> bool {
            nodes.iter().any(|node| match node {
                Node::Element(element) => {
                    element.attr("id") == Some(id) || walk(&element.children, id)
                }
                _ => false,
            })
        }
        walk(&self.children, id)
    }

    /// All elements named `name`, in document order.
    pub fn elements_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        fn walk<'a>(nodes: &'a [Node], name: &str, out: &mut Vec<&'a Element>) {
            for node in nodes {
                if let Node::Element(element) = node {
                    if element.is(name) {
                        out.push(element);
                    }
                    walk(&element.children, name, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.children, name, &mut out);
        out
    }
}
