//! SVG serialization to XML.

use crate::ast::*;

/// Markup writing options.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Spaces per nesting level; 0 writes everything on one line.
    pub indent: usize,
    /// Write the document's XML declaration, if it has one.
    pub xml_declaration: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            indent: 2,
            xml_declaration: true,
        }
    }
}

impl WriteOptions {
    /// Single-line output, no declaration.
    pub fn compact() -> Self {
        Self {
            indent: 0,
            xml_declaration: false,
        }
    }
}

/// Serialize a Document to an SVG string.
pub fn serialize(doc: &Document, options: &WriteOptions) -> String {
    let mut out = String::new();

    if options.xml_declaration
        && let Some(ref decl) = doc.xml_declaration
    {
        out.push_str("<?xml version=\"");
        out.push_str(&decl.version);
        out.push('"');
        if let Some(ref enc) = decl.encoding {
            out.push_str(" encoding=\"");
            out.push_str(enc);
            out.push('"');
        }
        if let Some(standalone) = decl.standalone {
            out.push_str(" standalone=\"");
            out.push_str(if standalone { "yes" } else { "no" });
            out.push('"');
        }
        out.push_str("?>");
        if options.indent > 0 {
            out.push('\n');
        }
    }

    serialize_element(&mut out, &doc.root, options, 0);

    if options.indent > 0 {
        out.push('\n');
    }
    out
}

fn serialize_element(out: &mut String, elem: &Element, options: &WriteOptions, depth: usize) {
    out.push('<');
    out.push_str(&elem.name.full_name());

    for attr in &elem.attributes {
        out.push(' ');
        out.push_str(&attr.name.full_name());
        out.push_str("=\"");
        push_escaped_attr(out, &attr.value);
        out.push('"');
    }

    if elem.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');

    // Mixed content keeps its exact layout: indenting would change text.
    let block = options.indent > 0
        && elem
            .children
            .iter()
            .all(|n| !matches!(n, Node::Text(_) | Node::CData(_)));

    for child in &elem.children {
        if block {
            push_newline(out, options.indent * (depth + 1));
        }
        serialize_node(out, child, options, depth + 1);
    }
    if block {
        push_newline(out, options.indent * depth);
    }

    out.push_str("</");
    out.push_str(&elem.name.full_name());
    out.push('>');
}

fn serialize_node(out: &mut String, node: &Node, options: &WriteOptions, depth: usize) {
    match node {
        Node::Element(elem) => serialize_element(out, elem, options, depth),
        Node::Text(text) => push_escaped_text(out, text),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::CData(data) => {
            out.push_str("<![CDATA[");
            out.push_str(data);
            out.push_str("]]>");
        }
        Node::ProcessingInstruction { target, content } => {
            out.push_str("<?");
            out.push_str(target);
            if let Some(c) = content {
                out.push(' ');
                out.push_str(c);
            }
            out.push_str("?>");
        }
    }
}

fn push_newline(out: &mut String, width: usize) {
    out.push('\n');
    out.extend(std::iter::repeat_n(' ', width));
}

fn push_escaped_attr(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("&quot;"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn push_escaped_text(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}
