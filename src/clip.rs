//! Keeps clip-path geometry out of the union.
//!
//! Shapes inside `<clipPath>` only define a clipping region. They get a
//! transparent fill so that the shape filter always drops them.

use crate::ast::{Document, Element};
use crate::error::SvgError;
use crate::parse::parse_svg;
use crate::serialize::{WriteOptions, serialize};
use crate::style::declarations;

/// Fill written on protected shapes.
pub const PROTECTED_FILL: &str = "transparent";

/// Elements that can paint inside a clip path.
const GRAPHICAL_ELEMENTS: &[&str] = &[
    "path", "rect", "circle", "ellipse", "line", "polyline", "polygon", "text", "use",
];

/// Parse `markup`, protect every clip path and write the result back.
///
/// The input is left untouched; a new string is returned.
pub fn protect_clip_paths(markup: &str) -> Result<String, SvgError> {
    let mut doc = parse_svg(markup)?;
    let count = protect_document(&mut doc);
    log::debug!("Protected {} shape(s) inside clip paths", count);
    Ok(serialize(
        &doc,
        &WriteOptions {
            indent: 0,
            xml_declaration: true,
        },
    ))
}

/// Protect the clip paths of an already parsed document.
///
/// Returns the number of shapes whose fill was overwritten.
pub fn protect_document(doc: &mut Document) -> usize {
    fn visit(elem: &mut Element) -> usize {
        if elem.is("clipPath") {
            // Nested clip paths are covered by the subtree walk.
            elem.child_elements_mut().map(protect_subtree).sum()
        } else {
            elem.child_elements_mut().map(visit).sum()
        }
    }
    visit(&mut doc.root)
}

fn protect_subtree(elem: &mut Element) -> usize {
    let mut count = 0;
    if elem.is_any(GRAPHICAL_ELEMENTS) {
        elem.set_attr("fill", PROTECTED_FILL);
        strip_style_fill(elem);
        count += 1;
    }
    for child in elem.child_elements_mut() {
        count += protect_subtree(child);
    }
    count
}

/// Drop `fill` declarations from the inline style so the attribute wins.
fn strip_style_fill(elem: &mut Element) {
    let Some(style) = elem.get_attr("style") else {
        return;
    };
    let kept: Vec<String> = declarations(style)
        .filter(|decl| !decl.name.eq_ignore_ascii_case("fill"))
        .map(|decl| {
            if decl.important {
                format!("{}:{} !important", decl.name, decl.value)
            } else {
                format!("{}:{}", decl.name, decl.value)
            }
        })
        .collect();
    if kept.is_empty() {
        elem.remove_attr("style");
    } else {
        elem.set_attr("style", kept.join(";"));
    }
}
