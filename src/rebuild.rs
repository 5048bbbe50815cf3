//! Output document construction.

use kurbo::BezPath;

use crate::ast::{Document, Element, SVG_NS};
use crate::path::write_bez_path;

/// Build the output document: a root `<svg>` carrying every attribute of the
/// source root, holding a single `<path>` with the merged outline.
///
/// No path is written when `merged` is empty. `fill` is written on the path
/// when given; otherwise the path takes the SVG default.
pub fn rebuild(source: &Document, merged: &BezPath, precision: u8, fill: Option<&str>) -> Document {
    let mut root = Element::new("svg");
    root.attributes = source.root.attributes.clone();
    root.set_attr("xmlns", SVG_NS);

    if !merged.elements().is_empty() {
        let mut path = Element::new("path");
        path.set_attr("d", write_bez_path(merged, precision));
        if let Some(fill) = fill {
            path.set_attr("fill", fill);
        }
        root.push_element(path);
    }

    Document {
        xml_declaration: source.xml_declaration.clone(),
        root,
    }
}
