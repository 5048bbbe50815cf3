//! Canonicalization pass.
//!
//! Rewrites a document into a flat form: every painted shape becomes a
//! top-level `<path>` with absolute coordinates and an explicit fill.
//! Definitions and clip paths are carried over untouched.

use crate::ast::*;
use crate::error::SvgError;
use crate::path::write_bez_path;
use crate::shapes::{collect_shapes, is_display_none};
use crate::style::StyleParser;

/// Containers whose content is only rendered by reference.
const KEPT_CONTAINERS: &[&str] = &[
    "defs",
    "clipPath",
    "symbol",
    "mask",
    "pattern",
    "marker",
    "linearGradient",
    "radialGradient",
    "filter",
    "style",
];

/// Elements walked through when looking for kept containers.
const RENDERING_CONTAINERS: &[&str] = &["g", "a", "switch", "svg"];

/// Produce the canonical form of `doc`.
pub fn canonicalize(
    doc: &Document,
    styles: &dyn StyleParser,
    precision: u8,
    tolerance: f64,
) -> Result<Document, SvgError> {
    let mut source = doc.clone();
    remove_comments(&mut source.root);
    remove_metadata(&mut source.root);
    remove_hidden(&mut source.root);

    let mut kept = Vec::new();
    take_kept_containers(&mut source.root, &mut kept);

    let shapes = collect_shapes(&source, styles, tolerance)?;

    let mut root = Element {
        name: source.root.name.clone(),
        attributes: source.root.attributes.clone(),
        children: Vec::new(),
    };
    for container in kept {
        root.push_element(container);
    }
    let mut lifted = 0;
    for shape in shapes {
        if shape.outline.elements().is_empty() {
            continue;
        }
        let mut path = Element::new("path");
        path.set_attr("d", write_bez_path(&shape.outline, precision));
        if let Some(fill) = &shape.fill {
            path.set_attr("fill", fill.as_str());
        }
        root.push_element(path);
        lifted += 1;
    }
    log::debug!("Canonical form has {} path(s)", lifted);

    Ok(Document {
        xml_declaration: source.xml_declaration,
        root,
    })
}

/// Move kept containers out of the rendering tree, in document order.
fn take_kept_containers(elem: &mut Element, out: &mut Vec<Element>) {
    let mut remaining = Vec::with_capacity(elem.children.len());
    for node in std::mem::take(&mut elem.children) {
        match node {
            Node::Element(e) if e.is_any(KEPT_CONTAINERS) => out.push(e),
            Node::Element(mut e) if e.is_any(RENDERING_CONTAINERS) => {
                take_kept_containers(&mut e, out);
                remaining.push(Node::Element(e));
            }
            other => remaining.push(other),
        }
    }
    elem.children = remaining;
}

/// Remove comment nodes.
fn remove_comments(elem: &mut Element) {
    elem.children.retain(|node| !matches!(node, Node::Comment(_)));

    for child in elem.child_elements_mut() {
        remove_comments(child);
    }
}

/// Remove metadata and editor-specific elements and attributes.
fn remove_metadata(elem: &mut Element) {
    let metadata_elements = ["metadata", "title", "desc"];

    elem.children.retain(|node| {
        if let Node::Element(e) = node {
            !metadata_elements.contains(&e.name.local.as_str()) && !is_editor_namespace(&e.name)
        } else {
            true
        }
    });

    elem.attributes.retain(|attr| !is_editor_namespace(&attr.name));

    for child in elem.child_elements_mut() {
        remove_metadata(child);
    }
}

fn is_editor_namespace(name: &QName) -> bool {
    matches!(name.prefix.as_deref(), Some("sodipodi" | "inkscape"))
}

/// Remove hidden elements (display:none, visibility:hidden, opacity:0).
fn remove_hidden(elem: &mut Element) {
    elem.children.retain(|node| {
        if let Node::Element(e) = node {
            !is_hidden(e)
        } else {
            true
        }
    });

    for child in elem.child_elements_mut() {
        remove_hidden(child);
    }
}

fn is_hidden(elem: &Element) -> bool {
    if is_display_none(elem) {
        return true;
    }

    if elem.get_attr("visibility").map(str::trim) == Some("hidden") {
        return true;
    }

    if let Some(opacity) = elem.get_attr("opacity")
        && opacity.trim().parse::<f64>().ok() == Some(0.0)
    {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_svg;
    use crate::path::{parse_path, to_bez_path};
    use crate::style::CssStyleParser;
    use kurbo::Shape as _;

    fn canonical(svg: &str) -> Document {
        let doc = parse_svg(svg).unwrap();
        canonicalize(&doc, &CssStyleParser, 3, 0.01).unwrap()
    }

    fn child_names(elem: &Element) -> Vec<String> {
        elem.child_elements().map(|e| e.name.local.clone()).collect()
    }

    #[test]
    fn test_flattens_groups_and_bakes_transforms() {
        let doc = canonical(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
  <!-- logo -->
  <g transform="translate(10 20)" style="fill:red">
    <rect width="10" height="10"/>
    <g fill="blue"><circle cx="5" cy="5" r="5"/></g>
  </g>
</svg>"#,
        );
        assert_eq!(child_names(&doc.root), ["path", "path"]);
        assert_eq!(doc.root.get_attr("viewBox"), Some("0 0 100 100"));

        let paths: Vec<_> = doc.root.child_elements().collect();
        assert_eq!(paths[0].get_attr("fill"), Some("red"));
        assert_eq!(paths[1].get_attr("fill"), Some("blue"));

        let outline = to_bez_path(&parse_path(paths[0].get_attr("d").unwrap()).unwrap());
        let bbox = outline.bounding_box();
        assert_eq!((bbox.x0, bbox.y0, bbox.x1, bbox.y1), (10.0, 20.0, 20.0, 30.0));
    }

    #[test]
    fn test_keeps_definitions_and_clip_paths() {
        let doc = canonical(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
  <defs><linearGradient id="lg"/></defs>
  <g>
    <clipPath id="c"><rect width="1" height="1" fill="transparent"/></clipPath>
    <rect width="2" height="2" fill="url(#lg)"/>
  </g>
</svg>"##,
        );
        assert_eq!(child_names(&doc.root), ["defs", "clipPath", "path"]);
        let clip = doc.root.child_elements().nth(1).unwrap();
        assert_eq!(child_names(clip), ["rect"]);
    }

    #[test]
    fn test_drops_hidden_and_metadata() {
        let doc = canonical(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:inkscape="http://www.inkscape.org/namespaces/inkscape" inkscape:version="1.0">
  <title>Drawing</title>
  <metadata/>
  <rect width="1" height="1" visibility="hidden"/>
  <rect width="1" height="1" opacity="0"/>
  <rect width="1" height="1" style="display:none"/>
  <rect width="3" height="3"/>
</svg>"#,
        );
        assert_eq!(child_names(&doc.root), ["path"]);
        assert!(
            doc.root
                .attributes
                .iter()
                .all(|a| a.name.prefix.as_deref() != Some("inkscape"))
        );
        assert_eq!(doc.root.child_elements().next().unwrap().get_attr("fill"), None);
    }

    #[test]
    fn test_invalid_shape_is_an_error() {
        let doc = parse_svg(r#"<svg xmlns="http://www.w3.org/2000/svg"><path d="Z Q"/></svg>"#).unwrap();
        assert!(canonicalize(&doc, &CssStyleParser, 3, 0.01).is_err());
    }
}
