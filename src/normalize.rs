//! Normalization of arbitrary SVG into a simplified equivalent.
//!
//! The normalized form resolves CSS, `use` references, basic shapes and text
//! so that later passes see plain paths with explicit fills.

use std::sync::OnceLock;

use kurbo::Affine;

use crate::ast::{Document, Element, Node};
use crate::error::BoxError;
use crate::shapes::viewport_transform;

/// Rewrites SVG markup into an equivalent, simplified SVG.
pub trait Normalizer {
    fn normalize(&self, svg: &[u8]) -> Result<String, BoxError>;
}

/// Normalizer backed by `usvg`.
///
/// Text is converted to outlines with the system fonts, which are loaded on
/// first use.
#[derive(Default)]
pub struct UsvgNormalizer {
    options: OnceLock<usvg::Options<'static>>,
}

impl UsvgNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn options(&self) -> &usvg::Options<'static> {
        self.options.get_or_init(|| {
            let mut options = usvg::Options::default();
            options.fontdb_mut().load_system_fonts();
            log::debug!("Loaded {} font face(s)", options.fontdb.len());
            options
        })
    }

    /// The fonts text is outlined with.
    pub fn fonts(&self) -> &usvg::fontdb::Database {
        &self.options().fontdb
    }
}

impl Normalizer for UsvgNormalizer {
    fn normalize(&self, svg: &[u8]) -> Result<String, BoxError> {
        let tree = usvg::Tree::from_data(svg, self.options())?;

        let outlined = count_text(tree.root());
        if mentions_text(svg) && outlined == 0 {
            log::warn!(
                "Text could not be converted to outlines ({} font face(s) available) and is left out",
                self.fonts().len()
            );
        }

        let out = tree.to_string(&usvg::WriteOptions::default());
        log::debug!("Normalized {} byte(s) into {} byte(s)", svg.len(), out.len());
        Ok(out)
    }
}

fn count_text(group: &usvg::Group) -> usize {
    group
        .children()
        .iter()
        .map(|node| match node {
            usvg::Node::Text(_) => 1,
            usvg::Node::Group(g) => count_text(g),
            _ => 0,
        })
        .sum()
}

fn mentions_text(svg: &[u8]) -> bool {
    svg.windows(5).any(|w| w == b"<text")
}

/// Put a normalized document back into the coordinate space of `source`.
///
/// The normalizer resolves the root `viewBox` and `preserveAspectRatio` into
/// the geometry and rewrites the root attributes. This undoes that: the root
/// gets the attributes of `source` and the content is wrapped in a group
/// carrying the inverse of the source viewport transform.
pub(crate) fn restore_source_root(doc: &mut Document, source: &Element) {
    let inverse = viewport_transform(source).inverse();

    let children = std::mem::take(&mut doc.root.children);
    if inverse == Affine::IDENTITY {
        doc.root.children = children;
    } else {
        let [a, b, c, d, e, f] = inverse.as_coeffs();
        let mut group = Element::new("g");
        group.set_attr("transform", format!("matrix({} {} {} {} {} {})", a, b, c, d, e, f));
        group.children = children;
        doc.root.children = vec![Node::Element(group)];
    }

    doc.root.attributes = source.attributes.clone();
}
