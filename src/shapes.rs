//! Shape extraction: every painted element becomes an absolute outline.

use std::str::FromStr;

use kurbo::{Affine, BezPath, Circle, Ellipse, Point, Rect, Shape as _, Vec2};

use crate::ast::{Document, Element};
use crate::error::SvgError;
use crate::fill::declared_fill;
use crate::path::{append_arc, parse_path, to_bez_path};
use crate::style::{StyleParser, declarations};

/// Elements converted into outlines.
pub const SHAPE_ELEMENTS: &[&str] = &[
    "path", "rect", "circle", "ellipse", "line", "polyline", "polygon",
];

/// Subtrees that are only rendered by reference.
const NON_RENDERING: &[&str] = &[
    "defs",
    "symbol",
    "mask",
    "pattern",
    "marker",
    "linearGradient",
    "radialGradient",
    "filter",
    "style",
    "script",
    "title",
    "desc",
    "metadata",
];

const CONTAINERS: &[&str] = &["svg", "g", "a", "switch", "clipPath"];

/// Painted content this layer does not outline.
const UNCONVERTED: &[&str] = &["use", "text", "image", "foreignObject"];

/// A painted element and its outline in root coordinates.
#[derive(Debug, Clone)]
pub struct Shape {
    /// Position among all shapes of the document, in document order.
    pub index: usize,
    /// Local name of the source element.
    pub element: String,
    /// Resolved fill, normalized. `None` is the SVG default (opaque black).
    pub fill: Option<String>,
    pub outline: BezPath,
}

/// Collect the shapes of `doc` in document order.
///
/// Transforms of the shape and its ancestors are applied, except the root
/// element's own transform, which stays on the root. Fills are inherited
/// from ancestors when a shape declares none.
pub fn collect_shapes(
    doc: &Document,
    styles: &dyn StyleParser,
    tolerance: f64,
) -> Result<Vec<Shape>, SvgError> {
    let mut walker = Walker {
        styles,
        tolerance,
        viewport: Viewport::of(&doc.root),
        shapes: Vec::new(),
    };
    let root = Inherited {
        transform: Affine::IDENTITY,
        fill: declared_fill(&doc.root, styles),
    };
    walker.visit(&doc.root, &root)?;
    Ok(walker.shapes)
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    X,
    Y,
    Diagonal,
}

/// The root viewport, used to resolve percentages.
#[derive(Debug, Clone, Copy)]
struct Viewport {
    width: f64,
    height: f64,
}

impl Viewport {
    fn of(root: &Element) -> Self {
        if let Some(vb) = root
            .get_attr("viewBox")
            .and_then(|s| svgtypes::ViewBox::from_str(s).ok())
        {
            return Self {
                width: vb.w,
                height: vb.h,
            };
        }
        let absolute = |name: &str| {
            root.get_attr(name)
                .and_then(|s| svgtypes::Length::from_str(s.trim()).ok())
                .filter(|l| l.unit != svgtypes::LengthUnit::Percent)
                .map(|l| absolute_length(l).unwrap_or(l.number))
        };
        Self {
            width: absolute("width").unwrap_or(100.0),
            height: absolute("height").unwrap_or(100.0),
        }
    }

    fn resolve(&self, len: svgtypes::Length, axis: Axis) -> f64 {
        if len.unit == svgtypes::LengthUnit::Percent {
            let base = match axis {
                Axis::X => self.width,
                Axis::Y => self.height,
                Axis::Diagonal => {
                    ((self.width * self.width + self.height * self.height) / 2.0).sqrt()
                }
            };
            return base * len.number / 100.0;
        }
        absolute_length(len).unwrap_or(len.number)
    }
}

/// Transform from the root's user space to its viewport: the root's own
/// `transform`, then the `viewBox` fitted to `width`/`height` according to
/// `preserveAspectRatio`.
pub(crate) fn viewport_transform(root: &Element) -> Affine {
    let own = own_transform(root);
    let Some(vb) = root
        .get_attr("viewBox")
        .and_then(|s| svgtypes::ViewBox::from_str(s).ok())
        .filter(|vb| vb.w > 0.0 && vb.h > 0.0)
    else {
        return own;
    };

    let size = |name: &str, fallback: f64| {
        root.get_attr(name)
            .and_then(|s| svgtypes::Length::from_str(s.trim()).ok())
            .and_then(absolute_length)
            .filter(|n| *n > 0.0)
            .unwrap_or(fallback)
    };
    let (width, height) = (size("width", vb.w), size("height", vb.h));
    let aspect = root
        .get_attr("preserveAspectRatio")
        .and_then(|s| svgtypes::AspectRatio::from_str(s).ok())
        .unwrap_or_default();

    let (sx, sy) = (width / vb.w, height / vb.h);
    let fitted = if aspect.align == svgtypes::Align::None {
        Affine::scale_non_uniform(sx, sy) * Affine::translate((-vb.x, -vb.y))
    } else {
        use svgtypes::Align::*;

        let s = if aspect.slice { sx.max(sy) } else { sx.min(sy) };
        let (free_x, free_y) = (width - vb.w * s, height - vb.h * s);
        let tx = match aspect.align {
            XMinYMin | XMinYMid | XMinYMax => 0.0,
            XMidYMin | XMidYMid | XMidYMax => free_x / 2.0,
            _ => free_x,
        };
        let ty = match aspect.align {
            XMinYMin | XMidYMin | XMaxYMin => 0.0,
            XMinYMid | XMidYMid | XMaxYMid => free_y / 2.0,
            _ => free_y,
        };
        Affine::translate((tx, ty)) * Affine::scale(s) * Affine::translate((-vb.x, -vb.y))
    };
    fitted * own
}

/// Convert a non-percentage length to user units (96 DPI, 16px font).
fn absolute_length(len: svgtypes::Length) -> Option<f64> {
    use svgtypes::LengthUnit;

    let n = len.number;
    Some(match len.unit {
        LengthUnit::None | LengthUnit::Px => n,
        LengthUnit::Em => n * 16.0,
        LengthUnit::Ex => n * 8.0,
        LengthUnit::In => n * 96.0,
        LengthUnit::Cm => n * 96.0 / 2.54,
        LengthUnit::Mm => n * 96.0 / 25.4,
        LengthUnit::Pt => n * 4.0 / 3.0,
        LengthUnit::Pc => n * 16.0,
        LengthUnit::Percent => return None,
    })
}

struct Inherited {
    transform: Affine,
    fill: Option<String>,
}

struct Walker<'a> {
    styles: &'a dyn StyleParser,
    tolerance: f64,
    viewport: Viewport,
    shapes: Vec<Shape>,
}

impl Walker<'_> {
    fn visit(&mut self, parent: &Element, inherited: &Inherited) -> Result<(), SvgError> {
        for elem in parent.child_elements() {
            if elem.is_any(NON_RENDERING) || is_display_none(elem) {
                continue;
            }

            let transform = inherited.transform * own_transform(elem);
            let fill = declared_fill(elem, self.styles).or_else(|| inherited.fill.clone());

            if elem.is_any(SHAPE_ELEMENTS) {
                let index = self.shapes.len();
                let mut outline = self
                    .outline(elem)
                    .map_err(|reason| SvgError::InvalidShape {
                        index,
                        element: elem.name.local.clone(),
                        reason,
                    })?;
                outline.apply_affine(transform);
                self.shapes.push(Shape {
                    index,
                    element: elem.name.local.clone(),
                    fill,
                    outline,
                });
            } else if elem.is_any(CONTAINERS) {
                let mut transform = transform;
                if elem.is("svg") {
                    let x = self.length(elem, "x", Axis::X, 0.0).unwrap_or(0.0);
                    let y = self.length(elem, "y", Axis::Y, 0.0).unwrap_or(0.0);
                    transform = transform * Affine::translate((x, y));
                }
                self.visit(elem, &Inherited { transform, fill })?;
            } else if elem.is_any(UNCONVERTED) {
                log::warn!(
                    "<{}> is not converted to a shape and is left out of the union",
                    elem.name.local
                );
            } else {
                log::debug!("Ignoring <{}>", elem.name.full_name());
            }
        }
        Ok(())
    }

    /// The element's outline in its own coordinate system.
    fn outline(&self, elem: &Element) -> Result<BezPath, String> {
        let tolerance = self.tolerance;
        match elem.name.local.as_str() {
            "path" => {
                let d = elem.get_attr("d").unwrap_or("");
                let path = parse_path(d).map_err(|e| e.to_string())?;
                Ok(to_bez_path(&path))
            }
            "rect" => {
                let x = self.length(elem, "x", Axis::X, 0.0)?;
                let y = self.length(elem, "y", Axis::Y, 0.0)?;
                let w = self.length(elem, "width", Axis::X, 0.0)?;
                let h = self.length(elem, "height", Axis::Y, 0.0)?;
                if w <= 0.0 || h <= 0.0 {
                    return Ok(BezPath::new());
                }
                let rx = self.optional_length(elem, "rx", Axis::X)?;
                let ry = self.optional_length(elem, "ry", Axis::Y)?;
                let (rx, ry) = match (rx, ry) {
                    (Some(rx), Some(ry)) => (rx, ry),
                    (Some(r), None) | (None, Some(r)) => (r, r),
                    (None, None) => (0.0, 0.0),
                };
                let rx = rx.clamp(0.0, w / 2.0);
                let ry = ry.clamp(0.0, h / 2.0);
                if rx > 0.0 && ry > 0.0 {
                    Ok(rounded_rect(x, y, w, h, rx, ry))
                } else {
                    Ok(Rect::new(x, y, x + w, y + h).to_path(tolerance))
                }
            }
            "circle" => {
                let cx = self.length(elem, "cx", Axis::X, 0.0)?;
                let cy = self.length(elem, "cy", Axis::Y, 0.0)?;
                let r = self.length(elem, "r", Axis::Diagonal, 0.0)?;
                if r <= 0.0 {
                    return Ok(BezPath::new());
                }
                Ok(Circle::new((cx, cy), r).to_path(tolerance))
            }
            "ellipse" => {
                let cx = self.length(elem, "cx", Axis::X, 0.0)?;
                let cy = self.length(elem, "cy", Axis::Y, 0.0)?;
                let rx = self.optional_length(elem, "rx", Axis::X)?;
                let ry = self.optional_length(elem, "ry", Axis::Y)?;
                let (rx, ry) = match (rx, ry) {
                    (Some(rx), Some(ry)) => (rx, ry),
                    (Some(r), None) | (None, Some(r)) => (r, r),
                    (None, None) => (0.0, 0.0),
                };
                if rx <= 0.0 || ry <= 0.0 {
                    return Ok(BezPath::new());
                }
                Ok(Ellipse::new((cx, cy), (rx, ry), 0.0).to_path(tolerance))
            }
            "line" => {
                let mut path = BezPath::new();
                path.move_to((
                    self.length(elem, "x1", Axis::X, 0.0)?,
                    self.length(elem, "y1", Axis::Y, 0.0)?,
                ));
                path.line_to((
                    self.length(elem, "x2", Axis::X, 0.0)?,
                    self.length(elem, "y2", Axis::Y, 0.0)?,
                ));
                Ok(path)
            }
            "polyline" | "polygon" => {
                let points = elem.get_attr("points").unwrap_or("");
                let mut path = BezPath::new();
                for (i, (x, y)) in svgtypes::PointsParser::from(points).enumerate() {
                    if i == 0 {
                        path.move_to((x, y));
                    } else {
                        path.line_to((x, y));
                    }
                }
                // An open polyline is filled as if closed.
                if path.elements().len() > 1 {
                    path.close_path();
                } else {
                    path = BezPath::new();
                }
                Ok(path)
            }
            other => Err(format!("<{}> has no outline", other)),
        }
    }

    fn length(&self, elem: &Element, name: &str, axis: Axis, default: f64) -> Result<f64, String> {
        Ok(self.optional_length(elem, name, axis)?.unwrap_or(default))
    }

    fn optional_length(&self, elem: &Element, name: &str, axis: Axis) -> Result<Option<f64>, String> {
        let Some(value) = elem.get_attr(name).map(str::trim) else {
            return Ok(None);
        };
        if value == "auto" {
            return Ok(None);
        }
        let len = svgtypes::Length::from_str(value)
            .map_err(|e| format!("invalid {} '{}': {}", name, value, e))?;
        Ok(Some(self.viewport.resolve(len, axis)))
    }
}

fn rounded_rect(x: f64, y: f64, w: f64, h: f64, rx: f64, ry: f64) -> BezPath {
    let radii = Vec2::new(rx, ry);
    let corners = [
        (Point::new(x + w - rx, y), Point::new(x + w, y + ry)),
        (Point::new(x + w, y + h - ry), Point::new(x + w - rx, y + h)),
        (Point::new(x + rx, y + h), Point::new(x, y + h - ry)),
        (Point::new(x, y + ry), Point::new(x + rx, y)),
    ];

    let mut path = BezPath::new();
    path.move_to(Point::new(x + rx, y));
    for (from, to) in corners {
        path.line_to(from);
        append_arc(&mut path, from, to, radii, 0.0, false, true);
    }
    path.close_path();
    path
}

fn own_transform(elem: &Element) -> Affine {
    let Some(value) = elem.get_attr("transform") else {
        return Affine::IDENTITY;
    };
    match svgtypes::Transform::from_str(value) {
        Ok(ts) => Affine::new([ts.a, ts.b, ts.c, ts.d, ts.e, ts.f]),
        Err(e) => {
            log::warn!(
                "Ignoring invalid transform '{}' on <{}>: {}",
                value,
                elem.name.local,
                e
            );
            Affine::IDENTITY
        }
    }
}

pub(crate) fn is_display_none(elem: &Element) -> bool {
    if elem.get_attr("display").map(str::trim) == Some("none") {
        return true;
    }
    elem.get_attr("style").is_some_and(|style| {
        declarations(style).any(|decl| decl.name.eq_ignore_ascii_case("display") && decl.value == "none")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_svg;
    use crate::style::CssStyleParser;
    use kurbo::Shape as _;

    fn shapes(svg: &str) -> Vec<Shape> {
        let doc = parse_svg(svg).unwrap();
        collect_shapes(&doc, &CssStyleParser, 0.01).unwrap()
    }

    fn area(shape: &Shape) -> f64 {
        shape.outline.area().abs()
    }

    #[test]
    fn test_basic_shapes() {
        let found = shapes(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 100">
  <rect x="10" y="10" width="20" height="10"/>
  <circle cx="50" cy="50" r="10"/>
  <ellipse cx="50" cy="50" rx="10" ry="5"/>
  <polygon points="0,0 10,0 10,10"/>
  <polyline points="0 0 10 0 10 10 0 10"/>
  <line x1="0" y1="0" x2="10" y2="10"/>
  <path d="M0 0h5v5h-5z"/>
</svg>"#,
        );
        let names: Vec<_> = found.iter().map(|s| s.element.as_str()).collect();
        assert_eq!(
            names,
            ["rect", "circle", "ellipse", "polygon", "polyline", "line", "path"]
        );
        assert!((area(&found[0]) - 200.0).abs() < 1e-9);
        assert!((area(&found[1]) - std::f64::consts::PI * 100.0).abs() < 0.5);
        assert!((area(&found[2]) - std::f64::consts::PI * 50.0).abs() < 0.5);
        assert!((area(&found[3]) - 50.0).abs() < 1e-9);
        assert!((area(&found[4]) - 100.0).abs() < 1e-9);
        assert_eq!(area(&found[5]), 0.0);
        assert!((area(&found[6]) - 25.0).abs() < 1e-9);
        assert!(found.iter().enumerate().all(|(i, s)| s.index == i));
    }

    #[test]
    fn test_rounded_rect_area() {
        let found = shapes(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="20" height="20" rx="5"/></svg>"#,
        );
        let expected = 400.0 - (100.0 - std::f64::consts::PI * 25.0);
        assert!((area(&found[0]) - expected).abs() < 0.1);
    }

    #[test]
    fn test_transforms_apply() {
        let found = shapes(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
  <g transform="translate(100 0)">
    <rect width="10" height="10" transform="scale(2)"/>
  </g>
</svg>"#,
        );
        let bbox = found[0].outline.bounding_box();
        assert_eq!((bbox.x0, bbox.y0, bbox.x1, bbox.y1), (100.0, 0.0, 120.0, 20.0));
    }

    #[test]
    fn test_fill_inheritance() {
        let found = shapes(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
  <g fill="white">
    <rect width="1" height="1"/>
    <rect width="1" height="1" style="fill: Red"/>
    <g style="fill:blue"><rect width="1" height="1" fill="inherit"/></g>
  </g>
  <rect width="1" height="1"/>
</svg>"#,
        );
        let fills: Vec<_> = found.iter().map(|s| s.fill.as_deref()).collect();
        assert_eq!(fills, [Some("white"), Some("red"), Some("blue"), None]);
    }

    #[test]
    fn test_skipped_subtrees() {
        let found = shapes(
            r##"<svg xmlns="http://www.w3.org/2000/svg">
  <defs><rect id="r" width="5" height="5"/></defs>
  <mask id="m"><rect width="5" height="5" fill="white"/></mask>
  <rect width="5" height="5" display="none"/>
  <g style="display: none"><circle r="4"/></g>
  <use href="#r"/>
  <circle r="3"/>
</svg>"##,
        );
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].element, "circle");
    }

    #[test]
    fn test_percentages_and_units() {
        let found = shapes(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 200 100">
  <rect width="50%" height="50%"/>
  <rect width="1in" height="1"/>
</svg>"#,
        );
        assert!((area(&found[0]) - 5000.0).abs() < 1e-9);
        assert!((area(&found[1]) - 96.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_path_reports_index() {
        let doc = parse_svg(
            r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="1" height="1"/><path d="M0 0 L"/></svg>"#,
        )
        .unwrap();
        match collect_shapes(&doc, &CssStyleParser, 0.01) {
            Err(SvgError::InvalidShape { index, element, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(element, "path");
            }
            other => panic!("expected InvalidShape, got {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_shapes_are_empty() {
        let found = shapes(
            r#"<svg xmlns="http://www.w3.org/2000/svg">
  <rect width="0" height="10"/>
  <circle r="-1"/>
  <polygon points="5,5"/>
</svg>"#,
        );
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|s| s.outline.elements().is_empty()));
    }

    #[test]
    fn test_viewport_transform() {
        let root = |attrs: &str| parse_svg(&format!("<svg {}/>", attrs)).unwrap().root;

        let stretch = viewport_transform(&root(
            r#"width="64" height="32" viewBox="0 0 128 64" preserveAspectRatio="none""#,
        ));
        assert_eq!(stretch * Point::new(128.0, 64.0), Point::new(64.0, 32.0));

        // Default xMidYMid meet centres the narrower axis.
        let meet = viewport_transform(&root(r#"width="200" height="100" viewBox="10 10 50 50""#));
        assert_eq!(meet * Point::new(10.0, 10.0), Point::new(50.0, 0.0));
        assert_eq!(meet * Point::new(60.0, 60.0), Point::new(150.0, 100.0));

        let slice = viewport_transform(&root(
            r#"width="200" height="100" viewBox="0 0 50 50" preserveAspectRatio="xMinYMin slice""#,
        ));
        assert_eq!(slice * Point::new(50.0, 50.0), Point::new(200.0, 200.0));

        assert_eq!(viewport_transform(&root(r#"width="10""#)), Affine::IDENTITY);
        assert_eq!(viewport_transform(&root(r#"viewBox="0 0 10 10""#)), Affine::IDENTITY);
    }
}
