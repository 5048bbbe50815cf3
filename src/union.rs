//! Geometric union of outlines.

use geo::{BooleanOps, Contains, Coord, LineString, MultiPolygon, Polygon};
use kurbo::{BezPath, PathEl, Point};

use crate::error::BoxError;

/// Computes the union of a set of outlines.
pub trait PathUnioner {
    /// Union `paths` into a single outline.
    ///
    /// An empty slice yields an empty outline.
    fn union(&self, paths: &[BezPath]) -> Result<BezPath, BoxError>;
}

/// Polygon union backed by `geo`.
///
/// Curves are flattened within `tolerance` first, so the result is polygonal.
/// Exterior rings are written with positive signed area and holes with
/// negative area, which renders correctly under the nonzero fill rule.
#[derive(Debug, Clone, Copy)]
pub struct GeoUnioner {
    pub tolerance: f64,
}

impl GeoUnioner {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }
}

impl Default for GeoUnioner {
    fn default() -> Self {
        Self::new(0.05)
    }
}

impl PathUnioner for GeoUnioner {
    fn union(&self, paths: &[BezPath]) -> Result<BezPath, BoxError> {
        if paths.is_empty() {
            return Ok(BezPath::new());
        }
        let shapes: Vec<MultiPolygon<f64>> = paths
            .iter()
            .map(|p| outline_to_polygons(p, self.tolerance))
            .collect();
        Ok(polygons_to_outline(&union_all(shapes)))
    }
}

/// Union in a balanced tree, which keeps intermediate results small.
fn union_all(mut shapes: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while shapes.len() > 1 {
        let mut next = Vec::with_capacity(shapes.len().div_ceil(2));
        let mut iter = shapes.into_iter();
        while let Some(a) = iter.next() {
            match iter.next() {
                Some(b) => next.push(a.union(&b)),
                None => next.push(a),
            }
        }
        shapes = next;
    }
    shapes.pop().unwrap_or_else(|| MultiPolygon::new(Vec::new()))
}

/// Convert one shape's outline into polygons under the nonzero fill rule.
///
/// Rings are applied from the outermost inwards. A ring adds area where the
/// winding number inside it becomes nonzero and cuts a hole where it drops
/// back to zero. Rings that nothing contains are always filled, whatever
/// their direction.
fn outline_to_polygons(path: &BezPath, tolerance: f64) -> MultiPolygon<f64> {
    let rings: Vec<(Polygon<f64>, f64)> = flatten_rings(path, tolerance)
        .into_iter()
        .map(|(ring, area)| (Polygon::new(ring, Vec::new()), area.signum()))
        .collect();

    // Winding number just outside each ring, and its nesting depth.
    let mut layers: Vec<(usize, i32, usize)> = rings
        .iter()
        .enumerate()
        .map(|(i, (polygon, _))| {
            let containers: Vec<f64> = rings
                .iter()
                .enumerate()
                .filter(|&(j, (other, _))| j != i && other.contains(polygon))
                .map(|(_, (_, sign))| *sign)
                .collect();
            let outside = containers.iter().sum::<f64>() as i32;
            (containers.len(), outside, i)
        })
        .collect();
    layers.sort_by_key(|&(depth, _, _)| depth);

    let mut result = MultiPolygon::new(Vec::new());
    for (_, outside, i) in layers {
        let (polygon, sign) = &rings[i];
        let inside = outside + *sign as i32;
        let ring = MultiPolygon::new(vec![polygon.clone()]);
        if outside == 0 && inside != 0 {
            result = result.union(&ring);
        } else if outside != 0 && inside == 0 {
            result = result.difference(&ring);
        }
    }
    result
}

/// Flatten every subpath into a closed ring with its signed area.
///
/// Rings without area are dropped.
fn flatten_rings(path: &BezPath, tolerance: f64) -> Vec<(LineString<f64>, f64)> {
    let mut rings = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();

    let mut finish = |ring: &mut Vec<Coord<f64>>| {
        let coords = std::mem::take(ring);
        let area = signed_area(&coords);
        if coords.len() >= 3 && area.abs() > f64::EPSILON {
            rings.push((LineString::new(coords), area));
        }
    };

    kurbo::flatten(path, tolerance, |el| match el {
        PathEl::MoveTo(p) => {
            finish(&mut current);
            current.push(coord(p));
        }
        PathEl::LineTo(p) => current.push(coord(p)),
        PathEl::ClosePath => finish(&mut current),
        // Flattening only emits lines.
        PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => current.push(coord(p)),
    });
    finish(&mut current);

    rings
}

fn coord(p: Point) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Shoelace area; the ring is treated as closed.
fn signed_area(coords: &[Coord<f64>]) -> f64 {
    let Some(&first) = coords.first() else {
        return 0.0;
    };
    let mut sum = 0.0;
    let mut prev = first;
    for &c in coords.iter().skip(1).chain(std::iter::once(&first)) {
        sum += prev.x * c.y - c.x * prev.y;
        prev = c;
    }
    sum / 2.0
}

fn polygons_to_outline(polygons: &MultiPolygon<f64>) -> BezPath {
    let mut out = BezPath::new();
    for polygon in polygons {
        push_ring(&mut out, polygon.exterior(), true);
        for hole in polygon.interiors() {
            push_ring(&mut out, hole, false);
        }
    }
    out
}

fn push_ring(out: &mut BezPath, ring: &LineString<f64>, exterior: bool) {
    let mut coords: Vec<Coord<f64>> = ring.coords().copied().collect();
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.len() < 3 {
        return;
    }
    if (signed_area(&coords) > 0.0) != exterior {
        coords.reverse();
    }

    out.move_to((coords[0].x, coords[0].y));
    for c in &coords[1..] {
        out.line_to((c.x, c.y));
    }
    out.close_path();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{parse_path, to_bez_path};
    use kurbo::{Circle, Rect, Shape};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> BezPath {
        Rect::new(x0, y0, x1, y1).to_path(0.1)
    }

    fn subpath_areas(path: &BezPath) -> Vec<f64> {
        let mut areas = Vec::new();
        let mut current = BezPath::new();
        for el in path.elements() {
            if matches!(el, PathEl::MoveTo(_)) && !current.elements().is_empty() {
                areas.push(current.area());
                current = BezPath::new();
            }
            current.push(*el);
        }
        if !current.elements().is_empty() {
            areas.push(current.area());
        }
        areas
    }

    #[test]
    fn test_empty_input() {
        let merged = GeoUnioner::default().union(&[]).unwrap();
        assert!(merged.elements().is_empty());
    }

    #[test]
    fn test_overlapping_rects() {
        let merged = GeoUnioner::default()
            .union(&[rect(0.0, 0.0, 10.0, 10.0), rect(5.0, 5.0, 15.0, 15.0)])
            .unwrap();
        assert!((merged.area() - 175.0).abs() < 1e-6);
        assert_eq!(subpath_areas(&merged).len(), 1);
        let bbox = merged.bounding_box();
        assert!((bbox.width() - 15.0).abs() < 1e-9 && (bbox.height() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_shapes_stay_separate() {
        let merged = GeoUnioner::default()
            .union(&[rect(0.0, 0.0, 1.0, 1.0), rect(5.0, 5.0, 7.0, 7.0)])
            .unwrap();
        let mut areas = subpath_areas(&merged);
        areas.sort_by(f64::total_cmp);
        assert_eq!(areas.len(), 2);
        assert!((areas[0] - 1.0).abs() < 1e-9);
        assert!((areas[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_shape_with_hole() {
        let mut donut = rect(0.0, 0.0, 10.0, 10.0);
        donut.move_to((3.0, 3.0));
        donut.line_to((3.0, 7.0));
        donut.line_to((7.0, 7.0));
        donut.line_to((7.0, 3.0));
        donut.close_path();

        let merged = GeoUnioner::default().union(&[donut]).unwrap();
        assert!((merged.area() - 84.0).abs() < 1e-6);
        let areas = subpath_areas(&merged);
        assert_eq!(areas.len(), 2);
        assert!(areas.iter().any(|a| (*a - 100.0).abs() < 1e-6));
        assert!(areas.iter().any(|a| (*a + 16.0).abs() < 1e-6));
    }

    #[test]
    fn test_disjoint_subpaths_of_opposite_winding_are_both_filled() {
        let outline = to_bez_path(&parse_path("M0 0h10v10h-10z M20 0v10h10v-10z").unwrap());
        let merged = GeoUnioner::default().union(&[outline]).unwrap();
        assert!((merged.area() - 200.0).abs() < 1e-6);
        assert_eq!(subpath_areas(&merged).len(), 2);
    }

    #[test]
    fn test_island_inside_a_hole() {
        let outline = to_bez_path(
            &parse_path("M0 0h30v30h-30z M5 5v20h20v-20z M10 10h10v10h-10z").unwrap(),
        );
        let merged = GeoUnioner::default().union(&[outline]).unwrap();
        assert!((merged.area() - (900.0 - 400.0 + 100.0)).abs() < 1e-6);
    }

    #[test]
    fn test_same_winding_inner_ring_stays_filled() {
        let outline = to_bez_path(&parse_path("M0 0h10v10h-10z M3 3h4v4h-4z").unwrap());
        let merged = GeoUnioner::default().union(&[outline]).unwrap();
        assert!((merged.area() - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_ring_enclosing_a_hole() {
        // A frame made of four bars unions into an outline with a hole.
        let bars = [
            rect(0.0, 0.0, 10.0, 2.0),
            rect(0.0, 8.0, 10.0, 10.0),
            rect(0.0, 0.0, 2.0, 10.0),
            rect(8.0, 0.0, 10.0, 10.0),
        ];
        let merged = GeoUnioner::default().union(&bars).unwrap();
        assert!((merged.area() - 64.0).abs() < 1e-6);
        let areas = subpath_areas(&merged);
        assert!(areas.iter().any(|a| *a < 0.0));
    }

    #[test]
    fn test_curves_are_flattened_within_tolerance() {
        let circle = Circle::new((0.0, 0.0), 10.0).to_path(0.01);
        let merged = GeoUnioner::new(0.01).union(&[circle]).unwrap();
        assert!(merged.elements().iter().all(|el| !matches!(el, PathEl::CurveTo(..) | PathEl::QuadTo(..))));
        assert!((merged.area() - std::f64::consts::PI * 100.0).abs() < 1.0);
    }

    #[test]
    fn test_degenerate_outlines_are_ignored() {
        let mut line = BezPath::new();
        line.move_to((0.0, 0.0));
        line.line_to((10.0, 10.0));
        let merged = GeoUnioner::default()
            .union(&[line, rect(0.0, 0.0, 2.0, 2.0)])
            .unwrap();
        assert!((merged.area() - 4.0).abs() < 1e-9);
    }
}
