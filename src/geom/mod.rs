//! Uniform polygon/bbox operations over the canonical geometry engine.
//!
//! Thin wrapper around the `geo` crate's predicates so the rest of the
//! crate never imports `geo::Relate`/`geo::BooleanOps` directly; keeping
//! the adapter surface narrow is what lets boundary-closed containment
//! and intersection semantics live in one place.

mod crs;

pub use crs::{reproject, CanonicalCrs};

use geo::{Area, BooleanOps, BoundingRect, Geometry, MultiPolygon, OpType, Rect, Relate};

use crate::error::{GeometryError, Result};

/// Bounding box of a geometry, or `None` if the geometry is empty.
pub fn bounds(g: &Geometry<f64>) -> Option<Rect<f64>> {
    g.bounding_rect()
}

/// `true` iff `a` contains `b`, boundary-inclusive (closed-set containment:
/// a feature touching the raster footprint's boundary counts as
/// contained).
pub fn contains(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    a.relate(b).is_covers()
}

/// `true` iff `a` and `b` overlap at all, boundary-inclusive.
pub fn intersects(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    a.relate(b).is_intersects()
}

/// `true` iff `a` and `b` overlap in more than a shared boundary: a pure
/// tangent touch (shared edge or vertex between two polygons with no
/// actual overlapping area) counts as no overlap. Geometries that aren't
/// polygonal (points, lines) have no area of their own to test, so their
/// overlap is left to `contains`/`intersects` and this always reports
/// `true` for them.
pub fn has_area_overlap(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    match (as_multi_polygon(a), as_multi_polygon(b)) {
        (Some(mp_a), Some(mp_b)) => mp_a.boolean_op(&mp_b, OpType::Intersection).unsigned_area() > 0.0,
        _ => true,
    }
}

fn as_multi_polygon(g: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match g {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        _ => None,
    }
}

/// Reject empty geometries, zero-area polygons, and self-intersecting
/// rings. `id` is carried through for the error message only.
pub fn is_valid(id: &str, g: &Geometry<f64>) -> Result<()> {
    match g {
        Geometry::Point(p) => {
            if p.x().is_nan() || p.y().is_nan() {
                return Err(GeometryError::Invalid {
                    id: id.to_string(),
                    reason: "point has NaN coordinate".to_string(),
                }
                .into());
            }
        }
        Geometry::Polygon(poly) => {
            if poly.exterior().0.is_empty() {
                return Err(GeometryError::Empty { id: id.to_string() }.into());
            }
            if poly.unsigned_area() <= 0.0 {
                return Err(GeometryError::Invalid {
                    id: id.to_string(),
                    reason: "polygon has zero or negative area".to_string(),
                }
                .into());
            }
            if !ring_is_simple(poly) {
                return Err(GeometryError::Invalid {
                    id: id.to_string(),
                    reason: "exterior ring self-intersects".to_string(),
                }
                .into());
            }
        }
        Geometry::MultiPolygon(mp) => {
            if mp.0.is_empty() {
                return Err(GeometryError::Empty { id: id.to_string() }.into());
            }
            for poly in &mp.0 {
                is_valid(id, &Geometry::Polygon(poly.clone()))?;
            }
        }
        _ => {
            return Err(GeometryError::Invalid {
                id: id.to_string(),
                reason: "only points, polygons, and multipolygons are supported".to_string(),
            }
            .into());
        }
    }
    Ok(())
}

/// Cheap self-intersection check on the exterior ring: no two non-adjacent
/// segments cross. O(n^2) but rings in this domain (feature/raster
/// footprints) are small.
fn ring_is_simple(poly: &geo::Polygon<f64>) -> bool {
    let coords = &poly.exterior().0;
    let n = coords.len();
    if n < 4 {
        return false; // not even a closed triangle
    }
    let segments: Vec<(Coord, Coord)> = (0..n - 1).map(|i| (coords[i], coords[i + 1])).collect();
    for i in 0..segments.len() {
        for j in (i + 2)..segments.len() {
            if i == 0 && j == segments.len() - 1 {
                continue; // first and last segment share the closing vertex
            }
            if segments_cross(segments[i], segments[j]) {
                return false;
            }
        }
    }
    true
}

type Coord = geo::Coord<f64>;

fn orientation(a: Coord, b: Coord, c: Coord) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn on_segment(a: Coord, b: Coord, p: Coord) -> bool {
    p.x.min(a.x.min(b.x)) <= p.x
        && p.x <= a.x.max(b.x)
        && p.y.min(a.y.min(b.y)) <= p.y
        && p.y <= a.y.max(b.y)
}

/// Classic CCW-orientation segment intersection test (proper crossing or
/// a shared endpoint lying on the other segment counts as a crossing).
fn segments_cross(s1: (Coord, Coord), s2: (Coord, Coord)) -> bool {
    let (p1, q1) = s1;
    let (p2, q2) = s2;
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if (o1 > 0.0) != (o2 > 0.0) && (o3 > 0.0) != (o4 > 0.0) && o1 != 0.0 && o2 != 0.0 && o3 != 0.0 && o4 != 0.0 {
        return true;
    }
    if o1 == 0.0 && on_segment(p1, q1, p2) {
        return true;
    }
    if o2 == 0.0 && on_segment(p1, q1, q2) {
        return true;
    }
    if o3 == 0.0 && on_segment(p2, q2, p1) {
        return true;
    }
    if o4 == 0.0 && on_segment(p2, q2, q1) {
        return true;
    }
    false
}
