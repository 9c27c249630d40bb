//! Property-based tests over small random sets of axis-aligned polygons
//! and points in EPSG:4326: edge soundness, edge completeness, count
//! consistency, index/table bijection, and CRS idempotence. Save/load
//! round-tripping and drop-inverts-add are covered as literal integration
//! scenarios in `tests/scenarios.rs`.

use geo::{Area, BooleanOps, Coord, Geometry, LineString, MultiPolygon, OpType, Point, Polygon};
use geoconnector::{AttrValue, Connector, Row};
use indexmap::IndexMap;
use proptest::collection::vec as pvec;
use proptest::prelude::*;

fn square(cx: f64, cy: f64, half: f64) -> Geometry<f64> {
    let ring = LineString::new(vec![
        Coord { x: cx - half, y: cy - half },
        Coord { x: cx + half, y: cy - half },
        Coord { x: cx + half, y: cy + half },
        Coord { x: cx - half, y: cy + half },
        Coord { x: cx - half, y: cy - half },
    ]);
    Geometry::Polygon(Polygon::new(ring, vec![]))
}

fn row(geometry: Geometry<f64>) -> Row {
    Row { geometry, attrs: IndexMap::new() }
}

/// Center/half-width coordinates kept small and coarse so footprints
/// overlap often enough to exercise both edge labels.
fn footprint() -> impl Strategy<Value = (f64, f64, f64)> {
    (0.0f64..20.0, 0.0f64..20.0, 0.5f64..4.0)
}

proptest! {
    /// Edge soundness: every edge's label matches the geometric
    /// relation it was derived from.
    #[test]
    fn edge_soundness(
        rasters in pvec(footprint(), 1..6),
        features in pvec(footprint(), 1..8),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = Connector::from_scratch(tmp.path(), 4326, Vec::new(), None);

        let raster_rows: Vec<_> = rasters
            .iter()
            .enumerate()
            .map(|(i, (cx, cy, half))| (format!("r{i}"), row(square(*cx, *cy, *half))))
            .collect();
        c.add_rasters(raster_rows, 4326).unwrap();

        let feature_rows: Vec<_> = features
            .iter()
            .enumerate()
            .map(|(i, (cx, cy, half))| (format!("f{i}"), row(square(*cx, *cy, *half))))
            .collect();
        c.add_vectors(feature_rows, 4326).unwrap();

        for i in 0..features.len() {
            let feature_id = format!("f{i}");
            let feature_geom = &c.vectors().get_row(&feature_id).unwrap().geometry;
            for raster_id in c.rasters_intersecting(&feature_id).unwrap() {
                let raster_geom = &c.rasters().get_row(&raster_id).unwrap().geometry;
                let is_contains = c.does_raster_contain(&raster_id, &feature_id).unwrap();
                prop_assert_eq!(is_contains, geoconnector_contains(raster_geom, feature_geom));
            }
        }
    }

    /// Edge completeness: every overlapping raster/feature pair has
    /// an edge in the graph.
    #[test]
    fn edge_completeness(
        rasters in pvec(footprint(), 1..6),
        features in pvec(footprint(), 1..8),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = Connector::from_scratch(tmp.path(), 4326, Vec::new(), None);

        let raster_rows: Vec<_> = rasters
            .iter()
            .enumerate()
            .map(|(i, (cx, cy, half))| (format!("r{i}"), row(square(*cx, *cy, *half))))
            .collect();
        c.add_rasters(raster_rows, 4326).unwrap();

        let feature_rows: Vec<_> = features
            .iter()
            .enumerate()
            .map(|(i, (cx, cy, half))| (format!("f{i}"), row(square(*cx, *cy, *half))))
            .collect();
        c.add_vectors(feature_rows.clone(), 4326).unwrap();

        for i in 0..rasters.len() {
            let raster_geom = &c.rasters().get_row(&format!("r{i}")).unwrap().geometry;
            for j in 0..features.len() {
                let feature_geom = &c.vectors().get_row(&format!("f{j}")).unwrap().geometry;
                let should_have_edge = geoconnector_classifies_as_edge(raster_geom, feature_geom);
                let has_edge = c.rasters_intersecting(&format!("f{j}")).unwrap().contains(&format!("r{i}"));
                prop_assert_eq!(should_have_edge, has_edge);
            }
        }
    }

    /// Count consistency: raster_count equals the number of incoming
    /// `contains` edges.
    #[test]
    fn count_consistency(
        rasters in pvec(footprint(), 1..6),
        features in pvec(footprint(), 1..8),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = Connector::from_scratch(tmp.path(), 4326, Vec::new(), None);

        let raster_rows: Vec<_> = rasters
            .iter()
            .enumerate()
            .map(|(i, (cx, cy, half))| (format!("r{i}"), row(square(*cx, *cy, *half))))
            .collect();
        c.add_rasters(raster_rows, 4326).unwrap();

        let feature_rows: Vec<_> = features
            .iter()
            .enumerate()
            .map(|(i, (cx, cy, half))| (format!("f{i}"), row(square(*cx, *cy, *half))))
            .collect();
        c.add_vectors(feature_rows, 4326).unwrap();

        for i in 0..features.len() {
            let feature_id = format!("f{i}");
            let expected = c.rasters_containing(&feature_id).unwrap().len() as i64;
            let actual = c.vectors().get_row(&feature_id).unwrap().attrs.get("raster_count").and_then(AttrValue::as_i64);
            prop_assert_eq!(actual, Some(expected));
        }
    }

    /// Index/table bijection: the spatial index covers exactly the
    /// union of both tables' ids, after adds and drops in either order.
    #[test]
    fn index_table_bijection(
        rasters in pvec(footprint(), 1..6),
        features in pvec(footprint(), 1..8),
        drop_a_raster in any::<bool>(),
    ) {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = Connector::from_scratch(tmp.path(), 4326, Vec::new(), None);

        let raster_rows: Vec<_> = rasters
            .iter()
            .enumerate()
            .map(|(i, (cx, cy, half))| (format!("r{i}"), row(square(*cx, *cy, *half))))
            .collect();
        c.add_rasters(raster_rows, 4326).unwrap();

        let feature_rows: Vec<_> = features
            .iter()
            .enumerate()
            .map(|(i, (cx, cy, half))| (format!("f{i}"), row(square(*cx, *cy, *half))))
            .collect();
        c.add_vectors(feature_rows, 4326).unwrap();

        if drop_a_raster && !rasters.is_empty() {
            c.drop_rasters(&["r0".to_string()]).unwrap();
        }

        prop_assert!(c.check_invariants().is_ok());
    }

    /// CRS idempotence: re-adding a row already in the canonical CRS
    /// with source_epsg == canonical produces bit-identical coordinates.
    #[test]
    fn crs_idempotence((cx, cy, half) in footprint()) {
        let tmp = tempfile::tempdir().unwrap();
        let mut c = Connector::from_scratch(tmp.path(), 4326, Vec::new(), None);
        let geometry = square(cx, cy, half);
        c.add_vectors(vec![("f0".to_string(), row(geometry.clone()))], 4326).unwrap();

        let stored = &c.vectors().get_row("f0").unwrap().geometry;
        match (stored, &geometry) {
            (Geometry::Polygon(a), Geometry::Polygon(b)) => {
                for (ca, cb) in a.exterior().coords().zip(b.exterior().coords()) {
                    prop_assert_eq!(ca.x.to_bits(), cb.x.to_bits());
                    prop_assert_eq!(ca.y.to_bits(), cb.y.to_bits());
                }
            }
            _ => prop_assert!(false, "expected polygons"),
        }
    }
}

fn geoconnector_contains(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    use geo::Relate;
    a.relate(b).is_covers()
}

fn geoconnector_intersects(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    use geo::Relate;
    a.relate(b).is_intersects()
}

/// Mirrors the classifier's edge rule: overlapping and either contained
/// or sharing more than a zero-area boundary touch.
fn geoconnector_classifies_as_edge(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
    geoconnector_intersects(a, b) && (geoconnector_contains(a, b) || has_area_overlap(a, b))
}

fn has_area_overlap(a: &Geometry<f64>, b: &Geometry<f64>) -> bool {
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

/// Drop inverses add: dropping exactly the rows just added restores
/// an empty connector, regardless of drop order.
#[test]
fn drop_inverses_add_restores_empty_connector() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = Connector::from_scratch(tmp.path(), 4326, Vec::new(), None);

    c.add_rasters(
        vec![
            ("r0".to_string(), row(square(0.0, 0.0, 5.0))),
            ("r1".to_string(), row(square(10.0, 10.0, 3.0))),
        ],
        4326,
    )
    .unwrap();
    c.add_vectors(
        vec![
            ("f0".to_string(), row(square(0.0, 0.0, 1.0))),
            ("f1".to_string(), row(Geometry::Point(Point::new(10.0, 10.0)))),
        ],
        4326,
    )
    .unwrap();

    // Drop in the reverse order from how they were added.
    c.drop_vectors(&["f1".to_string(), "f0".to_string()]).unwrap();
    c.drop_rasters(&["r1".to_string(), "r0".to_string()]).unwrap();

    assert_eq!(c.vectors().len(), 0);
    assert_eq!(c.rasters().len(), 0);
    c.check_invariants().unwrap();
}
