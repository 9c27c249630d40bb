//! Concrete end-to-end scenarios covering containment, boundary
//! intersection, raster removal, reprojected features, duplicate-id
//! rejection, and save/load round-tripping.

use geo::{Coord, Geometry, LineString, Point, Polygon};
use geoconnector::{AttrValue, Connector, Row};
use indexmap::IndexMap;

fn square(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Geometry<f64> {
    let ring = LineString::new(vec![
        Coord { x: minx, y: miny },
        Coord { x: maxx, y: miny },
        Coord { x: maxx, y: maxy },
        Coord { x: minx, y: maxy },
        Coord { x: minx, y: miny },
    ]);
    Geometry::Polygon(Polygon::new(ring, vec![]))
}

/// Stand-in for "buffer a point by r": an axis-aligned square of
/// half-width `r` centered on the point, which is sufficient to exercise
/// the contains/intersects boundary behavior the scenarios describe.
fn buffered_point(cx: f64, cy: f64, r: f64) -> Geometry<f64> {
    square(cx - r, cy - r, cx + r, cy + r)
}

fn row(geometry: Geometry<f64>) -> Row {
    Row { geometry, attrs: IndexMap::new() }
}

fn connector(dir: &std::path::Path) -> Connector {
    Connector::from_scratch(dir, 4326, Vec::new(), None)
}

#[test]
fn scenario_1_fully_contained_feature() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());

    c.add_rasters(vec![("r1".to_string(), row(square(0.0, 0.0, 10.0, 10.0)))], 4326).unwrap();
    c.add_vectors(vec![("f1".to_string(), row(buffered_point(5.0, 5.0, 1.0)))], 4326).unwrap();

    assert_eq!(c.rasters_containing("f1").unwrap(), vec!["r1".to_string()]);
    assert!(c.does_raster_contain("r1", "f1").unwrap());
    assert_eq!(
        c.vectors().get_row("f1").unwrap().attrs.get("raster_count"),
        Some(&AttrValue::Int(1))
    );
}

#[test]
fn scenario_2_boundary_intersecting_feature() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());

    c.add_rasters(vec![("r1".to_string(), row(square(0.0, 0.0, 10.0, 10.0)))], 4326).unwrap();
    c.add_vectors(vec![("f2".to_string(), row(buffered_point(11.0, 5.0, 2.0)))], 4326).unwrap();

    assert_eq!(c.rasters_containing("f2").unwrap(), Vec::<String>::new());
    assert_eq!(c.rasters_intersecting("f2").unwrap(), vec!["r1".to_string()]);
    assert_eq!(
        c.vectors().get_row("f2").unwrap().attrs.get("raster_count"),
        Some(&AttrValue::Int(0))
    );
}

#[test]
fn scenario_3_dropping_raster_zeroes_counts() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());

    c.add_rasters(vec![("r1".to_string(), row(square(0.0, 0.0, 10.0, 10.0)))], 4326).unwrap();
    c.add_vectors(vec![
        ("f1".to_string(), row(buffered_point(5.0, 5.0, 1.0))),
        ("f2".to_string(), row(buffered_point(11.0, 5.0, 2.0))),
    ], 4326)
    .unwrap();

    c.drop_rasters(&["r1".to_string()]).unwrap();

    assert_eq!(c.vectors().get_row("f1").unwrap().attrs.get("raster_count"), Some(&AttrValue::Int(0)));
    assert_eq!(c.vectors().get_row("f2").unwrap().attrs.get("raster_count"), Some(&AttrValue::Int(0)));
    assert!(c.vectors().has_row("f1"));
    assert!(c.vectors().has_row("f2"));
    assert_eq!(c.rasters().len(), 0);
}

#[test]
fn scenario_4_reprojected_feature_is_contained() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());

    // A degree-scale raster footprint straddling the EPSG:3857 origin.
    c.add_rasters(vec![("r1".to_string(), row(square(-1.0, -1.0, 1.0, 1.0)))], 4326).unwrap();

    // A small square near the Web Mercator origin (which is lon/lat
    // (0, 0)), far smaller in meters than the ~111km raster footprint.
    let feature_3857 = square(-1000.0, -1000.0, 1000.0, 1000.0);
    c.add_vectors(vec![("f1".to_string(), row(feature_3857))], 3857).unwrap();

    assert_eq!(c.rasters_containing("f1").unwrap(), vec!["r1".to_string()]);
    let stored = &c.vectors().get_row("f1").unwrap().geometry;
    match stored {
        Geometry::Polygon(p) => {
            for coord in p.exterior().coords() {
                assert!(coord.x.abs() < 1.0, "stored geometry should be in degrees, got {coord:?}");
                assert!(coord.y.abs() < 1.0, "stored geometry should be in degrees, got {coord:?}");
            }
        }
        other => panic!("expected a polygon, got {other:?}"),
    }
}

#[test]
fn scenario_5_duplicate_ids_in_one_batch_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());

    let result = c.add_rasters(
        vec![
            ("dup".to_string(), row(square(0.0, 0.0, 1.0, 1.0))),
            ("dup".to_string(), row(square(2.0, 2.0, 3.0, 3.0))),
        ],
        4326,
    );

    assert!(result.is_err());
    assert_eq!(c.rasters().len(), 0);
}

#[test]
fn scenario_6_save_and_reload_round_trips_edge_set() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());

    let raster_rows: Vec<_> = (0..10)
        .map(|i| {
            let x0 = i as f64 * 10.0;
            (format!("r{i}"), row(square(x0, 0.0, x0 + 10.0, 10.0)))
        })
        .collect();
    c.add_rasters(raster_rows, 4326).unwrap();

    let feature_rows: Vec<_> = (0..100)
        .map(|i| {
            let cx = (i as f64 * 0.97) % 100.0;
            (format!("f{i}"), row(buffered_point(cx, 5.0, 1.0)))
        })
        .collect();
    c.add_vectors(feature_rows, 4326).unwrap();

    let contains_before: usize = (0..100).map(|i| c.rasters_containing(&format!("f{i}")).unwrap().len()).sum();
    let intersects_before: usize = (0..100)
        .map(|i| c.rasters_intersecting(&format!("f{i}")).unwrap().len() - c.rasters_containing(&format!("f{i}")).unwrap().len())
        .sum();

    c.save().unwrap();
    let reloaded = Connector::from_data_dir(tmp.path()).unwrap();

    let contains_after: usize = (0..100).map(|i| reloaded.rasters_containing(&format!("f{i}")).unwrap().len()).sum();
    let intersects_after: usize = (0..100)
        .map(|i| {
            reloaded.rasters_intersecting(&format!("f{i}")).unwrap().len()
                - reloaded.rasters_containing(&format!("f{i}")).unwrap().len()
        })
        .sum();

    assert_eq!(contains_before, contains_after);
    assert_eq!(intersects_before, intersects_after);
    assert_eq!(reloaded.vectors().len(), 100);
    assert_eq!(reloaded.rasters().len(), 10);
    for i in 0..100 {
        let id = format!("f{i}");
        assert_eq!(
            c.vectors().get_row(&id).unwrap().attrs.get("raster_count"),
            reloaded.vectors().get_row(&id).unwrap().attrs.get("raster_count"),
        );
    }
    reloaded.check_invariants().unwrap();
}

#[test]
fn unknown_point_geometry_is_supported_as_a_feature() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());
    c.add_rasters(vec![("r1".to_string(), row(square(0.0, 0.0, 10.0, 10.0)))], 4326).unwrap();
    c.add_vectors(vec![("f1".to_string(), row(Geometry::Point(Point::new(5.0, 5.0))))], 4326).unwrap();
    assert!(c.does_raster_contain("r1", "f1").unwrap());
}

#[test]
fn scenario_7_edge_tangent_feature_creates_no_edge() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());

    // f1 shares the raster's right edge (x = 10, y in [0, 10]) but
    // otherwise lies entirely outside it: zero-area overlap.
    c.add_rasters(vec![("r1".to_string(), row(square(0.0, 0.0, 10.0, 10.0)))], 4326).unwrap();
    c.add_vectors(vec![("f1".to_string(), row(square(10.0, 0.0, 20.0, 10.0)))], 4326).unwrap();

    assert_eq!(c.rasters_containing("f1").unwrap(), Vec::<String>::new());
    assert_eq!(c.rasters_intersecting("f1").unwrap(), Vec::<String>::new());
    assert_eq!(
        c.vectors().get_row("f1").unwrap().attrs.get("raster_count"),
        Some(&AttrValue::Int(0))
    );
}

#[test]
fn scenario_8_corner_tangent_feature_creates_no_edge() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());

    // f1 touches the raster at a single corner point (10, 10): still
    // zero-area overlap, even though it's a point rather than a segment.
    c.add_rasters(vec![("r1".to_string(), row(square(0.0, 0.0, 10.0, 10.0)))], 4326).unwrap();
    c.add_vectors(vec![("f1".to_string(), row(square(10.0, 10.0, 20.0, 20.0)))], 4326).unwrap();

    assert_eq!(c.rasters_containing("f1").unwrap(), Vec::<String>::new());
    assert_eq!(c.rasters_intersecting("f1").unwrap(), Vec::<String>::new());
}

#[test]
fn two_rasters_sharing_a_footprint_each_get_their_own_edge() {
    let tmp = tempfile::tempdir().unwrap();
    let mut c = connector(tmp.path());
    c.add_rasters(
        vec![
            ("r1".to_string(), row(square(0.0, 0.0, 10.0, 10.0))),
            ("r2".to_string(), row(square(0.0, 0.0, 10.0, 10.0))),
        ],
        4326,
    )
    .unwrap();
    c.add_vectors(vec![("f1".to_string(), row(buffered_point(5.0, 5.0, 1.0)))], 4326).unwrap();

    let mut containing = c.rasters_containing("f1").unwrap();
    containing.sort();
    assert_eq!(containing, vec!["r1".to_string(), "r2".to_string()]);
    assert_eq!(
        c.vectors().get_row("f1").unwrap().attrs.get("raster_count"),
        Some(&AttrValue::Int(2))
    );
}
