//! Bulk-loaded and incrementally updatable R-tree over raster footprints
//! and feature geometries. Not authoritative — the graph is; this
//! index only narrows candidate pairs for precise predicate evaluation.

use ahash::AHashMap;
use geo::Rect;
use rstar::{RTree, RTreeObject, AABB};

use crate::error::{ConnectorError, IdentifierError, Result};

/// An R-tree leaf associating a string id with its bounding box, keyed by
/// a stable string id instead of a vector index, since entries must be
/// removable by id after arbitrary insertions/removals.
#[derive(Debug, Clone)]
struct IndexedBox {
    id: String,
    bbox: Rect<f64>,
}

impl PartialEq for IndexedBox {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.bbox.min().into(), self.bbox.max().into())
    }
}

/// Spatial index over `vectors` and `rasters` geometry bounds, keyed by id.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    tree: RTree<IndexedBox>,
    bounds_by_id: AHashMap<String, Rect<f64>>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new(), bounds_by_id: AHashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.bounds_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds_by_id.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.bounds_by_id.contains_key(id)
    }

    /// Insert a new id. Idempotent-safe only when `id` is new; a
    /// pre-existing id is a duplicate-id error.
    pub fn insert(&mut self, id: &str, bbox: Rect<f64>) -> Result<()> {
        if self.bounds_by_id.contains_key(id) {
            return Err(ConnectorError::Identifier(IdentifierError::Duplicate {
                id: id.to_string(),
                table: "spatial_index",
            }));
        }
        self.bounds_by_id.insert(id.to_string(), bbox);
        self.tree.insert(IndexedBox { id: id.to_string(), bbox });
        Ok(())
    }

    /// Remove an id; a missing id is a not-found error.
    pub fn remove(&mut self, id: &str) -> Result<()> {
        let bbox = self.bounds_by_id.remove(id).ok_or_else(|| {
            ConnectorError::Identifier(IdentifierError::NotFound { id: id.to_string(), table: "spatial_index" })
        })?;
        self.tree.remove(&IndexedBox { id: id.to_string(), bbox });
        Ok(())
    }

    /// Bulk-load from scratch, for use at load time where per-item
    /// insertion cost would dominate.
    pub fn bulk_load(entries: impl IntoIterator<Item = (String, Rect<f64>)>) -> Self {
        let mut bounds_by_id = AHashMap::new();
        let boxes: Vec<IndexedBox> = entries
            .into_iter()
            .map(|(id, bbox)| {
                bounds_by_id.insert(id.clone(), bbox);
                IndexedBox { id, bbox }
            })
            .collect();
        Self { tree: RTree::bulk_load(boxes), bounds_by_id }
    }

    /// Candidate ids whose bounding box intersects `query_bbox`. A
    /// superset of exact intersections — callers must re-check with
    /// precise predicates.
    pub fn query(&self, query_bbox: Rect<f64>) -> Vec<String> {
        let envelope = AABB::from_corners(query_bbox.min().into(), query_bbox.max().into());
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|leaf| leaf.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn rect(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Rect<f64> {
        Rect::new(Coord { x: xmin, y: ymin }, Coord { x: xmax, y: ymax })
    }

    #[test]
    fn insert_then_query_finds_overlap() {
        let mut index = SpatialIndex::new();
        index.insert("r1", rect(0.0, 0.0, 10.0, 10.0)).unwrap();
        index.insert("r2", rect(20.0, 20.0, 30.0, 30.0)).unwrap();

        let hits = index.query(rect(5.0, 5.0, 6.0, 6.0));
        assert_eq!(hits, vec!["r1".to_string()]);
    }

    #[test]
    fn duplicate_insert_is_an_error() {
        let mut index = SpatialIndex::new();
        index.insert("r1", rect(0.0, 0.0, 1.0, 1.0)).unwrap();
        assert!(index.insert("r1", rect(0.0, 0.0, 1.0, 1.0)).is_err());
    }

    #[test]
    fn remove_missing_is_an_error() {
        let mut index = SpatialIndex::new();
        assert!(index.remove("ghost").is_err());
    }

    #[test]
    fn remove_then_query_no_longer_finds_it() {
        let mut index = SpatialIndex::new();
        index.insert("r1", rect(0.0, 0.0, 10.0, 10.0)).unwrap();
        index.remove("r1").unwrap();
        assert!(index.query(rect(0.0, 0.0, 10.0, 10.0)).is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn bulk_load_matches_incremental_insert() {
        let bulk = SpatialIndex::bulk_load(vec![
            ("a".to_string(), rect(0.0, 0.0, 1.0, 1.0)),
            ("b".to_string(), rect(5.0, 5.0, 6.0, 6.0)),
        ]);
        assert_eq!(bulk.len(), 2);
        assert_eq!(bulk.query(rect(0.0, 0.0, 1.0, 1.0)), vec!["a".to_string()]);
    }
}
