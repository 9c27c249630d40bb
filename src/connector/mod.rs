//! The orchestrator. Owns the tabular store, spatial index, and
//! relation graph; enforces the connector's data-model invariants across
//! every mutation; maintains the `raster_count` derived column; dispatches
//! CRS reconciliation; exposes the public query/mutation contract.

mod collaborators;

pub use collaborators::{LabelMaker, RasterDownloader};

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{CollaboratorError, CollaboratorReport, ConnectorError, IdentifierError, Result};
use crate::geom::{self, CanonicalCrs};
use crate::graph::{EdgeLabel, RelationGraph, VertexKind};
use crate::index::SpatialIndex;
use crate::persistence;
use crate::table::{AttrType, AttrValue, Row, Table};

/// How a feature's class label is represented. Determines which
/// column(s) label-making collaborators require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMode {
    /// A single categorical `type` column.
    Categorical,
    /// A `prob_of_class_<C>` column per task class.
    SoftCategorical,
}

/// A raster that a downloader attempted but failed to produce pixels for.
/// Excluded from the spatial index and the `rasters` table since it has
/// no geometry.
#[derive(Debug, Clone)]
pub struct RasterFailure {
    pub cause: String,
    /// Unix timestamp (seconds) of when the failure was recorded.
    pub failed_at: u64,
}

pub struct Connector {
    data_dir: PathBuf,
    crs: CanonicalCrs,
    task_classes: Vec<String>,
    background_class: Option<String>,
    label_mode: LabelMode,

    vectors: Table,
    rasters: Table,
    raster_failures: IndexMap<String, RasterFailure>,
    graph: RelationGraph,
    index: SpatialIndex,
}

const RASTER_COUNT_COLUMN: &str = "raster_count";

impl Connector {
    /// Build a brand-new, empty connector bound to `data_dir` (not yet
    /// written to disk — callers must call `save`).
    pub fn from_scratch(
        data_dir: impl Into<PathBuf>,
        crs_epsg: u32,
        task_classes: Vec<String>,
        background_class: Option<String>,
    ) -> Self {
        let label_mode = if task_classes.is_empty() { LabelMode::Categorical } else { LabelMode::SoftCategorical };
        let mut vectors = Table::new("vectors");
        // raster_count is a materialized view: the column exists from the
        // start so it is never silently absent.
        let _ = vectors.add_column(RASTER_COUNT_COLUMN, AttrType::Int, AttrValue::Int(0));
        Self {
            data_dir: data_dir.into(),
            crs: CanonicalCrs(crs_epsg),
            task_classes,
            background_class,
            label_mode,
            vectors,
            rasters: Table::new("rasters"),
            raster_failures: IndexMap::new(),
            graph: RelationGraph::new(),
            index: SpatialIndex::new(),
        }
    }

    /// Load a connector from a data directory written by `save`.
    pub fn from_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self> {
        persistence::load(data_dir.into())
    }

    /// Atomically persist the three connector files (plus
    /// `raster_failures.json` when non-empty) into `self.data_dir`.
    pub fn save(&self) -> Result<()> {
        persistence::save(self)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn crs(&self) -> CanonicalCrs {
        self.crs
    }

    pub fn task_classes(&self) -> &[String] {
        &self.task_classes
    }

    pub fn background_class(&self) -> Option<&str> {
        self.background_class.as_deref()
    }

    pub fn label_mode(&self) -> LabelMode {
        self.label_mode
    }

    pub fn vectors(&self) -> &Table {
        &self.vectors
    }

    pub fn rasters(&self) -> &Table {
        &self.rasters
    }

    pub fn raster_failures(&self) -> &IndexMap<String, RasterFailure> {
        &self.raster_failures
    }

    pub(crate) fn graph(&self) -> &RelationGraph {
        &self.graph
    }

    pub(crate) fn index(&self) -> &SpatialIndex {
        &self.index
    }

    // ---- schema validation ----------------------------------

    /// Check the label columns the connector's `label_mode` requires are
    /// present on `vectors`.
    pub fn validate_label_schema(&self) -> Result<()> {
        match self.label_mode {
            LabelMode::Categorical => self.vectors.require_column("type", AttrType::String),
            LabelMode::SoftCategorical => {
                for class in &self.task_classes {
                    self.vectors.require_column(&format!("prob_of_class_{class}"), AttrType::Float)?;
                }
                Ok(())
            }
        }
    }

    /// Re-run the full self-consistency check of the data model's invariants.
    /// Reachable only through internal bugs or direct table tampering.
    pub fn check_invariants(&self) -> Result<()> {
        for (raster_id, feature_id, edge) in self.graph.edges() {
            if !self.rasters.has_row(raster_id) {
                return Err(ConnectorError::Invariant(format!("edge references missing raster {raster_id:?}")));
            }
            if !self.vectors.has_row(feature_id) {
                return Err(ConnectorError::Invariant(format!("edge references missing feature {feature_id:?}")));
            }
            let raster_geom = &self.rasters.get_row(raster_id).unwrap().geometry;
            let feature_geom = &self.vectors.get_row(feature_id).unwrap().geometry;
            let expected = if geom::contains(raster_geom, feature_geom) { EdgeLabel::Contains } else { EdgeLabel::Intersects };
            if edge.label != expected {
                return Err(ConnectorError::Invariant(format!(
                    "edge ({raster_id}, {feature_id}) has label {:?}, expected {:?}",
                    edge.label, expected
                )));
            }
        }
        for (feature_id, row) in self.vectors.iter_rows() {
            let expected = self.graph.contains_count(feature_id) as i64;
            let actual = row.attrs.get(RASTER_COUNT_COLUMN).and_then(AttrValue::as_i64).unwrap_or(-1);
            if actual != expected {
                return Err(ConnectorError::Invariant(format!(
                    "feature {feature_id:?} raster_count is {actual}, expected {expected}"
                )));
            }
        }
        let table_ids: std::collections::HashSet<&str> =
            self.vectors.iter_rows().map(|(id, _)| id).chain(self.rasters.iter_rows().map(|(id, _)| id)).collect();
        if table_ids.len() != self.index.len() {
            return Err(ConnectorError::Invariant("spatial index size does not match table union".to_string()));
        }
        for id in &table_ids {
            if !self.index.contains(id) {
                return Err(ConnectorError::Invariant(format!("{id:?} present in a table but missing from the spatial index")));
            }
        }
        Ok(())
    }

    // ---- mutation: vectors --------------------------------------------

    /// Add new features. `source_epsg` is the CRS the incoming geometries
    /// are expressed in; they are reprojected into the canonical CRS
    /// before anything else happens.
    pub fn add_vectors(&mut self, new_rows: Vec<(String, Row)>, source_epsg: u32) -> Result<()> {
        let prepared = self.validate_and_reproject(&new_rows, source_epsg, "vectors")?;
        log::debug!("add_vectors: integrating {} feature(s)", prepared.len());

        for (id, row) in &prepared {
            self.index.insert(id, geom::bounds(&row.geometry).ok_or_else(|| {
                ConnectorError::Geometry(crate::error::GeometryError::Empty { id: id.clone() })
            })?)?;
            self.graph.add_vertex(id, VertexKind::Feature)?;
        }
        self.vectors.insert_rows(prepared.clone())?;

        let mut edges_created = 0usize;
        for (feature_id, feature_row) in &prepared {
            let candidates = self.index.query(geom::bounds(&feature_row.geometry).unwrap());
            for raster_id in candidates {
                if self.graph.kind(&raster_id) != Some(VertexKind::Raster) {
                    continue; // candidate is another feature, not a raster
                }
                let raster_geom = &self.rasters.get_row(&raster_id).unwrap().geometry;
                if let Some(label) = classify(raster_geom, &feature_row.geometry) {
                    self.graph.add_edge(&raster_id, feature_id, label, serde_json::Map::new())?;
                    edges_created += 1;
                }
            }
            let count = self.graph.contains_count(feature_id) as i64;
            self.vectors.set_cell(feature_id, RASTER_COUNT_COLUMN, AttrValue::Int(count))?;
        }
        log::debug!("add_vectors: created {edges_created} edge(s)");
        Ok(())
    }

    /// Drop features: remove incident edges, index entries, and rows.
    /// No raster-side recomputation is needed since `raster_count` lives
    /// on the feature row, which is being removed.
    pub fn drop_vectors(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            if !self.vectors.has_row(id) {
                return Err(ConnectorError::Identifier(IdentifierError::NotFound { id: id.clone(), table: "vectors" }));
            }
        }
        for id in ids {
            self.graph.remove_vertex(id)?;
            self.index.remove(id)?;
        }
        self.vectors.drop_rows(ids)?;
        log::debug!("drop_vectors: removed {} feature(s)", ids.len());
        Ok(())
    }

    // ---- mutation: rasters ---------------------------------------------

    /// Mirror of `add_vectors`; additionally increments `raster_count` on
    /// every feature newly `contains`-ed by one of the new rasters.
    pub fn add_rasters(&mut self, new_rows: Vec<(String, Row)>, source_epsg: u32) -> Result<()> {
        let prepared = self.validate_and_reproject(&new_rows, source_epsg, "rasters")?;
        log::debug!("add_rasters: integrating {} raster(s)", prepared.len());

        for (id, row) in &prepared {
            self.index.insert(id, geom::bounds(&row.geometry).ok_or_else(|| {
                ConnectorError::Geometry(crate::error::GeometryError::Empty { id: id.clone() })
            })?)?;
            self.graph.add_vertex(id, VertexKind::Raster)?;
        }
        self.rasters.insert_rows(prepared.clone())?;

        let mut newly_contained = Vec::new();
        for (raster_id, raster_row) in &prepared {
            let candidates = self.index.query(geom::bounds(&raster_row.geometry).unwrap());
            for feature_id in candidates {
                if self.graph.kind(&feature_id) != Some(VertexKind::Feature) {
                    continue;
                }
                let feature_geom = &self.vectors.get_row(&feature_id).unwrap().geometry;
                if let Some(label) = classify(&raster_row.geometry, feature_geom) {
                    self.graph.add_edge(raster_id, &feature_id, label, serde_json::Map::new())?;
                    if label == EdgeLabel::Contains {
                        newly_contained.push(feature_id);
                    }
                }
            }
        }
        for feature_id in newly_contained {
            let count = self.graph.contains_count(&feature_id) as i64;
            self.vectors.set_cell(&feature_id, RASTER_COUNT_COLUMN, AttrValue::Int(count))?;
        }
        Ok(())
    }

    /// Drop rasters: decrement `raster_count` on every feature that lost
    /// a `contains` edge, then remove edges, index entries, and rows.
    pub fn drop_rasters(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            if !self.rasters.has_row(id) {
                return Err(ConnectorError::Identifier(IdentifierError::NotFound { id: id.clone(), table: "rasters" }));
            }
        }
        let mut decrements: Vec<String> = Vec::new();
        for id in ids {
            decrements.extend(self.graph.neighbors(id, Some(EdgeLabel::Contains)));
        }
        for id in ids {
            self.graph.remove_vertex(id)?;
            self.index.remove(id)?;
        }
        self.rasters.drop_rows(ids)?;
        for feature_id in decrements {
            let count = self.graph.contains_count(&feature_id) as i64;
            self.vectors.set_cell(&feature_id, RASTER_COUNT_COLUMN, AttrValue::Int(count))?;
        }
        log::debug!("drop_rasters: removed {} raster(s)", ids.len());
        Ok(())
    }

    /// Record a raster a downloader attempted but failed to produce.
    pub fn record_raster_failure(&mut self, raster_id: impl Into<String>, cause: impl Into<String>) {
        let failed_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.raster_failures.insert(raster_id.into(), RasterFailure { cause: cause.into(), failed_at });
    }

    /// Used by `persistence::load` to restore a raster failure with its
    /// original recorded timestamp, rather than re-stamping it with the
    /// load time as `record_raster_failure` would.
    pub(crate) fn restore_raster_failure(&mut self, raster_id: impl Into<String>, failure: RasterFailure) {
        self.raster_failures.insert(raster_id.into(), failure);
    }

    /// Used by `persistence::load` to install tables/index/graph rebuilt
    /// directly from the on-disk wire format, bypassing `add_vectors`/
    /// `add_rasters` so the persisted edge set round-trips exactly (P5)
    /// rather than being re-derived.
    pub(crate) fn replace_substructures(&mut self, vectors: Table, rasters: Table, index: SpatialIndex, graph: RelationGraph) {
        self.vectors = vectors;
        self.rasters = rasters;
        self.index = index;
        self.graph = graph;
    }

    /// Used by `persistence::load` to restore the exact label mode that
    /// was persisted in `attrs.json`, rather than re-deriving it from
    /// `task_classes`.
    pub(crate) fn set_label_mode(&mut self, label_mode: LabelMode) {
        self.label_mode = label_mode;
    }

    // ---- collaborator dispatch ------------------------------

    /// Ask `downloader` for new rasters covering each of `feature_ids`,
    /// integrating each feature's result independently. This call is
    /// explicitly *not* all-or-nothing: a failure on one feature does not
    /// roll back rasters already integrated for another.
    pub fn download_rasters_for(
        &mut self,
        downloader: &dyn RasterDownloader,
        feature_ids: &[String],
        target_count: usize,
    ) -> CollaboratorReport {
        let mut report = CollaboratorReport::default();
        for feature_id in feature_ids {
            match downloader.download(self, feature_id, target_count) {
                Ok(rows) if rows.is_empty() => report.succeeded.push(feature_id.clone()),
                Ok(rows) => match self.add_rasters(rows, downloader.source_epsg()) {
                    Ok(()) => report.succeeded.push(feature_id.clone()),
                    Err(e) => report.failed.push(CollaboratorError { id: feature_id.clone(), cause: anyhow::anyhow!(e) }),
                },
                Err(e) => {
                    self.record_raster_failure(feature_id.clone(), e.to_string());
                    report.failed.push(CollaboratorError { id: feature_id.clone(), cause: e });
                }
            }
        }
        report
    }

    /// Invoke `label_maker` for the given rasters after graph invariants
    /// hold for them. Fails the whole call up front if the connector's
    /// label columns aren't in place yet, since a label maker has nothing
    /// sound to write without them.
    pub fn make_labels(&self, label_maker: &dyn LabelMaker, raster_ids: &[String]) -> CollaboratorReport {
        let mut report = CollaboratorReport::default();
        if let Err(e) = self.validate_label_schema() {
            report.failed.push(CollaboratorError { id: raster_ids.join(","), cause: anyhow::anyhow!(e) });
            return report;
        }
        match label_maker.make_labels(self, raster_ids) {
            Ok(()) => report.succeeded.extend(raster_ids.iter().cloned()),
            Err(e) => report.failed.push(CollaboratorError { id: raster_ids.join(","), cause: e }),
        }
        report
    }

    // ---- queries ---------------------------------------------------

    pub fn rasters_containing(&self, feature_id: &str) -> Result<Vec<String>> {
        self.require_vertex(feature_id, VertexKind::Feature)?;
        Ok(self.graph.neighbors(feature_id, Some(EdgeLabel::Contains)))
    }

    pub fn rasters_intersecting(&self, feature_id: &str) -> Result<Vec<String>> {
        self.require_vertex(feature_id, VertexKind::Feature)?;
        Ok(self.graph.neighbors(feature_id, None))
    }

    pub fn vectors_contained_in(&self, raster_id: &str) -> Result<Vec<String>> {
        self.require_vertex(raster_id, VertexKind::Raster)?;
        Ok(self.graph.neighbors(raster_id, Some(EdgeLabel::Contains)))
    }

    pub fn vectors_intersecting(&self, raster_id: &str) -> Result<Vec<String>> {
        self.require_vertex(raster_id, VertexKind::Raster)?;
        Ok(self.graph.neighbors(raster_id, None))
    }

    pub fn have_raster_for(&self, feature_id: &str) -> Result<bool> {
        Ok(!self.rasters_containing(feature_id)?.is_empty())
    }

    pub fn does_raster_contain(&self, raster_id: &str, feature_id: &str) -> Result<bool> {
        self.require_vertex(raster_id, VertexKind::Raster)?;
        self.require_vertex(feature_id, VertexKind::Feature)?;
        Ok(self.graph.edge(raster_id, feature_id).map(|e| e.label == EdgeLabel::Contains).unwrap_or(false))
    }

    pub fn is_contained_in(&self, feature_id: &str, raster_id: &str) -> Result<bool> {
        self.does_raster_contain(raster_id, feature_id)
    }

    fn require_vertex(&self, id: &str, kind: VertexKind) -> Result<()> {
        match self.graph.kind(id) {
            Some(k) if k == kind => Ok(()),
            _ => Err(ConnectorError::Identifier(IdentifierError::NotFound {
                id: id.to_string(),
                table: if kind == VertexKind::Feature { "vectors" } else { "rasters" },
            })),
        }
    }

    // ---- internal helpers ------------------------------------------------

    /// Validate id uniqueness (within-batch, against both tables, and
    /// against the global namespace) and reproject every geometry into
    /// the canonical CRS. Returns the prepared rows only if *every* row
    /// passes: the caller only mutates state once this returns `Ok`,
    /// giving an all-or-nothing guarantee without needing to snapshot
    /// and roll back the table/index/graph.
    fn validate_and_reproject(
        &self,
        new_rows: &[(String, Row)],
        source_epsg: u32,
        table: &'static str,
    ) -> Result<Vec<(String, Row)>> {
        let mut seen = std::collections::HashSet::new();
        for (id, _) in new_rows {
            if !seen.insert(id.clone()) {
                return Err(ConnectorError::Identifier(IdentifierError::Duplicate { id: id.clone(), table }));
            }
            if self.vectors.has_row(id) || self.rasters.has_row(id) {
                return Err(ConnectorError::Identifier(IdentifierError::NamespaceCollision { id: id.clone() }));
            }
        }

        let mut prepared = Vec::with_capacity(new_rows.len());
        for (id, row) in new_rows {
            let reprojected = geom::reproject(id, &row.geometry, source_epsg, self.crs.0)?;
            geom::is_valid(id, &reprojected)?;
            if geom::bounds(&reprojected).is_none() {
                return Err(ConnectorError::Geometry(crate::error::GeometryError::Empty { id: id.clone() }));
            }
            prepared.push((id.clone(), Row { geometry: reprojected, attrs: row.attrs.clone() }));
        }
        Ok(prepared)
    }
}

/// Classify the relation between a raster footprint and a feature
/// geometry. `None` if they don't overlap at all, or if they only touch
/// along a shared boundary with zero actual overlap area.
fn classify(raster_geom: &geo::Geometry<f64>, feature_geom: &geo::Geometry<f64>) -> Option<EdgeLabel> {
    if !geom::intersects(raster_geom, feature_geom) {
        return None;
    }
    if geom::contains(raster_geom, feature_geom) {
        return Some(EdgeLabel::Contains);
    }
    if !geom::has_area_overlap(raster_geom, feature_geom) {
        return None;
    }
    Some(EdgeLabel::Intersects)
}
