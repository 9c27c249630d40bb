//! Capability interfaces for the two external collaborators: a raster
//! downloader and a label maker. The connector never interprets their
//! internals, only orders calls so that graph invariants hold before a
//! collaborator reads the tables.

use crate::connector::Connector;
use crate::table::Row;

/// Produces new raster rows (and, out of band, file artifacts on disk)
/// for a feature that needs more raster coverage.
pub trait RasterDownloader {
    /// Attempt to produce up to `target_count` new raster rows covering
    /// `feature_id`. `connector` is handed through so the downloader can
    /// read the feature's geometry/attributes before fetching pixels for
    /// it. Geometries are expected in `source_epsg`; the connector
    /// reprojects them into the canonical CRS before integrating them
    /// exactly as `add_rasters` would.
    fn download(&self, connector: &Connector, feature_id: &str, target_count: usize) -> anyhow::Result<Vec<(String, Row)>>;

    /// CRS the rows returned by `download` are expressed in.
    fn source_epsg(&self) -> u32;
}

/// Writes (and removes) pixel label artifacts for a set of rasters. Reads
/// the connector's tables and graph but never mutates them directly.
pub trait LabelMaker {
    fn make_labels(&self, connector: &Connector, raster_ids: &[String]) -> anyhow::Result<()>;
    fn remove_labels(&self, raster_ids: &[String]) -> anyhow::Result<()>;
}
