//! Serialize/deserialize the three substructures (tables, graph, index)
//! into a directory with an atomic-write discipline: every file is first
//! written to a sibling `.tmp`, and only renamed into place once every
//! file in the group has serialized and written successfully.

mod geojson;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use crate::connector::{Connector, LabelMode, RasterFailure};
use crate::error::{ConnectorError, PersistenceError, Result};
use crate::geom::CanonicalCrs;
use crate::graph::{EdgeLabel, RelationGraph, VertexKind};
use crate::index::SpatialIndex;
use crate::table::Table;

const VECTORS_FILE: &str = "vectors.geojson";
const RASTERS_FILE: &str = "rasters.geojson";
const GRAPH_FILE: &str = "graph.json";
const ATTRS_FILE: &str = "attrs.json";
const FAILURES_FILE: &str = "raster_failures.json";

fn connector_subdir(data_dir: &Path) -> PathBuf {
    data_dir.join("connector")
}

pub fn save(connector: &Connector) -> Result<()> {
    let dir = connector_subdir(connector.data_dir());
    fs::create_dir_all(&dir).map_err(|e| PersistenceError::Io(e.to_string()))?;

    let mut files: Vec<(&str, Vec<u8>)> = vec![
        (VECTORS_FILE, to_bytes(&geojson::table_to_value(connector.vectors()))?),
        (RASTERS_FILE, to_bytes(&geojson::table_to_value(connector.rasters()))?),
        (GRAPH_FILE, to_bytes(&graph_to_value(connector.graph()))?),
        (ATTRS_FILE, to_bytes(&attrs_to_value(connector))?),
    ];
    if !connector.raster_failures().is_empty() {
        files.push((FAILURES_FILE, to_bytes(&failures_to_value(connector.raster_failures()))?));
    }

    write_atomic_group(&dir, files)
}

pub fn load(data_dir: PathBuf) -> Result<Connector> {
    let dir = connector_subdir(&data_dir);
    let paths = [dir.join(VECTORS_FILE), dir.join(RASTERS_FILE), dir.join(GRAPH_FILE), dir.join(ATTRS_FILE)];
    let present: Vec<bool> = paths.iter().map(|p| p.exists()).collect();

    if present.iter().all(|p| !p) {
        // All empty is a valid empty connector state.
        return Ok(Connector::from_scratch(data_dir, 4326, Vec::new(), None));
    }
    if !present.iter().all(|p| *p) {
        let missing = paths.iter().zip(&present).find(|(_, p)| !**p).unwrap().0;
        return Err(ConnectorError::Persistence(PersistenceError::MissingFile {
            file: missing.display().to_string(),
        }));
    }

    let attrs = read_json(&paths[3])?;
    let (crs, task_classes, background_class, label_mode) = value_to_attrs(&paths[3].display().to_string(), &attrs)?;

    let mut connector = Connector::from_scratch(data_dir, crs.0, task_classes, background_class);
    connector.set_label_mode(label_mode);

    let vectors_value = read_json(&paths[0])?;
    let rasters_value = read_json(&paths[1])?;
    let vector_rows = geojson::value_to_rows(VECTORS_FILE, &vectors_value)?;
    let raster_rows = geojson::value_to_rows(RASTERS_FILE, &rasters_value)?;

    let graph_value = read_json(&paths[2])?;
    let (vertex_kinds, edges) = value_to_graph(GRAPH_FILE, &graph_value)?;

    // Rebuild tables, index, and graph directly rather than replaying
    // add_vectors/add_rasters: the persisted edge set is authoritative
    // and must round-trip exactly (P5), including any edges a re-derived
    // geometric classification might compute differently after a schema
    // or algorithm change.
    let mut vectors = Table::new("vectors");
    vectors.insert_rows(vector_rows)?;
    let mut rasters = Table::new("rasters");
    rasters.insert_rows(raster_rows)?;

    let mut index_entries = Vec::new();
    for (id, row) in vectors.iter_rows().chain(rasters.iter_rows()) {
        let bbox = crate::geom::bounds(&row.geometry).ok_or_else(|| {
            ConnectorError::Persistence(PersistenceError::Corrupt {
                file: format!("{VECTORS_FILE}/{RASTERS_FILE}"),
                reason: format!("{id:?} has an empty geometry"),
            })
        })?;
        index_entries.push((id.to_string(), bbox));
    }
    let index = SpatialIndex::bulk_load(index_entries);

    let mut graph = RelationGraph::new();
    for (id, kind) in &vertex_kinds {
        graph.add_vertex(id, *kind)?;
    }
    for (raster_id, feature_id, label, attrs) in edges {
        graph.add_edge(&raster_id, &feature_id, label, attrs)?;
    }

    connector.replace_substructures(vectors, rasters, index, graph);

    if let Some(failures_value) = read_json_if_exists(&dir.join(FAILURES_FILE))? {
        for (id, failure) in value_to_failures(&failures_value) {
            connector.restore_raster_failure(id, failure);
        }
    }

    Ok(connector)
}

fn write_atomic_group(dir: &Path, files: Vec<(&str, Vec<u8>)>) -> Result<()> {
    let mut pending = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| PersistenceError::Io(e.to_string()))?;
        tmp.write_all(&bytes).map_err(|e| PersistenceError::Io(e.to_string()))?;
        tmp.as_file().sync_all().ok();
        pending.push((dir.join(name), tmp));
    }
    for (target, tmp) in pending {
        tmp.persist(&target).map_err(|e| PersistenceError::Io(e.to_string()))?;
    }
    Ok(())
}

fn to_bytes(value: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::Io(e.to_string()).into())
}

fn read_json(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).map_err(|e| PersistenceError::Io(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        PersistenceError::Corrupt { file: path.display().to_string(), reason: e.to_string() }.into()
    })
}

fn read_json_if_exists(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

fn graph_to_value(graph: &RelationGraph) -> Value {
    let vertices: Vec<Value> = graph
        .vertex_ids()
        .map(|(id, kind)| json!({ "id": id, "kind": kind_to_str(kind) }))
        .collect();
    let edges: Vec<Value> = graph
        .edges()
        .map(|(raster, feature, edge)| {
            json!({
                "raster": raster,
                "feature": feature,
                "label": label_to_str(edge.label),
                "attrs": edge.attrs,
            })
        })
        .collect();
    json!({ "vertices": vertices, "edges": edges })
}

fn value_to_graph(
    file: &str,
    value: &Value,
) -> Result<(Vec<(String, VertexKind)>, Vec<(String, String, EdgeLabel, crate::graph::EdgeAttrs)>)> {
    let obj = value.as_object().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "expected an object".to_string() })?;
    let vertices = obj.get("vertices").and_then(Value::as_array).ok_or_else(|| {
        PersistenceError::Corrupt { file: file.to_string(), reason: "missing \"vertices\"".to_string() }
    })?;
    let mut parsed_vertices = Vec::with_capacity(vertices.len());
    for v in vertices {
        let id = v["id"].as_str().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "vertex missing id".to_string() })?;
        let kind = str_to_kind(file, v["kind"].as_str().unwrap_or(""))?;
        parsed_vertices.push((id.to_string(), kind));
    }

    let edges = obj.get("edges").and_then(Value::as_array).ok_or_else(|| {
        PersistenceError::Corrupt { file: file.to_string(), reason: "missing \"edges\"".to_string() }
    })?;
    let mut parsed_edges = Vec::with_capacity(edges.len());
    for e in edges {
        let raster = e["raster"].as_str().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "edge missing raster".to_string() })?;
        let feature = e["feature"].as_str().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "edge missing feature".to_string() })?;
        let label = str_to_label(file, e["label"].as_str().unwrap_or(""))?;
        let attrs = e["attrs"].as_object().cloned().unwrap_or_default();
        parsed_edges.push((raster.to_string(), feature.to_string(), label, attrs));
    }

    Ok((parsed_vertices, parsed_edges))
}

fn kind_to_str(kind: VertexKind) -> &'static str {
    match kind {
        VertexKind::Feature => "feature",
        VertexKind::Raster => "raster",
    }
}

fn str_to_kind(file: &str, s: &str) -> Result<VertexKind> {
    match s {
        "feature" => Ok(VertexKind::Feature),
        "raster" => Ok(VertexKind::Raster),
        other => Err(PersistenceError::Corrupt { file: file.to_string(), reason: format!("unknown vertex kind {other:?}") }.into()),
    }
}

fn label_to_str(label: EdgeLabel) -> &'static str {
    match label {
        EdgeLabel::Contains => "contains",
        EdgeLabel::Intersects => "intersects",
    }
}

fn str_to_label(file: &str, s: &str) -> Result<EdgeLabel> {
    match s {
        "contains" => Ok(EdgeLabel::Contains),
        "intersects" => Ok(EdgeLabel::Intersects),
        other => Err(PersistenceError::Corrupt { file: file.to_string(), reason: format!("unknown edge label {other:?}") }.into()),
    }
}

fn attrs_to_value(connector: &Connector) -> Value {
    json!({
        "crs_epsg": connector.crs().0,
        "task_classes": connector.task_classes(),
        "background_class": connector.background_class(),
        "label_mode": match connector.label_mode() {
            LabelMode::Categorical => "categorical",
            LabelMode::SoftCategorical => "soft_categorical",
        },
    })
}

fn value_to_attrs(file: &str, value: &Value) -> Result<(CanonicalCrs, Vec<String>, Option<String>, LabelMode)> {
    let epsg = value["crs_epsg"].as_u64().ok_or_else(|| {
        PersistenceError::Corrupt { file: file.to_string(), reason: "missing \"crs_epsg\"".to_string() }
    })? as u32;
    let task_classes = value["task_classes"]
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let background_class = value["background_class"].as_str().map(str::to_string);
    let label_mode = match value["label_mode"].as_str() {
        Some("categorical") => LabelMode::Categorical,
        _ => LabelMode::SoftCategorical,
    };
    Ok((CanonicalCrs(epsg), task_classes, background_class, label_mode))
}

fn failures_to_value(failures: &IndexMap<String, RasterFailure>) -> Value {
    let entries: Vec<Value> =
        failures.iter().map(|(id, f)| json!({ "id": id, "cause": f.cause, "failed_at": f.failed_at })).collect();
    json!({ "failures": entries })
}

fn value_to_failures(value: &Value) -> Vec<(String, RasterFailure)> {
    value["failures"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| {
                    let id = v["id"].as_str()?;
                    let cause = v["cause"].as_str().unwrap_or("unknown").to_string();
                    let failed_at = v["failed_at"].as_u64().unwrap_or(0);
                    Some((id.to_string(), RasterFailure { cause, failed_at }))
                })
                .collect()
        })
        .unwrap_or_default()
}
