//! Typed bipartite graph with two vertex colors (`feature`, `raster`) and
//! directed labeled edges (`contains`, `intersects`). Adjacency is
//! stored as insertion-ordered maps so `neighbors` enumeration is
//! deterministic, unlike a static CSR adjacency array which can't
//! support this graph's incremental insert/remove.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, IdentifierError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VertexKind {
    Feature,
    Raster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeLabel {
    Contains,
    Intersects,
}

/// Free-form per-edge attribute bag (e.g. the ids of downloaded source
/// files that contributed to a raster row), preserved verbatim through
/// mutation and round-trip.
pub type EdgeAttrs = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone)]
pub struct Edge {
    pub label: EdgeLabel,
    pub attrs: EdgeAttrs,
}

/// Bipartite relation graph. Only this component enforces edge
/// uniqueness; vertex color is stored explicitly so single-id lookups
/// never require a table scan.
#[derive(Debug, Default)]
pub struct RelationGraph {
    kinds: IndexMap<String, VertexKind>,
    /// raster id -> (feature id -> edge), insertion-ordered.
    out_edges: IndexMap<String, IndexMap<String, Edge>>,
    /// feature id -> ordered set of raster ids with an edge to it.
    in_edges: IndexMap<String, IndexSet<String>>,
}

impl RelationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self, id: &str) -> Option<VertexKind> {
        self.kinds.get(id).copied()
    }

    pub fn has_vertex(&self, id: &str) -> bool {
        self.kinds.contains_key(id)
    }

    /// Add a vertex; fails if `id` already exists.
    pub fn add_vertex(&mut self, id: &str, kind: VertexKind) -> Result<()> {
        if self.kinds.contains_key(id) {
            return Err(ConnectorError::Identifier(IdentifierError::Duplicate {
                id: id.to_string(),
                table: "graph",
            }));
        }
        self.kinds.insert(id.to_string(), kind);
        match kind {
            VertexKind::Raster => {
                self.out_edges.insert(id.to_string(), IndexMap::new());
            }
            VertexKind::Feature => {
                self.in_edges.insert(id.to_string(), IndexSet::new());
            }
        }
        Ok(())
    }

    /// Remove a vertex and every incident edge atomically.
    pub fn remove_vertex(&mut self, id: &str) -> Result<()> {
        let kind = self.kinds.swap_remove(id).ok_or_else(|| {
            ConnectorError::Identifier(IdentifierError::NotFound { id: id.to_string(), table: "graph" })
        })?;
        match kind {
            VertexKind::Raster => {
                if let Some(out) = self.out_edges.swap_remove(id) {
                    for feature_id in out.keys() {
                        if let Some(ins) = self.in_edges.get_mut(feature_id) {
                            ins.shift_remove(id);
                        }
                    }
                }
            }
            VertexKind::Feature => {
                if let Some(ins) = self.in_edges.swap_remove(id) {
                    for raster_id in ins {
                        if let Some(out) = self.out_edges.get_mut(&raster_id) {
                            out.shift_remove(id);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Add a directed labeled edge; fails if an edge already exists
    /// between these endpoints regardless of label.
    pub fn add_edge(&mut self, raster_id: &str, feature_id: &str, label: EdgeLabel, attrs: EdgeAttrs) -> Result<()> {
        let out = self.out_edges.get_mut(raster_id).ok_or_else(|| {
            ConnectorError::Identifier(IdentifierError::NotFound { id: raster_id.to_string(), table: "rasters" })
        })?;
        if out.contains_key(feature_id) {
            return Err(ConnectorError::Invariant(format!(
                "edge ({raster_id}, {feature_id}) already exists"
            )));
        }
        out.insert(feature_id.to_string(), Edge { label, attrs });
        self.in_edges
            .get_mut(feature_id)
            .ok_or_else(|| {
                ConnectorError::Identifier(IdentifierError::NotFound {
                    id: feature_id.to_string(),
                    table: "vectors",
                })
            })?
            .insert(raster_id.to_string());
        Ok(())
    }

    /// Remove an edge. `allow_missing` opts into no-op-safe removal;
    /// otherwise a missing edge is an error.
    pub fn remove_edge(&mut self, raster_id: &str, feature_id: &str, allow_missing: bool) -> Result<()> {
        let removed = self
            .out_edges
            .get_mut(raster_id)
            .and_then(|out| out.shift_remove(feature_id))
            .is_some();
        if removed {
            if let Some(ins) = self.in_edges.get_mut(feature_id) {
                ins.shift_remove(raster_id);
            }
            Ok(())
        } else if allow_missing {
            Ok(())
        } else {
            Err(ConnectorError::Invariant(format!("no edge ({raster_id}, {feature_id}) to remove")))
        }
    }

    pub fn edge(&self, raster_id: &str, feature_id: &str) -> Option<&Edge> {
        self.out_edges.get(raster_id)?.get(feature_id)
    }

    /// Neighbors of `id` (of the opposite color) optionally filtered by
    /// label, in insertion order.
    pub fn neighbors(&self, id: &str, filter_label: Option<EdgeLabel>) -> Vec<String> {
        match self.kinds.get(id) {
            Some(VertexKind::Raster) => self
                .out_edges
                .get(id)
                .into_iter()
                .flat_map(|out| out.iter())
                .filter(|(_, edge)| filter_label.is_none_or(|l| edge.label == l))
                .map(|(feature_id, _)| feature_id.clone())
                .collect(),
            Some(VertexKind::Feature) => self
                .in_edges
                .get(id)
                .into_iter()
                .flatten()
                .filter(|raster_id| {
                    filter_label.is_none_or(|l| {
                        self.out_edges.get(raster_id.as_str()).and_then(|o| o.get(id)).map(|e| e.label == l).unwrap_or(false)
                    })
                })
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Number of incoming `contains` edges for a feature — the source of
    /// truth `raster_count` is derived from.
    pub fn contains_count(&self, feature_id: &str) -> usize {
        self.neighbors(feature_id, Some(EdgeLabel::Contains)).len()
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = (&str, VertexKind)> {
        self.kinds.iter().map(|(id, kind)| (id.as_str(), *kind))
    }

    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &Edge)> {
        self.out_edges
            .iter()
            .flat_map(|(raster_id, out)| out.iter().map(move |(feature_id, edge)| (raster_id.as_str(), feature_id.as_str(), edge)))
    }
}
