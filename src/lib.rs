#![doc = "GeoGrapher connector: an incrementally maintained containment/intersection graph between a vectors table and a rasters table."]

mod connector;
mod error;
mod geom;
mod graph;
mod index;
mod persistence;
mod table;

#[doc(inline)]
pub use connector::{Connector, LabelMaker, LabelMode, RasterDownloader, RasterFailure};

#[doc(inline)]
pub use error::{
    CollaboratorError, CollaboratorReport, ConnectorError, GeometryError, IdentifierError, PersistenceError, Result,
    SchemaError,
};

#[doc(inline)]
pub use geom::CanonicalCrs;

#[doc(inline)]
pub use graph::{EdgeAttrs, EdgeLabel, VertexKind};

#[doc(inline)]
pub use table::{AttrType, AttrValue, Row, Schema, Table};
