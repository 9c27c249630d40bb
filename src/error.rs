use std::fmt;

/// Error taxonomy for the connector core.
///
/// Internal helpers return these directly; the public API wraps
/// collaborator failures in [`CollaboratorReport`] instead of propagating
/// a single error, since those calls are explicitly not all-or-nothing.
#[derive(Debug)]
pub enum ConnectorError {
    /// Duplicate id across either table, unknown id in a drop, or an id
    /// namespace collision between `vectors` and `rasters`.
    Identifier(IdentifierError),
    /// Invalid geometry, empty geometry, failed reprojection, or a CRS
    /// missing on input.
    Geometry(GeometryError),
    /// Required column missing or a column type mismatch.
    Schema(SchemaError),
    /// A self-consistency check failed; only reachable by internal bugs
    /// or direct tampering with the tables outside the mutation API.
    Invariant(String),
    /// I/O failure, corrupt wire format, or a version mismatch on load.
    Persistence(PersistenceError),
}

#[derive(Debug)]
pub enum IdentifierError {
    Duplicate { id: String, table: &'static str },
    NotFound { id: String, table: &'static str },
    NamespaceCollision { id: String },
}

#[derive(Debug)]
pub enum GeometryError {
    Empty { id: String },
    Invalid { id: String, reason: String },
    UnsupportedCrs { epsg: u32 },
    ReprojectionFailed { id: String, from: u32, to: u32 },
}

#[derive(Debug)]
pub enum SchemaError {
    MissingColumn { column: String },
    TypeMismatch { column: String, expected: &'static str, found: &'static str },
}

#[derive(Debug)]
pub enum PersistenceError {
    Io(String),
    Corrupt { file: String, reason: String },
    VersionMismatch { file: String, found: String },
    MissingFile { file: String },
}

impl fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorError::Identifier(e) => write!(f, "identifier error: {e}"),
            ConnectorError::Geometry(e) => write!(f, "geometry error: {e}"),
            ConnectorError::Schema(e) => write!(f, "schema error: {e}"),
            ConnectorError::Invariant(msg) => write!(f, "invariant violated: {msg}"),
            ConnectorError::Persistence(e) => write!(f, "persistence error: {e}"),
        }
    }
}

impl fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentifierError::Duplicate { id, table } => {
                write!(f, "id {id:?} already exists in {table}")
            }
            IdentifierError::NotFound { id, table } => {
                write!(f, "id {id:?} not found in {table}")
            }
            IdentifierError::NamespaceCollision { id } => {
                write!(f, "id {id:?} already used in the other table")
            }
        }
    }
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::Empty { id } => write!(f, "{id:?} has an empty geometry"),
            GeometryError::Invalid { id, reason } => write!(f, "{id:?} has an invalid geometry: {reason}"),
            GeometryError::UnsupportedCrs { epsg } => write!(f, "EPSG:{epsg} is not a supported CRS"),
            GeometryError::ReprojectionFailed { id, from, to } => {
                write!(f, "failed to reproject {id:?} from EPSG:{from} to EPSG:{to}")
            }
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::MissingColumn { column } => write!(f, "missing required column {column:?}"),
            SchemaError::TypeMismatch { column, expected, found } => {
                write!(f, "column {column:?} expected type {expected}, found {found}")
            }
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Io(msg) => write!(f, "I/O failure: {msg}"),
            PersistenceError::Corrupt { file, reason } => write!(f, "{file} is corrupt: {reason}"),
            PersistenceError::VersionMismatch { file, found } => {
                write!(f, "{file} has unsupported version {found}")
            }
            PersistenceError::MissingFile { file } => write!(f, "expected file {file} is missing"),
        }
    }
}

impl std::error::Error for ConnectorError {}
impl std::error::Error for IdentifierError {}
impl std::error::Error for GeometryError {}
impl std::error::Error for SchemaError {}
impl std::error::Error for PersistenceError {}

impl From<IdentifierError> for ConnectorError {
    fn from(e: IdentifierError) -> Self { ConnectorError::Identifier(e) }
}
impl From<GeometryError> for ConnectorError {
    fn from(e: GeometryError) -> Self { ConnectorError::Geometry(e) }
}
impl From<SchemaError> for ConnectorError {
    fn from(e: SchemaError) -> Self { ConnectorError::Schema(e) }
}
impl From<PersistenceError> for ConnectorError {
    fn from(e: PersistenceError) -> Self { ConnectorError::Persistence(e) }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

/// A per-id failure raised by a downloader or label-maker collaborator.
#[derive(Debug)]
pub struct CollaboratorError {
    pub id: String,
    pub cause: anyhow::Error,
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collaborator failed on {:?}: {}", self.id, self.cause)
    }
}

/// Outcome of a batch collaborator call: downloaders/label-makers are
/// explicitly not all-or-nothing, so successes already integrated survive
/// a later item's failure.
#[derive(Debug, Default)]
pub struct CollaboratorReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<CollaboratorError>,
}

impl CollaboratorReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}
