use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    String,
    Int,
    Float,
    Bool,
    Null,
}

impl AttrType {
    pub fn name(&self) -> &'static str {
        match self {
            AttrType::String => "string",
            AttrType::Int => "int",
            AttrType::Float => "float",
            AttrType::Bool => "bool",
            AttrType::Null => "null",
        }
    }
}

/// Ordered column name -> type map, widened (never narrowed) as rows with
/// new columns are inserted.
#[derive(Debug, Default, Clone)]
pub struct Schema {
    columns: IndexMap<String, AttrType>,
}

impl Schema {
    pub fn new() -> Self {
        Self { columns: IndexMap::new() }
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn type_of(&self, column: &str) -> Option<AttrType> {
        self.columns.get(column).copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, AttrType)> {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    /// Register `column` with `ty` if unseen, or widen `Null` to a
    /// concrete type once one is observed. A `Null` value written to an
    /// already-concrete column is tolerated and changes nothing. A column
    /// already typed as a concrete type that disagrees with a new
    /// concrete `ty` is a genuine conflict and raises `TypeMismatch`.
    pub fn widen(&mut self, column: &str, ty: AttrType) -> Result<(), SchemaError> {
        match self.columns.get(column).copied() {
            None => {
                self.columns.insert(column.to_string(), ty);
                Ok(())
            }
            Some(AttrType::Null) if ty != AttrType::Null => {
                self.columns.insert(column.to_string(), ty);
                Ok(())
            }
            Some(existing) if existing != ty && ty != AttrType::Null => Err(SchemaError::TypeMismatch {
                column: column.to_string(),
                expected: existing.name(),
                found: ty.name(),
            }),
            _ => Ok(()),
        }
    }

    pub fn remove(&mut self, column: &str) {
        self.columns.shift_remove(column);
    }

    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(ty) = self.columns.shift_remove(from) {
            self.columns.insert(to.to_string(), ty);
        }
    }
}
