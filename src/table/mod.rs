//! Row-keyed tabular store (`vectors` and `rasters`). Modeled as an
//! open attribute map per row, the same "free-form properties" shape as
//! a GeoJSON feature's `properties` object, rather than a columnar
//! `DataFrame`, since the public contract is row-oriented (`insert_rows`,
//! `get_row`, `set_cell`).

mod schema;
mod value;

pub use schema::{AttrType, Schema};
pub use value::AttrValue;

use geo::Geometry;
use indexmap::IndexMap;

use crate::error::{ConnectorError, IdentifierError, Result, SchemaError};

/// A single row: a geometry plus an open attribute map.
#[derive(Debug, Clone)]
pub struct Row {
    pub geometry: Geometry<f64>,
    pub attrs: IndexMap<String, AttrValue>,
}

/// One of the two relations the connector maintains (`vectors` or
/// `rasters`). Generic over nothing — both tables share this shape; what
/// differs is which required columns the connector validates at the
/// boundary.
#[derive(Debug, Default)]
pub struct Table {
    name: &'static str,
    rows: IndexMap<String, Row>,
    schema: Schema,
}

impl Table {
    pub fn new(name: &'static str) -> Self {
        Self { name, rows: IndexMap::new(), schema: Schema::new() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn has_row(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn get_row(&self, id: &str) -> Option<&Row> {
        self.rows.get(id)
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = (&str, &Row)> {
        self.rows.iter().map(|(id, row)| (id.as_str(), row))
    }

    /// Insert rows; fails if any id already exists in this table, or if a
    /// row writes a column to a type that conflicts with one already
    /// established in the schema. Widens the schema to accommodate any
    /// new columns the rows introduce. Validated against a scratch copy
    /// of the schema before anything is committed, so a type conflict
    /// partway through the batch leaves the table and schema untouched.
    pub fn insert_rows(&mut self, rows: Vec<(String, Row)>) -> Result<()> {
        for (id, _) in &rows {
            if self.rows.contains_key(id) {
                return Err(ConnectorError::Identifier(IdentifierError::Duplicate {
                    id: id.clone(),
                    table: self.name,
                }));
            }
        }
        let mut schema = self.schema.clone();
        for (_, row) in &rows {
            for (column, value) in &row.attrs {
                schema.widen(column, value.attr_type())?;
            }
        }
        self.schema = schema;
        for (id, row) in rows {
            self.rows.insert(id, row);
        }
        Ok(())
    }

    /// Drop rows; fails if any id is missing.
    pub fn drop_rows(&mut self, ids: &[String]) -> Result<()> {
        for id in ids {
            if !self.rows.contains_key(id) {
                return Err(ConnectorError::Identifier(IdentifierError::NotFound {
                    id: id.clone(),
                    table: self.name,
                }));
            }
        }
        for id in ids {
            self.rows.shift_remove(id);
        }
        Ok(())
    }

    pub fn set_cell(&mut self, id: &str, column: &str, value: AttrValue) -> Result<()> {
        let row = self.rows.get_mut(id).ok_or_else(|| {
            ConnectorError::Identifier(IdentifierError::NotFound { id: id.to_string(), table: self.name })
        })?;
        self.schema.widen(column, value.attr_type())?;
        row.attrs.insert(column.to_string(), value);
        Ok(())
    }

    pub fn add_column(&mut self, column: &str, ty: AttrType, default: AttrValue) -> Result<()> {
        self.schema.widen(column, ty)?;
        for row in self.rows.values_mut() {
            row.attrs.entry(column.to_string()).or_insert_with(|| default.clone());
        }
        Ok(())
    }

    pub fn drop_column(&mut self, column: &str) -> Result<()> {
        if !self.schema.contains(column) {
            return Err(ConnectorError::Schema(SchemaError::MissingColumn { column: column.to_string() }));
        }
        self.schema.remove(column);
        for row in self.rows.values_mut() {
            row.attrs.shift_remove(column);
        }
        Ok(())
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.schema.contains(from) {
            return Err(ConnectorError::Schema(SchemaError::MissingColumn { column: from.to_string() }));
        }
        self.schema.rename(from, to);
        for row in self.rows.values_mut() {
            if let Some(value) = row.attrs.shift_remove(from) {
                row.attrs.insert(to.to_string(), value);
            }
        }
        Ok(())
    }

    pub fn require_column(&self, column: &str, expected: AttrType) -> Result<()> {
        match self.schema.type_of(column) {
            None => Err(ConnectorError::Schema(SchemaError::MissingColumn { column: column.to_string() })),
            Some(found) if found != expected => Err(ConnectorError::Schema(SchemaError::TypeMismatch {
                column: column.to_string(),
                expected: expected.name(),
                found: found.name(),
            })),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, Geometry};

    fn row(x: f64, y: f64) -> Row {
        Row { geometry: Geometry::Point(point!(x: x, y: y)), attrs: IndexMap::new() }
    }

    #[test]
    fn insert_then_get() {
        let mut t = Table::new("vectors");
        t.insert_rows(vec![("f1".to_string(), row(1.0, 2.0))]).unwrap();
        assert!(t.has_row("f1"));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn insert_duplicate_is_rejected_and_atomic() {
        let mut t = Table::new("vectors");
        t.insert_rows(vec![("f1".to_string(), row(0.0, 0.0))]).unwrap();
        let err = t.insert_rows(vec![("f2".to_string(), row(1.0, 1.0)), ("f1".to_string(), row(2.0, 2.0))]);
        assert!(err.is_err());
        assert!(!t.has_row("f2")); // batch is all-or-nothing
    }

    #[test]
    fn drop_missing_is_rejected() {
        let mut t = Table::new("vectors");
        assert!(t.drop_rows(&["ghost".to_string()]).is_err());
    }

    #[test]
    fn add_column_defaults_existing_rows() {
        let mut t = Table::new("vectors");
        t.insert_rows(vec![("f1".to_string(), row(0.0, 0.0))]).unwrap();
        t.add_column("type", AttrType::String, AttrValue::String("unknown".to_string())).unwrap();
        assert_eq!(
            t.get_row("f1").unwrap().attrs.get("type"),
            Some(&AttrValue::String("unknown".to_string()))
        );
    }
}
