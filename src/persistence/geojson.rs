//! GeoJSON-like table wire format, covering `Point`, single `Polygon`,
//! and `MultiPolygon` geometries: a feature may be either a point or a
//! polygon while a raster footprint is always a polygon.

use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use serde_json::{json, Map, Value};

use crate::error::PersistenceError;
use crate::table::{AttrValue, Row, Table};

const WIRE_VERSION: u32 = 1;
/// Property key carrying the row id — kept out of the free-form
/// attribute map so it can never collide with a user column.
const ID_PROPERTY: &str = "__id";

pub fn table_to_value(table: &Table) -> Value {
    if table.is_empty() {
        return json!({
            "type": "FeatureCollection",
            "version": WIRE_VERSION,
            "empty": true,
            "features": [],
        });
    }

    let features: Vec<Value> = table
        .iter_rows()
        .map(|(id, row)| {
            let mut properties = Map::new();
            properties.insert(ID_PROPERTY.to_string(), Value::String(id.to_string()));
            for (column, value) in &row.attrs {
                properties.insert(column.clone(), attr_to_json(value));
            }
            json!({
                "type": "Feature",
                "geometry": geometry_to_json(&row.geometry),
                "properties": properties,
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "version": WIRE_VERSION,
        "features": features,
    })
}

pub fn value_to_rows(file: &str, value: &Value) -> Result<Vec<(String, Row)>, PersistenceError> {
    let obj = value.as_object().ok_or_else(|| PersistenceError::Corrupt {
        file: file.to_string(),
        reason: "expected a JSON object".to_string(),
    })?;

    if obj.get("empty").and_then(Value::as_bool) == Some(true) {
        return Ok(Vec::new());
    }

    if let Some(version) = obj.get("version").and_then(Value::as_u64) {
        if version as u32 != WIRE_VERSION {
            return Err(PersistenceError::VersionMismatch { file: file.to_string(), found: version.to_string() });
        }
    }

    let features = obj.get("features").and_then(Value::as_array).ok_or_else(|| PersistenceError::Corrupt {
        file: file.to_string(),
        reason: "missing \"features\" array".to_string(),
    })?;

    let mut rows = Vec::with_capacity(features.len());
    for feature in features {
        let id = feature["properties"][ID_PROPERTY].as_str().ok_or_else(|| PersistenceError::Corrupt {
            file: file.to_string(),
            reason: format!("feature missing {ID_PROPERTY:?} property"),
        })?;
        let geometry = json_to_geometry(file, &feature["geometry"])?;
        let mut attrs = indexmap::IndexMap::new();
        if let Some(properties) = feature["properties"].as_object() {
            for (key, value) in properties {
                if key == ID_PROPERTY {
                    continue;
                }
                attrs.insert(key.clone(), json_to_attr(value));
            }
        }
        rows.push((id.to_string(), Row { geometry, attrs }));
    }
    Ok(rows)
}

fn attr_to_json(value: &AttrValue) -> Value {
    match value {
        AttrValue::String(s) => Value::String(s.clone()),
        AttrValue::Int(v) => json!(v),
        AttrValue::Float(v) => json!(v),
        AttrValue::Bool(v) => Value::Bool(*v),
        AttrValue::Null => Value::Null,
    }
}

fn json_to_attr(value: &Value) -> AttrValue {
    match value {
        Value::String(s) => AttrValue::String(s.clone()),
        Value::Bool(b) => AttrValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttrValue::Int(i)
            } else {
                AttrValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        _ => AttrValue::Null,
    }
}

fn ring_to_json(ring: &LineString<f64>) -> Value {
    json!(ring.coords().map(|c| vec![c.x, c.y]).collect::<Vec<_>>())
}

fn polygon_to_json(polygon: &Polygon<f64>) -> Value {
    let mut rings = vec![ring_to_json(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring_to_json));
    json!(rings)
}

fn geometry_to_json(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
        Geometry::Polygon(poly) => json!({ "type": "Polygon", "coordinates": polygon_to_json(poly) }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_to_json).collect::<Vec<_>>(),
        }),
        other => json!({ "type": "Unsupported", "debug": format!("{other:?}") }),
    }
}

fn parse_ring(file: &str, value: &Value) -> Result<LineString<f64>, PersistenceError> {
    let coords = value.as_array().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "expected a ring array".to_string() })?;
    let mut points = Vec::with_capacity(coords.len());
    for pair in coords {
        let pair = pair.as_array().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "expected a [x, y] pair".to_string() })?;
        let x = pair.first().and_then(Value::as_f64).ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "missing x".to_string() })?;
        let y = pair.get(1).and_then(Value::as_f64).ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "missing y".to_string() })?;
        points.push(Coord { x, y });
    }
    Ok(LineString::new(points))
}

fn parse_polygon(file: &str, value: &Value) -> Result<Polygon<f64>, PersistenceError> {
    let rings = value.as_array().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "expected polygon ring array".to_string() })?;
    let exterior = rings.first().map(|r| parse_ring(file, r)).transpose()?.unwrap_or_else(|| LineString::new(vec![]));
    let interiors = rings[1.min(rings.len())..].iter().map(|r| parse_ring(file, r)).collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn json_to_geometry(file: &str, value: &Value) -> Result<Geometry<f64>, PersistenceError> {
    let ty = value["type"].as_str().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "geometry missing \"type\"".to_string() })?;
    let coords = &value["coordinates"];
    match ty {
        "Point" => {
            let arr = coords.as_array().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "expected point coordinates".to_string() })?;
            let x = arr.first().and_then(Value::as_f64).unwrap_or(f64::NAN);
            let y = arr.get(1).and_then(Value::as_f64).unwrap_or(f64::NAN);
            Ok(Geometry::Point(Point::new(x, y)))
        }
        "Polygon" => Ok(Geometry::Polygon(parse_polygon(file, coords)?)),
        "MultiPolygon" => {
            let polys = coords.as_array().ok_or_else(|| PersistenceError::Corrupt { file: file.to_string(), reason: "expected multipolygon coordinates".to_string() })?;
            let parsed = polys.iter().map(|p| parse_polygon(file, p)).collect::<Result<Vec<_>, _>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon(parsed)))
        }
        other => Err(PersistenceError::Corrupt { file: file.to_string(), reason: format!("unsupported geometry type {other:?}") }),
    }
}
