//! CRS reprojection via `proj4rs`, following the PROJ4-string-per-EPSG
//! pattern used for NAD83/WGS84/UTM reprojection in the redistricting
//! toolkit this crate is descended from.

use geo::{Coord, Geometry, MapCoords};
use proj4rs::{proj::Proj, transform::transform};

use crate::error::GeometryError;

/// The fixed EPSG code all stored geometries are expressed in, chosen at
/// `Connector` creation (default EPSG:4326).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalCrs(pub u32);

impl Default for CanonicalCrs {
    fn default() -> Self {
        CanonicalCrs(4326)
    }
}

/// Build a PROJ4 definition string for a supported EPSG code.
fn proj4_string(epsg: u32) -> Option<String> {
    match epsg {
        4326 => Some("+proj=longlat +datum=WGS84 +no_defs +type=crs".to_string()),
        4269 => Some("+proj=longlat +datum=NAD83 +no_defs +type=crs".to_string()),
        3857 => Some(
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 \
             +units=m +nadgrids=@null +wktext +no_defs +type=crs"
                .to_string(),
        ),
        32601..=32660 => Some(format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs +type=crs",
            epsg - 32600
        )),
        32701..=32760 => Some(format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs +type=crs",
            epsg - 32700
        )),
        _ => None,
    }
}

/// Whether coordinates in this EPSG family are in degrees (geographic) or
/// already in meters (projected). `proj4rs::transform` expects geographic
/// inputs/outputs in radians.
fn is_geographic(epsg: u32) -> bool {
    matches!(epsg, 4326 | 4269)
}

/// Reproject `geometry` from `from_epsg` to `to_epsg`. Identity when the
/// two codes match: reprojection between identical CRSs is a no-op.
pub fn reproject(
    id: &str,
    geometry: &Geometry<f64>,
    from_epsg: u32,
    to_epsg: u32,
) -> Result<Geometry<f64>, GeometryError> {
    if from_epsg == to_epsg {
        return Ok(geometry.clone());
    }

    let from_def = proj4_string(from_epsg).ok_or(GeometryError::UnsupportedCrs { epsg: from_epsg })?;
    let to_def = proj4_string(to_epsg).ok_or(GeometryError::UnsupportedCrs { epsg: to_epsg })?;

    let from = Proj::from_proj_string(&from_def).map_err(|_| GeometryError::ReprojectionFailed {
        id: id.to_string(),
        from: from_epsg,
        to: to_epsg,
    })?;
    let to = Proj::from_proj_string(&to_def).map_err(|_| GeometryError::ReprojectionFailed {
        id: id.to_string(),
        from: from_epsg,
        to: to_epsg,
    })?;

    let from_geographic = is_geographic(from_epsg);
    let to_geographic = is_geographic(to_epsg);

    let transform_failed = std::cell::Cell::new(false);
    let result = geometry.map_coords(|coord: Coord<f64>| {
        if transform_failed.get() {
            return coord;
        }
        let (x_in, y_in) = if from_geographic {
            (coord.x.to_radians(), coord.y.to_radians())
        } else {
            (coord.x, coord.y)
        };
        let mut point = (x_in, y_in, 0.0);
        if transform(&from, &to, &mut point).is_err() {
            transform_failed.set(true);
            return coord;
        }
        let (x_out, y_out) = if to_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        Coord { x: x_out, y: y_out }
    });

    if transform_failed.get() {
        return Err(GeometryError::ReprojectionFailed {
            id: id.to_string(),
            from: from_epsg,
            to: to_epsg,
        });
    }

    Ok(result)
}
