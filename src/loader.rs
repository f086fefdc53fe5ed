//! GeoJSON dataset loader.
//!
//! Parses a FeatureCollection of trail routes into [`RouteFeature`]s once at
//! startup. Only `LineString` and `MultiLineString` geometries are accepted;
//! features with any other geometry type are skipped with a warning. A
//! malformed file (unreadable, invalid JSON, no `features` array, positions
//! with fewer than two numbers) is a hard error: the caller must not serve
//! queries from a partially loaded dataset.
//!
//! Property names follow the Norwegian trail datasets:
//!
//! | property      | field                        |
//! |---------------|------------------------------|
//! | `rutenummer`  | `route_numbers`              |
//! | `rutenavn`    | `route_names`                |
//! | `objtype`     | `category`                   |
//! | `gradering`   | `gradings`                   |
//! | `lengde`      | `precomputed_length_meters`  |

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{info, warn};
use serde::de::{Deserializer, Error as DeError};
use serde::Deserialize;
use serde_json::Value;

use crate::{Coordinate, FeatureIndex, Polyline, Result, RouteCategory, RouteFeature, TrailFinderError};

#[derive(Debug, Deserialize)]
struct RawFeatureCollection {
    features: Vec<RawFeature>,
}

#[derive(Debug, Deserialize)]
struct RawFeature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    properties: Option<RawProperties>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProperties {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, alias = "routeNumbers", deserialize_with = "string_list")]
    rutenummer: Vec<String>,
    #[serde(default, alias = "routeNames", deserialize_with = "string_list")]
    rutenavn: Vec<String>,
    #[serde(default, alias = "rutetype", alias = "category")]
    objtype: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    gradering: Vec<String>,
    #[serde(default, alias = "SHAPE_Length", alias = "length", deserialize_with = "lenient_f64")]
    lengde: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

/// Accepts `null`, a single string/number, or an array of them.
fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    fn scalar(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.into_iter().filter_map(scalar).collect()),
        Value::Object(_) => Err(D::Error::custom("expected a string or list of strings")),
        other => Ok(scalar(other).into_iter().collect()),
    }
}

/// Accepts a number or a numeric string.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

fn parse_id(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_position(position: &[f64], feature_pos: usize) -> Result<Coordinate> {
    match position {
        [lon, lat, ..] => Ok(Coordinate::new(*lon, *lat)),
        _ => Err(TrailFinderError::invalid_geometry(format!(
            "feature {} has a position with {} values, expected at least 2",
            feature_pos,
            position.len()
        ))),
    }
}

/// Build a fragment from raw positions; `None` for an empty line.
fn parse_line(positions: &[Vec<f64>], feature_pos: usize) -> Result<Option<Polyline>> {
    if positions.is_empty() {
        return Ok(None);
    }
    let coords = positions
        .iter()
        .map(|p| parse_position(p, feature_pos))
        .collect::<Result<Vec<_>>>()?;
    Polyline::new(coords).map(Some)
}

/// Parse the geometry of one feature. `Ok(None)` means unsupported type.
fn parse_geometry(geometry: RawGeometry, feature_pos: usize) -> Result<Option<Vec<Polyline>>> {
    let lines: Vec<Vec<Vec<f64>>> = match geometry.kind.as_str() {
        "LineString" => {
            let line: Vec<Vec<f64>> = serde_json::from_value(geometry.coordinates)?;
            vec![line]
        }
        "MultiLineString" => serde_json::from_value(geometry.coordinates)?,
        _ => return Ok(None),
    };

    let mut fragments = Vec::with_capacity(lines.len());
    for line in &lines {
        if let Some(polyline) = parse_line(line, feature_pos)? {
            fragments.push(polyline);
        }
    }
    Ok(Some(fragments))
}

fn convert_feature(raw: RawFeature, feature_pos: usize) -> Result<Option<RouteFeature>> {
    let properties = raw.properties.unwrap_or_default();
    let id = parse_id(raw.id.as_ref()).or_else(|| parse_id(properties.id.as_ref()));

    let geometry = match raw.geometry {
        None => Vec::new(),
        Some(geometry) => {
            let kind = geometry.kind.clone();
            match parse_geometry(geometry, feature_pos)? {
                Some(fragments) => fragments,
                None => {
                    warn!(
                        "[Loader] Skipping feature {} (id {:?}): unsupported geometry type '{}'",
                        feature_pos, id, kind
                    );
                    return Ok(None);
                }
            }
        }
    };

    if geometry.is_empty() {
        warn!(
            "[Loader] Feature {} (id {:?}) has empty geometry; kept for dumps only",
            feature_pos, id
        );
    }

    let category = match properties.objtype.as_deref() {
        None => None,
        Some(name) => match name.parse::<RouteCategory>() {
            Ok(category) => Some(category),
            Err(_) => {
                warn!(
                    "[Loader] Feature {} (id {:?}) has unrecognised category '{}'",
                    feature_pos, id, name
                );
                None
            }
        },
    };

    Ok(Some(RouteFeature {
        id,
        route_numbers: properties.rutenummer,
        route_names: properties.rutenavn,
        category,
        gradings: properties.gradering,
        geometry,
        precomputed_length_meters: properties.lengde,
    }))
}

fn convert_collection(collection: RawFeatureCollection) -> Result<Vec<RouteFeature>> {
    let total = collection.features.len();
    let mut features = Vec::with_capacity(total);
    for (pos, raw) in collection.features.into_iter().enumerate() {
        if let Some(feature) = convert_feature(raw, pos)? {
            features.push(feature);
        }
    }
    if features.len() < total {
        warn!(
            "[Loader] Skipped {} of {} features with unsupported geometry",
            total - features.len(),
            total
        );
    }
    Ok(features)
}

/// Parse a GeoJSON FeatureCollection from a string.
pub fn parse_feature_collection(json: &str) -> Result<Vec<RouteFeature>> {
    convert_collection(serde_json::from_str(json)?)
}

/// Parse a GeoJSON FeatureCollection from a reader.
pub fn read_feature_collection<R: Read>(reader: R) -> Result<Vec<RouteFeature>> {
    convert_collection(serde_json::from_reader(reader)?)
}

/// Load route features from a GeoJSON file.
pub fn load_features(path: impl AsRef<Path>) -> Result<Vec<RouteFeature>> {
    let path = path.as_ref();
    info!("[Loader] Loading GeoJSON data from {}", path.display());

    let file = File::open(path)?;
    let features = read_feature_collection(BufReader::new(file))?;

    info!(
        "[Loader] GeoJSON data loaded successfully. Found {} features.",
        features.len()
    );
    Ok(features)
}

/// Load a GeoJSON file and build the feature index.
pub fn load_index(path: impl AsRef<Path>) -> Result<FeatureIndex> {
    Ok(FeatureIndex::new(load_features(path)?))
}
