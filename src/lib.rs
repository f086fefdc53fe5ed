//! # Trail Finder
//!
//! Nearest-route queries against foot, ski and bike trail polylines.
//!
//! This library provides:
//! - A typed model of trail route features loaded from a GeoJSON feature collection
//! - Great-circle point-to-polyline distance with selectable policies
//! - An immutable feature index grouped by logical route identity
//! - A nearest-K query engine with category, length and id filters
//!
//! ## Features
//!
//! - **`parallel`** - Evaluate feature distances in parallel with rayon
//! - **`http`** - Enable the HTTP boundary and the `trail-finder` server binary
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trail_finder::{Coordinate, FeatureIndex, Polyline, QueryOptions, RouteFeature, nearest};
//!
//! let line = Polyline::new(vec![
//!     Coordinate::new(10.7522, 59.9139),
//!     Coordinate::new(10.7600, 59.9200),
//! ])
//! .unwrap();
//!
//! let feature = RouteFeature {
//!     id: Some(1),
//!     route_names: vec!["Akerselva".to_string()],
//!     geometry: vec![line],
//!     ..RouteFeature::default()
//! };
//!
//! let index = FeatureIndex::new(vec![feature]);
//! let results = nearest(&index, Coordinate::new(10.75, 59.91), &QueryOptions::default()).unwrap();
//! assert_eq!(results.len(), 1);
//! println!("{} at {} m", results[0].display_name(), results[0].distance_meters);
//! ```

use std::fmt;
use std::str::FromStr;

use geo::{BoundingRect, Coord, LineString};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrailFinderError};

// Geographic utilities (haversine, point-to-polyline distance)
pub mod geo_utils;
pub use geo_utils::{
    great_circle_distance, min_distance_to_fragments, min_distance_to_polyline, DistancePolicy,
};

// Immutable feature index (arena + identity/id/category lookups)
pub mod index;
pub use index::{FeatureIndex, IndexStats};

// Nearest-route query engine
pub mod query;
pub use query::{nearest, QueryEngine, QueryMode, QueryOptions, RouteResult};

// GeoJSON dataset loader
pub mod loader;
pub use loader::{load_features, load_index, parse_feature_collection};

// Query defaults and server configuration
pub mod config;
pub use config::QueryDefaults;

// Algorithm toolbox - standalone access to the distance and grouping building blocks
pub mod algorithms;

// HTTP boundary (axum router)
#[cfg(feature = "http")]
pub mod http;

/// Placeholder value some datasets use for a missing route name or number.
/// Never used as a route identity.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Check whether a name or number is unusable as a route identity.
pub fn is_sentinel_identity(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN_IDENTITY)
}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate stored as (longitude, latitude) in degrees.
///
/// This is the only place axis order is decided. Serializes as the GeoJSON
/// position `[lon, lat]`; build from latitude-first input with
/// [`Coordinate::from_lat_lon`].
///
/// # Example
/// ```
/// use trail_finder::Coordinate;
/// let oslo = Coordinate::from_lat_lon(59.9139, 10.7522);
/// assert_eq!(oslo.lon_lat(), [10.7522, 59.9139]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", from = "[f64; 2]")]
pub struct Coordinate {
    pub lon: f64,
    pub lat: f64,
}

impl Coordinate {
    /// Create a coordinate from longitude and latitude (GeoJSON order).
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Create a coordinate from latitude and longitude (map/query order).
    pub fn from_lat_lon(lat: f64, lon: f64) -> Self {
        Self { lon, lat }
    }

    /// The coordinate as a GeoJSON position.
    pub fn lon_lat(&self) -> [f64; 2] {
        [self.lon, self.lat]
    }

    /// Both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

impl From<[f64; 2]> for Coordinate {
    fn from(position: [f64; 2]) -> Self {
        Self::new(position[0], position[1])
    }
}

impl From<Coordinate> for [f64; 2] {
    fn from(coord: Coordinate) -> Self {
        coord.lon_lat()
    }
}

impl From<Coordinate> for Coord<f64> {
    fn from(coord: Coordinate) -> Self {
        Coord {
            x: coord.lon,
            y: coord.lat,
        }
    }
}

impl From<Coord<f64>> for Coordinate {
    fn from(coord: Coord<f64>) -> Self {
        Self::new(coord.x, coord.y)
    }
}

/// An ordered, non-empty sequence of coordinates.
///
/// Coordinates are stored exactly as provided; there is no reprojection or
/// simplification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Polyline(Vec<Coordinate>);

impl Polyline {
    /// Create a polyline, failing with `InvalidGeometry` when `coords` is empty.
    pub fn new(coords: Vec<Coordinate>) -> Result<Self> {
        if coords.is_empty() {
            return Err(TrailFinderError::invalid_geometry(
                "polyline must contain at least one coordinate",
            ));
        }
        Ok(Self(coords))
    }

    pub fn coords(&self) -> &[Coordinate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Coordinate {
        self.0[0]
    }

    pub fn last(&self) -> Coordinate {
        self.0[self.0.len() - 1]
    }

    /// Convert to a geo `LineString` (x = longitude, y = latitude).
    pub fn to_line_string(&self) -> LineString<f64> {
        LineString::new(self.0.iter().map(|&c| Coord::from(c)).collect())
    }

    /// Length along the polyline in meters.
    pub fn length_meters(&self) -> f64 {
        geo_utils::polyline_length(&self.0)
    }
}

impl AsRef<[Coordinate]> for Polyline {
    fn as_ref(&self) -> &[Coordinate] {
        &self.0
    }
}

/// Trail route category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RouteCategory {
    AnnenRute,
    Fotrute,
    #[serde(rename = "Skiløype")]
    Skiloype,
    Sykkelrute,
}

impl RouteCategory {
    pub const ALL: [RouteCategory; 4] = [
        RouteCategory::AnnenRute,
        RouteCategory::Fotrute,
        RouteCategory::Skiloype,
        RouteCategory::Sykkelrute,
    ];

    /// Canonical dataset name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteCategory::AnnenRute => "AnnenRute",
            RouteCategory::Fotrute => "Fotrute",
            RouteCategory::Skiloype => "Skiløype",
            RouteCategory::Sykkelrute => "Sykkelrute",
        }
    }
}

impl fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteCategory {
    type Err = TrailFinderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "AnnenRute" => Ok(RouteCategory::AnnenRute),
            "Fotrute" => Ok(RouteCategory::Fotrute),
            "Skiløype" | "Skiloype" => Ok(RouteCategory::Skiloype),
            "Sykkelrute" => Ok(RouteCategory::Sykkelrute),
            other => Err(TrailFinderError::InvalidFilter {
                value: other.to_string(),
            }),
        }
    }
}

/// Logical route identity shared by fragments of the same route.
///
/// Route numbers take precedence over names. Ordering is total and
/// deterministic, used to break distance ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RouteIdentity {
    Number(String),
    Name(String),
}

impl RouteIdentity {
    pub fn as_str(&self) -> &str {
        match self {
            RouteIdentity::Number(s) | RouteIdentity::Name(s) => s,
        }
    }
}

impl fmt::Display for RouteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Bounds of a set of polylines, `None` when there are no fragments.
    pub fn from_polylines(lines: &[Polyline]) -> Option<Self> {
        lines
            .iter()
            .filter_map(|line| line.to_line_string().bounding_rect())
            .map(|rect| Self {
                min_lat: rect.min().y,
                max_lat: rect.max().y,
                min_lng: rect.min().x,
                max_lng: rect.max().x,
            })
            .reduce(|a, b| a.union(&b))
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }
}

/// One route record from the dataset.
///
/// Created once at load time and never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteFeature {
    /// Dataset id (absent in some legacy datasets)
    pub id: Option<u64>,
    /// Route numbers labelling this fragment
    pub route_numbers: Vec<String>,
    /// Human-readable names, in source order
    pub route_names: Vec<String>,
    pub category: Option<RouteCategory>,
    /// Difficulty gradings, in source order
    pub gradings: Vec<String>,
    /// One or more fragments; empty when the source geometry was empty
    pub geometry: Vec<Polyline>,
    /// Length from the source dataset, used only by the minimum-length filter
    pub precomputed_length_meters: Option<f64>,
}

impl RouteFeature {
    /// The primary route identity: first usable route number, else first
    /// usable route name.
    pub fn identity(&self) -> Option<RouteIdentity> {
        self.identities().into_iter().next()
    }

    /// Every route identity this fragment belongs to.
    ///
    /// A fragment shared by several routes carries all their numbers and is a
    /// member of each. Names only count when no usable number exists, and
    /// then only the first.
    pub fn identities(&self) -> Vec<RouteIdentity> {
        let mut numbers: Vec<RouteIdentity> = Vec::new();
        for number in self.route_numbers.iter().filter(|n| !is_sentinel_identity(n)) {
            let identity = RouteIdentity::Number(number.trim().to_string());
            if !numbers.contains(&identity) {
                numbers.push(identity);
            }
        }
        if !numbers.is_empty() {
            return numbers;
        }
        self.route_names
            .iter()
            .find(|n| !is_sentinel_identity(n))
            .map(|name| vec![RouteIdentity::Name(name.trim().to_string())])
            .unwrap_or_default()
    }

    pub fn has_geometry(&self) -> bool {
        !self.geometry.is_empty()
    }

    /// Total length of all fragments in meters.
    pub fn geometry_length(&self) -> f64 {
        self.geometry.iter().map(Polyline::length_meters).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.geometry.iter().map(Polyline::len).sum()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_polylines(&self.geometry)
    }
}

/// Multi-line geometry, serialized as a GeoJSON `MultiLineString`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "type", rename = "MultiLineString")]
pub struct MultiLineGeometry {
    pub coordinates: Vec<Polyline>,
}

impl MultiLineGeometry {
    pub fn new(coordinates: Vec<Polyline>) -> Self {
        Self { coordinates }
    }

    pub fn line_count(&self) -> usize {
        self.coordinates.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
