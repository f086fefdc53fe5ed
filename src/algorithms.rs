//! # Algorithm Toolbox
//!
//! Direct access to the distance and identity building blocks, for callers
//! that want them without building a [`FeatureIndex`](crate::FeatureIndex).
//!
//! ## Distance
//!
//! - **Great-circle distance**: haversine on a 6,371 km sphere
//! - **Point-to-polyline distance**: vertex-scan or endpoint-only
//! - **Polyline length**: sum of segment distances
//!
//! ## Identity
//!
//! - **Route identity**: [`RouteFeature::identities`], every usable route
//!   number, else the first usable name
//! - **Sentinel check**: [`is_sentinel_identity`]
//!
//! Grouping and geometry merging happen only inside the query engine; see
//! [`nearest`](crate::nearest) with [`QueryMode::Grouped`](crate::QueryMode).
//!
//! # Example
//!
//! ```rust
//! use trail_finder::algorithms::{great_circle_distance, Coordinate};
//!
//! let oslo = Coordinate::from_lat_lon(59.9139, 10.7522);
//! let trondheim = Coordinate::from_lat_lon(63.4305, 10.3951);
//! let distance = great_circle_distance(oslo, trondheim);
//! println!("Oslo to Trondheim: {:.0} km", distance / 1000.0);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{
    Bounds, Coordinate, MultiLineGeometry, Polyline, RouteCategory, RouteFeature, RouteIdentity,
};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    great_circle_distance, min_distance_to_fragments, min_distance_to_polyline, polyline_length,
    DistancePolicy, EARTH_RADIUS_METERS,
};

// =============================================================================
// Identity
// =============================================================================

/// Sentinel check used for identity grouping.
pub use crate::is_sentinel_identity;

// =============================================================================
// Spatial Indexing
// =============================================================================

/// R-tree spatial index for custom geographic queries.
pub use rstar::RTree;

/// Trait for types that can be spatially indexed.
pub use rstar::RTreeObject;

/// Axis-aligned bounding box for spatial queries.
pub use rstar::AABB;
