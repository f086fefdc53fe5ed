//! # Feature Index
//!
//! Immutable in-memory collection of every loaded [`RouteFeature`].
//!
//! Features live in a single arena (insertion order) and every lookup table
//! stores arena indices:
//! - route identity → member features (for grouped nearest queries); a
//!   fragment carrying several route numbers is a member of each route
//! - dataset id → feature
//! - category → features
//! - R-tree of per-feature bounding boxes (for the `bbox` dataset filter)
//!
//! All tables are built once in [`FeatureIndex::new`]. There are no mutation
//! operations afterwards, so a shared `&FeatureIndex` (or `Arc<FeatureIndex>`)
//! can be read from any number of threads without locking.

use std::collections::{BTreeMap, HashMap};

use log::{info, warn};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{Bounds, RouteCategory, RouteFeature, RouteIdentity};

/// Bounding box wrapper for R-tree spatial indexing.
#[derive(Debug, Clone)]
struct FeatureEnvelope {
    idx: usize,
    bounds: Bounds,
}

impl RTreeObject for FeatureEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lng, self.bounds.min_lat],
            [self.bounds.max_lng, self.bounds.max_lat],
        )
    }
}

/// Index statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub feature_count: usize,
    pub identity_count: usize,
    pub fragment_count: usize,
    pub vertex_count: usize,
    /// Features with no usable route number or name
    pub unidentified_count: usize,
    /// Features whose source geometry was empty
    pub empty_geometry_count: usize,
    /// Summed fragment length, rounded to whole meters
    pub total_length_meters: u64,
}

/// Read-only collection of route features with prebuilt lookup tables.
#[derive(Debug)]
pub struct FeatureIndex {
    features: Vec<RouteFeature>,
    by_identity: BTreeMap<RouteIdentity, Vec<usize>>,
    by_id: HashMap<u64, usize>,
    by_category: HashMap<RouteCategory, Vec<usize>>,
    spatial_index: RTree<FeatureEnvelope>,
    stats: IndexStats,
}

impl FeatureIndex {
    /// Build the index from loaded features.
    ///
    /// Duplicate dataset ids keep the first occurrence for id lookups; the
    /// duplicate stays in [`all`](Self::all) and in identity groups.
    /// `identity_count` counts distinct identities, so a shared fragment does
    /// not inflate it.
    pub fn new(features: Vec<RouteFeature>) -> Self {
        let mut by_identity: BTreeMap<RouteIdentity, Vec<usize>> = BTreeMap::new();
        let mut by_id: HashMap<u64, usize> = HashMap::with_capacity(features.len());
        let mut by_category: HashMap<RouteCategory, Vec<usize>> = HashMap::new();
        let mut envelopes = Vec::with_capacity(features.len());
        let mut total_length = 0.0;
        let mut stats = IndexStats {
            feature_count: features.len(),
            ..IndexStats::default()
        };

        for (idx, feature) in features.iter().enumerate() {
            if let Some(id) = feature.id {
                if by_id.contains_key(&id) {
                    warn!("[FeatureIndex] Duplicate feature id {} at position {}, keeping first", id, idx);
                } else {
                    by_id.insert(id, idx);
                }
            }

            let identities = feature.identities();
            if identities.is_empty() {
                stats.unidentified_count += 1;
            }
            for identity in identities {
                by_identity.entry(identity).or_default().push(idx);
            }

            if let Some(category) = feature.category {
                by_category.entry(category).or_default().push(idx);
            }

            if let Some(bounds) = feature.bounds() {
                envelopes.push(FeatureEnvelope { idx, bounds });
            } else {
                stats.empty_geometry_count += 1;
            }

            stats.fragment_count += feature.geometry.len();
            stats.vertex_count += feature.vertex_count();
            total_length += feature.geometry_length();
        }

        stats.identity_count = by_identity.len();
        stats.total_length_meters = total_length.round() as u64;

        info!(
            "[FeatureIndex] Built index: {} features, {} identities, {} fragments, {} vertices, {:.1} km",
            stats.feature_count,
            stats.identity_count,
            stats.fragment_count,
            stats.vertex_count,
            total_length / 1000.0
        );

        Self {
            features,
            by_identity,
            by_id,
            by_category,
            spatial_index: RTree::bulk_load(envelopes),
            stats,
        }
    }

    /// All features in insertion order.
    pub fn all(&self) -> &[RouteFeature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features whose id is in `ids`, in insertion order.
    ///
    /// Ids not present in the dataset are silently omitted; callers needing a
    /// strict existence check must compare the result against their request.
    pub fn by_id<I>(&self, ids: I) -> Vec<&RouteFeature>
    where
        I: IntoIterator<Item = u64>,
    {
        self.indices_by_id(ids)
            .into_iter()
            .map(|idx| &self.features[idx])
            .collect()
    }

    /// Arena indices for `ids`, sorted and deduplicated.
    pub(crate) fn indices_by_id<I>(&self, ids: I) -> Vec<usize>
    where
        I: IntoIterator<Item = u64>,
    {
        let mut indices: Vec<usize> = ids
            .into_iter()
            .filter_map(|id| self.by_id.get(&id).copied())
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Features of the given category, in insertion order.
    pub fn by_category(&self, category: RouteCategory) -> Vec<&RouteFeature> {
        self.by_category
            .get(&category)
            .map(|indices| indices.iter().map(|&idx| &self.features[idx]).collect())
            .unwrap_or_default()
    }

    /// Features sharing a route identity, in insertion order.
    pub fn by_identity(&self, identity: &RouteIdentity) -> Vec<&RouteFeature> {
        self.by_identity
            .get(identity)
            .map(|indices| indices.iter().map(|&idx| &self.features[idx]).collect())
            .unwrap_or_default()
    }

    /// All route identities in ascending order.
    pub fn identities(&self) -> impl Iterator<Item = &RouteIdentity> {
        self.by_identity.keys()
    }

    /// Identity groups as (identity, arena indices), ascending by identity.
    pub(crate) fn identity_groups(&self) -> &BTreeMap<RouteIdentity, Vec<usize>> {
        &self.by_identity
    }

    /// Features whose bounding box intersects `bounds`, in insertion order.
    pub fn in_viewport(&self, bounds: &Bounds) -> Vec<&RouteFeature> {
        let search_bounds = AABB::from_corners(
            [bounds.min_lng, bounds.min_lat],
            [bounds.max_lng, bounds.max_lat],
        );

        let mut indices: Vec<usize> = self
            .spatial_index
            .locate_in_envelope_intersecting(&search_bounds)
            .map(|envelope| envelope.idx)
            .collect();
        indices.sort_unstable();
        indices.iter().map(|&idx| &self.features[idx]).collect()
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// The full dataset as a GeoJSON FeatureCollection.
    ///
    /// Includes features that never appear in grouped results (no identity or
    /// empty geometry). The output uses the same property names the loader
    /// reads, so it can be loaded again.
    pub fn to_feature_collection(&self) -> Value {
        feature_collection(self.features.iter())
    }

    /// Features intersecting `bounds` as a GeoJSON FeatureCollection.
    ///
    /// Features without geometry never intersect anything.
    pub fn to_feature_collection_within(&self, bounds: &Bounds) -> Value {
        feature_collection(self.in_viewport(bounds).into_iter())
    }
}

fn feature_collection<'a>(features: impl Iterator<Item = &'a RouteFeature>) -> Value {
    let features: Vec<Value> = features.map(feature_to_geojson).collect();
    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

fn feature_to_geojson(feature: &RouteFeature) -> Value {
    let geometry = match feature.geometry.as_slice() {
        [] => Value::Null,
        [single] => json!({ "type": "LineString", "coordinates": single }),
        lines => json!({ "type": "MultiLineString", "coordinates": lines }),
    };

    let mut properties = json!({
        "rutenummer": feature.route_numbers,
        "rutenavn": feature.route_names,
        "gradering": feature.gradings,
    });
    if let Some(category) = feature.category {
        properties["objtype"] = json!(category.as_str());
    }
    if let Some(length) = feature.precomputed_length_meters {
        properties["lengde"] = json!(length);
    }

    let mut value = json!({
        "type": "Feature",
        "properties": properties,
        "geometry": geometry,
    });
    if let Some(id) = feature.id {
        value["id"] = json!(id);
    }
    value
}
