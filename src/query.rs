//! # Query Engine
//!
//! Nearest-route queries against a [`FeatureIndex`].
//!
//! Three modes share the same filtering and distance computation:
//! - **Grouped** (default): one result per route identity. Fragments sharing a
//!   route number (or, failing that, a name) are merged; the group's distance
//!   is the minimum over its members. Features without a usable identity are
//!   dropped.
//! - **Per-feature**: one result per feature, geometry unmerged.
//! - **Explicit ids**: exactly the features with the requested ids, each with
//!   its distance. Bypasses nearest selection entirely.
//!
//! Queries are pure functions of (index, point, options): no shared mutable
//! state, no I/O, safe to run concurrently against the same index.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::QueryDefaults;
use crate::geo_utils::min_distance_to_fragments;
use crate::{
    is_sentinel_identity, Coordinate, DistancePolicy, FeatureIndex, IndexStats,
    MultiLineGeometry, Result, RouteCategory, RouteFeature, RouteIdentity, TrailFinderError,
    UNKNOWN_IDENTITY,
};

// ============================================================================
// Options
// ============================================================================

/// Result shape of a nearest query without explicit ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryMode {
    /// One result per route identity, fragments merged
    #[default]
    Grouped,
    /// One result per feature, no identity grouping
    PerFeature,
}

impl FromStr for QueryMode {
    type Err = TrailFinderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grouped" | "routes" => Ok(QueryMode::Grouped),
            "per-feature" | "features" | "raw" => Ok(QueryMode::PerFeature),
            other => Err(TrailFinderError::invalid_parameter(
                "mode",
                format!("unknown query mode '{}'", other),
            )),
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QueryMode::Grouped => "grouped",
            QueryMode::PerFeature => "per-feature",
        })
    }
}

/// Options for a nearest query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Maximum number of results. Must be positive. Default: 5
    pub limit: usize,
    /// Only consider features of this category. Default: any
    pub category: Option<RouteCategory>,
    /// Drop features whose source length is below this. Features without a
    /// source length are never dropped. Default: 0
    pub min_length_meters: f64,
    /// Default: vertex-scan
    pub distance_policy: DistancePolicy,
    /// Return exactly these features instead of the nearest ones
    pub explicit_ids: Option<Vec<u64>>,
    pub mode: QueryMode,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            category: None,
            min_length_meters: 0.0,
            distance_policy: DistancePolicy::VertexScan,
            explicit_ids: None,
            mode: QueryMode::Grouped,
        }
    }
}

impl QueryOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_category(mut self, category: RouteCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the category filter from its dataset name.
    ///
    /// Fails with `InvalidFilter` for names outside the enumeration.
    pub fn with_category_name(self, name: &str) -> Result<Self> {
        Ok(self.with_category(name.parse()?))
    }

    pub fn with_min_length(mut self, meters: f64) -> Self {
        self.min_length_meters = meters;
        self
    }

    pub fn with_distance_policy(mut self, policy: DistancePolicy) -> Self {
        self.distance_policy = policy;
        self
    }

    pub fn with_explicit_ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        self.explicit_ids = Some(ids.into_iter().collect());
        self
    }

    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(TrailFinderError::invalid_parameter(
                "limit",
                "must be a positive integer",
            ));
        }
        if !self.min_length_meters.is_finite() || self.min_length_meters < 0.0 {
            return Err(TrailFinderError::invalid_parameter(
                "minLength",
                format!("must be a non-negative number, got {}", self.min_length_meters),
            ));
        }
        Ok(())
    }

    fn accepts(&self, feature: &RouteFeature) -> bool {
        if let Some(category) = self.category {
            if feature.category != Some(category) {
                return false;
            }
        }
        match feature.precomputed_length_meters {
            Some(length) => length >= self.min_length_meters,
            None => true,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// One entry of a nearest query result.
///
/// Same shape in every query mode. In grouped mode names, numbers, category
/// and gradings come from the first member feature of the group (in dataset
/// order), even when members disagree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResult {
    /// Dataset id; absent for grouped results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Route number or name the result is keyed by
    pub identity: Option<String>,
    pub route_numbers: Vec<String>,
    pub names: Vec<String>,
    pub category: Option<RouteCategory>,
    pub gradings: Vec<String>,
    /// Distance rounded to whole meters
    pub distance_meters: u64,
    /// Unrounded distance in meters
    #[serde(skip)]
    pub distance: f64,
    pub geometry: MultiLineGeometry,
}

impl RouteResult {
    fn from_feature(feature: &RouteFeature, distance: f64) -> Self {
        Self {
            id: feature.id,
            identity: feature.identity().map(|identity| identity.as_str().to_string()),
            route_numbers: feature.route_numbers.clone(),
            names: feature.route_names.clone(),
            category: feature.category,
            gradings: feature.gradings.clone(),
            distance_meters: distance.round() as u64,
            distance,
            geometry: MultiLineGeometry::new(feature.geometry.clone()),
        }
    }

    /// First usable name, else the identity, else the sentinel.
    pub fn display_name(&self) -> &str {
        self.names
            .iter()
            .find(|name| !is_sentinel_identity(name))
            .map(String::as_str)
            .or(self.identity.as_deref())
            .unwrap_or(UNKNOWN_IDENTITY)
    }
}

// ============================================================================
// Engine
// ============================================================================

/// A measured feature: arena index and its distance to the query point.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    idx: usize,
    distance: f64,
}

struct GroupHit<'a> {
    identity: &'a RouteIdentity,
    members: Vec<usize>,
    distance: f64,
}

/// Run a nearest query against `index`.
///
/// Fails with `InvalidParameter` for a zero limit, a negative minimum length
/// or a non-finite point, and with `NotReady` when the index holds no
/// features. A query that matches nothing succeeds with an empty result.
///
/// # Example
/// ```
/// use trail_finder::{nearest, Coordinate, FeatureIndex, QueryOptions, TrailFinderError};
///
/// let index = FeatureIndex::new(vec![]);
/// let result = nearest(&index, Coordinate::new(10.75, 59.91), &QueryOptions::default());
/// assert!(matches!(result, Err(TrailFinderError::NotReady)));
/// ```
pub fn nearest(
    index: &FeatureIndex,
    point: Coordinate,
    options: &QueryOptions,
) -> Result<Vec<RouteResult>> {
    options.validate()?;
    if !point.is_finite() {
        return Err(TrailFinderError::invalid_parameter(
            "point",
            format!("coordinates must be finite, got ({}, {})", point.lon, point.lat),
        ));
    }
    if index.is_empty() {
        return Err(TrailFinderError::NotReady);
    }

    let started = Instant::now();
    let results = match (&options.explicit_ids, options.mode) {
        (Some(ids), _) => nearest_explicit(index, point, ids, options.distance_policy)?,
        (None, QueryMode::Grouped) => nearest_grouped(index, point, options)?,
        (None, QueryMode::PerFeature) => nearest_per_feature(index, point, options)?,
    };

    debug!(
        "[QueryEngine] {} query at ({:.5}, {:.5}) with {} policy: {} results in {:?}",
        if options.explicit_ids.is_some() { "explicit-id".to_string() } else { options.mode.to_string() },
        point.lat,
        point.lon,
        options.distance_policy,
        results.len(),
        started.elapsed()
    );

    Ok(results)
}

fn nearest_grouped(
    index: &FeatureIndex,
    point: Coordinate,
    options: &QueryOptions,
) -> Result<Vec<RouteResult>> {
    let groups = index.identity_groups();

    // A fragment shared by several routes appears in several groups but is
    // measured once.
    let mut surviving: Vec<usize> = groups
        .values()
        .flatten()
        .copied()
        .filter(|&idx| options.accepts(&index.all()[idx]))
        .collect();
    surviving.sort_unstable();
    surviving.dedup();

    let distances: HashMap<usize, f64> =
        measure_candidates(index, &surviving, point, options.distance_policy)?
            .into_iter()
            .map(|c| (c.idx, c.distance))
            .collect();

    let mut hits: Vec<GroupHit> = groups
        .iter()
        .filter_map(|(identity, indices)| {
            let members: Vec<usize> = indices
                .iter()
                .copied()
                .filter(|idx| distances.contains_key(idx))
                .collect();
            if members.is_empty() {
                return None;
            }
            let distance = members
                .iter()
                .map(|idx| distances[idx])
                .fold(f64::INFINITY, f64::min);
            Some(GroupHit {
                identity,
                members,
                distance,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.identity.as_str().cmp(b.identity.as_str()))
            .then_with(|| a.identity.cmp(b.identity))
    });
    hits.truncate(options.limit);

    Ok(hits
        .into_iter()
        .map(|hit| group_result(index, hit))
        .collect())
}

fn group_result(index: &FeatureIndex, hit: GroupHit<'_>) -> RouteResult {
    let first = &index.all()[hit.members[0]];
    let geometry = hit
        .members
        .iter()
        .flat_map(|&idx| index.all()[idx].geometry.iter().cloned())
        .collect();

    RouteResult {
        id: None,
        identity: Some(hit.identity.as_str().to_string()),
        route_numbers: first.route_numbers.clone(),
        names: first.route_names.clone(),
        category: first.category,
        gradings: first.gradings.clone(),
        distance_meters: hit.distance.round() as u64,
        distance: hit.distance,
        geometry: MultiLineGeometry::new(geometry),
    }
}

fn nearest_per_feature(
    index: &FeatureIndex,
    point: Coordinate,
    options: &QueryOptions,
) -> Result<Vec<RouteResult>> {
    let surviving: Vec<usize> = index
        .all()
        .iter()
        .enumerate()
        .filter(|(_, feature)| options.accepts(feature))
        .map(|(idx, _)| idx)
        .collect();

    let mut candidates = measure_candidates(index, &surviving, point, options.distance_policy)?;
    sort_candidates(&mut candidates);
    candidates.truncate(options.limit);

    Ok(candidates
        .into_iter()
        .map(|c| RouteResult::from_feature(&index.all()[c.idx], c.distance))
        .collect())
}

fn nearest_explicit(
    index: &FeatureIndex,
    point: Coordinate,
    ids: &[u64],
    policy: DistancePolicy,
) -> Result<Vec<RouteResult>> {
    let requested = index.indices_by_id(ids.iter().copied());
    for &idx in &requested {
        if !index.all()[idx].has_geometry() {
            warn!(
                "[QueryEngine] Feature {:?} has no geometry, omitted from explicit-id result",
                index.all()[idx].id
            );
        }
    }

    let mut candidates = measure_candidates(index, &requested, point, policy)?;
    sort_candidates(&mut candidates);

    Ok(candidates
        .into_iter()
        .map(|c| RouteResult::from_feature(&index.all()[c.idx], c.distance))
        .collect())
}

/// Ascending by distance, dataset order on ties.
fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.idx.cmp(&b.idx)));
}

/// Distance from `point` to each feature in `indices`. Features without
/// geometry are skipped.
fn measure_candidates(
    index: &FeatureIndex,
    indices: &[usize],
    point: Coordinate,
    policy: DistancePolicy,
) -> Result<Vec<Candidate>> {
    #[cfg(feature = "parallel")]
    let measured: Result<Vec<Option<Candidate>>> = indices
        .par_iter()
        .map(|&idx| measure_feature(index, idx, point, policy))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let measured: Result<Vec<Option<Candidate>>> = indices
        .iter()
        .map(|&idx| measure_feature(index, idx, point, policy))
        .collect();

    Ok(measured?.into_iter().flatten().collect())
}

fn measure_feature(
    index: &FeatureIndex,
    idx: usize,
    point: Coordinate,
    policy: DistancePolicy,
) -> Result<Option<Candidate>> {
    let feature = &index.all()[idx];
    if !feature.has_geometry() {
        return Ok(None);
    }
    let distance = min_distance_to_fragments(point, &feature.geometry, policy)?;
    Ok(Some(Candidate { idx, distance }))
}

/// Shared handle to an immutable index plus per-dataset query defaults.
///
/// Cheap to clone; every clone reads the same index.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    index: Arc<FeatureIndex>,
    defaults: QueryDefaults,
}

impl QueryEngine {
    /// Create an engine with default configuration.
    pub fn new(index: Arc<FeatureIndex>) -> Self {
        Self::with_defaults(index, QueryDefaults::default())
    }

    pub fn with_defaults(index: Arc<FeatureIndex>, defaults: QueryDefaults) -> Self {
        Self { index, defaults }
    }

    pub fn index(&self) -> &FeatureIndex {
        &self.index
    }

    pub fn defaults(&self) -> &QueryDefaults {
        &self.defaults
    }

    /// Options seeded with this engine's defaults.
    pub fn options(&self) -> QueryOptions {
        self.defaults.options()
    }

    pub fn nearest(&self, point: Coordinate, options: &QueryOptions) -> Result<Vec<RouteResult>> {
        nearest(&self.index, point, options)
    }

    pub fn stats(&self) -> &IndexStats {
        self.index.stats()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::great_circle_distance;
    use crate::Polyline;

    /// Query point used throughout: on the equator, where 0.001° ≈ 111 m.
    fn q() -> Coordinate {
        Coordinate::new(0.0, 0.0)
    }

    fn fragment_at(lon: f64) -> Polyline {
        Polyline::new(vec![Coordinate::new(lon, 0.0), Coordinate::new(lon, 0.01)]).unwrap()
    }

    fn named(id: u64, name: &str, lon: f64) -> RouteFeature {
        RouteFeature {
            id: Some(id),
            route_names: vec![name.to_string()],
            category: Some(RouteCategory::Fotrute),
            geometry: vec![fragment_at(lon)],
            ..RouteFeature::default()
        }
    }

    fn scenario_index() -> FeatureIndex {
        // Route A: fragments ~100 m and ~250 m away. Route B: ~50 m away.
        FeatureIndex::new(vec![
            named(1, "Route A", 0.0009),
            named(2, "Route A", 0.00225),
            named(3, "Route B", 0.00045),
        ])
    }

    #[test]
    fn test_grouped_scenario() {
        let index = scenario_index();
        let results = nearest(&index, q(), &QueryOptions::default().with_limit(2)).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].identity.as_deref(), Some("Route B"));
        assert_eq!(results[0].distance_meters, 50);
        assert_eq!(results[1].identity.as_deref(), Some("Route A"));
        assert_eq!(results[1].distance_meters, 100);
        assert_eq!(results[1].geometry.line_count(), 2);
        assert_eq!(results[1].geometry.coordinates[1], fragment_at(0.00225));
    }

    #[test]
    fn test_shared_fragment_merged_into_every_route() {
        let numbered = |id: u64, numbers: &[&str], lon: f64| RouteFeature {
            id: Some(id),
            route_numbers: numbers.iter().map(|n| n.to_string()).collect(),
            geometry: vec![fragment_at(lon)],
            ..RouteFeature::default()
        };
        // Fragment 1 belongs to routes 5 and 6 (~11 m); fragment 2 only to 6 (~334 m).
        let index = FeatureIndex::new(vec![
            numbered(1, &["5", "6"], 0.0001),
            numbered(2, &["6"], 0.003),
        ]);

        let results = nearest(&index, q(), &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].identity.as_deref(), Some("5"));
        assert_eq!(results[0].distance_meters, 11);
        assert_eq!(results[0].geometry.line_count(), 1);

        assert_eq!(results[1].identity.as_deref(), Some("6"));
        assert_eq!(results[1].distance_meters, 11);
        assert_eq!(results[1].geometry.line_count(), 2);
        assert_eq!(results[1].geometry.coordinates[0], fragment_at(0.0001));
        assert_eq!(results[1].geometry.coordinates[1], fragment_at(0.003));
    }

    #[test]
    fn test_shared_fragment_filtered_out_of_every_route() {
        let mut shared = named(1, "ignored", 0.0001);
        shared.route_numbers = vec!["5".to_string(), "6".to_string()];
        shared.category = Some(RouteCategory::Sykkelrute);
        let mut other = named(2, "ignored", 0.003);
        other.route_numbers = vec!["6".to_string()];

        let index = FeatureIndex::new(vec![shared, other]);
        let options = QueryOptions::default().with_category(RouteCategory::Fotrute);
        let results = nearest(&index, q(), &options).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity.as_deref(), Some("6"));
        assert_eq!(results[0].distance_meters, 334);
        assert_eq!(results[0].geometry.line_count(), 1);
    }

    #[test]
    fn test_results_sorted_ascending() {
        let index = FeatureIndex::new(
            (0..20)
                .map(|i| named(i, &format!("Route {}", i), 0.001 * ((i * 7) % 20 + 1) as f64))
                .collect(),
        );
        let results = nearest(&index, q(), &QueryOptions::default().with_limit(20)).unwrap();
        assert_eq!(results.len(), 20);
        assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_limit_larger_than_groups_returns_all() {
        let index = scenario_index();
        let results = nearest(&index, q(), &QueryOptions::default().with_limit(50)).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_zero_limit_is_invalid() {
        let index = scenario_index();
        let result = nearest(&index, q(), &QueryOptions::default().with_limit(0));
        assert!(matches!(
            result,
            Err(TrailFinderError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_non_finite_point_is_invalid() {
        let index = scenario_index();
        for point in [Coordinate::new(f64::NAN, 0.0), Coordinate::new(0.0, f64::INFINITY)] {
            assert!(matches!(
                nearest(&index, point, &QueryOptions::default()),
                Err(TrailFinderError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_negative_min_length_is_invalid() {
        let index = scenario_index();
        let result = nearest(&index, q(), &QueryOptions::default().with_min_length(-1.0));
        assert!(matches!(
            result,
            Err(TrailFinderError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_empty_index_not_ready() {
        let index = FeatureIndex::new(vec![]);
        assert!(matches!(
            nearest(&index, q(), &QueryOptions::default()),
            Err(TrailFinderError::NotReady)
        ));
    }

    #[test]
    fn test_category_without_matches_is_empty() {
        let index = scenario_index();
        let options = QueryOptions::default().with_category(RouteCategory::Skiloype);
        assert!(nearest(&index, q(), &options).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_category_name_is_invalid_filter() {
        assert!(matches!(
            QueryOptions::default().with_category_name("Kajakkrute"),
            Err(TrailFinderError::InvalidFilter { .. })
        ));
        let options = QueryOptions::default().with_category_name("Skiløype").unwrap();
        assert_eq!(options.category, Some(RouteCategory::Skiloype));
    }

    #[test]
    fn test_category_filter_applies_per_member() {
        let mut ski = named(4, "Route A", 0.0001);
        ski.category = Some(RouteCategory::Skiloype);
        let mut features = vec![ski];
        features.extend(scenario_index().all().iter().cloned());
        let index = FeatureIndex::new(features);

        let results = nearest(
            &index,
            q(),
            &QueryOptions::default().with_category(RouteCategory::Fotrute),
        )
        .unwrap();
        let route_a = results.iter().find(|r| r.identity.as_deref() == Some("Route A")).unwrap();
        assert_eq!(route_a.distance_meters, 100);
        assert_eq!(route_a.geometry.line_count(), 2);
    }

    #[test]
    fn test_min_length_filter() {
        let mut short = named(1, "Short", 0.0001);
        short.precomputed_length_meters = Some(200.0);
        let mut long = named(2, "Long", 0.001);
        long.precomputed_length_meters = Some(5_000.0);
        let unknown_length = named(3, "Unmeasured", 0.002);
        let index = FeatureIndex::new(vec![short, long, unknown_length]);

        let results = nearest(&index, q(), &QueryOptions::default().with_min_length(1_000.0)).unwrap();
        let names: Vec<_> = results.iter().map(|r| r.display_name()).collect();
        assert_eq!(names, vec!["Long", "Unmeasured"]);
    }

    #[test]
    fn test_sentinel_identity_never_grouped() {
        let index = FeatureIndex::new(vec![
            named(1, "unknown", 0.0001),
            named(2, "Route A", 0.001),
        ]);
        let results = nearest(&index, q(), &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results
            .iter()
            .all(|r| r.identity.as_deref() != Some(UNKNOWN_IDENTITY)));
    }

    #[test]
    fn test_route_number_takes_precedence_over_name() {
        let mut a = named(1, "Nordmarka nord", 0.001);
        a.route_numbers = vec!["12".to_string()];
        let mut b = named(2, "Nordmarka sør", 0.002);
        b.route_numbers = vec!["12".to_string()];
        let index = FeatureIndex::new(vec![a, b]);

        let results = nearest(&index, q(), &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity.as_deref(), Some("12"));
        assert_eq!(results[0].names, vec!["Nordmarka nord".to_string()]);
        assert_eq!(results[0].geometry.line_count(), 2);
    }

    #[test]
    fn test_ties_broken_by_identity() {
        let index = FeatureIndex::new(vec![
            named(1, "Zeta", 0.001),
            named(2, "Alfa", -0.001),
            named(3, "Mid", 0.001),
        ]);
        let results = nearest(&index, q(), &QueryOptions::default()).unwrap();
        let identities: Vec<_> = results.iter().map(|r| r.identity.clone().unwrap()).collect();
        assert_eq!(identities, vec!["Alfa", "Mid", "Zeta"]);
    }

    #[test]
    fn test_empty_geometry_excluded() {
        let mut empty = named(1, "Hollow", 0.0);
        empty.geometry.clear();
        let index = FeatureIndex::new(vec![empty, named(2, "Solid", 0.001)]);

        let results = nearest(&index, q(), &QueryOptions::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].identity.as_deref(), Some("Solid"));

        let explicit = nearest(&index, q(), &QueryOptions::default().with_explicit_ids([1, 2])).unwrap();
        assert_eq!(explicit.len(), 1);
        assert_eq!(explicit[0].id, Some(2));
    }

    #[test]
    fn test_per_feature_mode() {
        let index = FeatureIndex::new(vec![
            named(1, "Route A", 0.0009),
            named(2, "Route A", 0.00225),
            named(3, "Route B", 0.00045),
            named(4, "unknown", 0.003),
        ]);
        let options = QueryOptions::default().with_mode(QueryMode::PerFeature).with_limit(10);
        let results = nearest(&index, q(), &options).unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.id.unwrap()).collect();
        assert_eq!(ids, vec![3, 1, 2, 4]);
        assert!(results.iter().all(|r| r.geometry.line_count() == 1));
        assert_eq!(results[3].identity, None);

        let truncated = nearest(&index, q(), &options.with_limit(2)).unwrap();
        assert_eq!(truncated.len(), 2);
    }

    #[test]
    fn test_explicit_ids_sorted_and_unknown_omitted() {
        let index = scenario_index();
        let options = QueryOptions::default().with_explicit_ids([2, 3, 9999]).with_limit(1);
        let results = nearest(&index, q(), &options).unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.id.unwrap()).collect();
        assert_eq!(ids, vec![3, 2]);
        assert_eq!(results[1].distance_meters, 250);

        let single = nearest(&index, q(), &QueryOptions::default().with_explicit_ids([1, 9999])).unwrap();
        assert_eq!(single.len(), 1);
    }

    #[test]
    fn test_endpoint_policy_changes_ranking() {
        // A long curved route passes right by the point in its middle.
        let curved = RouteFeature {
            id: Some(1),
            route_names: vec!["Curved".to_string()],
            geometry: vec![Polyline::new(vec![
                Coordinate::new(-0.05, 0.05),
                Coordinate::new(0.0, 0.0001),
                Coordinate::new(0.05, 0.05),
            ])
            .unwrap()],
            ..RouteFeature::default()
        };
        let index = FeatureIndex::new(vec![curved, named(2, "Straight", 0.01)]);

        let scan = nearest(&index, q(), &QueryOptions::default()).unwrap();
        assert_eq!(scan[0].identity.as_deref(), Some("Curved"));

        let endpoints = nearest(
            &index,
            q(),
            &QueryOptions::default().with_distance_policy(DistancePolicy::EndpointOnly),
        )
        .unwrap();
        assert_eq!(endpoints[0].identity.as_deref(), Some("Straight"));
    }

    #[test]
    fn test_group_distance_is_member_minimum() {
        let index = scenario_index();
        let results = nearest(&index, q(), &QueryOptions::default()).unwrap();
        let route_a = &results[1];
        let expected = index
            .by_identity(&RouteIdentity::Name("Route A".to_string()))
            .iter()
            .flat_map(|f| f.geometry.iter().flat_map(|l| l.coords().iter().copied()))
            .map(|c| great_circle_distance(q(), c))
            .fold(f64::INFINITY, f64::min);
        assert_eq!(route_a.distance, expected);
    }

    #[test]
    fn test_result_serialization() {
        let index = scenario_index();
        let results = nearest(&index, q(), &QueryOptions::default()).unwrap();
        let value = serde_json::to_value(&results[0]).unwrap();

        assert_eq!(value["identity"], "Route B");
        assert_eq!(value["distanceMeters"], 50);
        assert_eq!(value["category"], "Fotrute");
        assert_eq!(value["geometry"]["type"], "MultiLineString");
        assert!(value.get("id").is_none());
        assert!(value.get("distance").is_none());
    }

    #[test]
    fn test_query_engine_shares_index() {
        let engine = QueryEngine::new(Arc::new(scenario_index()));
        let clone = engine.clone();
        let a = engine.nearest(q(), &engine.options()).unwrap();
        let b = clone.nearest(q(), &clone.options()).unwrap();
        assert_eq!(a, b);
        assert_eq!(engine.stats().feature_count, 3);
    }

    #[test]
    fn test_concurrent_queries() {
        let engine = QueryEngine::new(Arc::new(scenario_index()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.nearest(q(), &QueryOptions::default()).unwrap())
            })
            .collect();
        let expected = engine.nearest(q(), &QueryOptions::default()).unwrap();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_measurement_matches_sequential() {
        let mut features: Vec<RouteFeature> = (0..200)
            .map(|i| named(i, &format!("Route {}", i % 37), 0.0001 * ((i * 13) % 97) as f64))
            .collect();
        features[42].geometry.clear();
        let index = FeatureIndex::new(features);
        let indices: Vec<usize> = (0..index.len()).collect();

        for policy in [DistancePolicy::VertexScan, DistancePolicy::EndpointOnly] {
            let parallel = measure_candidates(&index, &indices, q(), policy).unwrap();
            let sequential: Vec<Candidate> = indices
                .iter()
                .filter_map(|&idx| measure_feature(&index, idx, q(), policy).unwrap())
                .collect();
            assert_eq!(parallel.len(), 199);
            assert_eq!(parallel, sequential);
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("grouped".parse::<QueryMode>().unwrap(), QueryMode::Grouped);
        assert_eq!("features".parse::<QueryMode>().unwrap(), QueryMode::PerFeature);
        assert!("clusters".parse::<QueryMode>().is_err());
    }
}
