//! Geographic distance utilities.
//!
//! Haversine great-circle distance on a spherical Earth and the
//! point-to-polyline minimum used to rank routes. The polyline distance only
//! looks at vertices, never at interpolated points along segments, so a point
//! beside the middle of a long straight segment measures to the nearer
//! vertex. Rankings depend on this; do not replace it with segment projection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Coordinate, Polyline, Result, TrailFinderError};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// How the distance from a point to a polyline is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistancePolicy {
    /// Minimum over every vertex. O(n) in vertex count.
    #[default]
    VertexScan,
    /// Minimum over the first and last vertex only. O(1).
    ///
    /// Only adequate for datasets of short, nearly straight fragments; long or
    /// curved fragments are ranked wrongly.
    EndpointOnly,
}

impl DistancePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistancePolicy::VertexScan => "vertex-scan",
            DistancePolicy::EndpointOnly => "endpoint-only",
        }
    }
}

impl fmt::Display for DistancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistancePolicy {
    type Err = TrailFinderError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vertex-scan" | "vertex" | "vertices" => Ok(DistancePolicy::VertexScan),
            "endpoint-only" | "endpoint" | "endpoints" => Ok(DistancePolicy::EndpointOnly),
            other => Err(TrailFinderError::invalid_parameter(
                "policy",
                format!("unknown distance policy '{}'", other),
            )),
        }
    }
}

/// Haversine distance between two coordinates in meters.
///
/// Symmetric, non-negative and zero for coincident points. Near-antipodal
/// points return a large finite value (the haversine term is clamped to
/// [0, 1] so rounding never produces NaN).
///
/// # Example
/// ```
/// use trail_finder::{great_circle_distance, Coordinate};
///
/// let oslo = Coordinate::from_lat_lon(59.9139, 10.7522);
/// let bergen = Coordinate::from_lat_lon(60.3913, 5.3221);
/// let d = great_circle_distance(oslo, bergen);
/// assert!(d > 300_000.0 && d < 310_000.0);
/// ```
pub fn great_circle_distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    EARTH_RADIUS_METERS * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Minimum distance in meters from `point` to a polyline under `policy`.
///
/// Fails with `InvalidGeometry` when `polyline` is empty.
pub fn min_distance_to_polyline(
    point: Coordinate,
    polyline: &[Coordinate],
    policy: DistancePolicy,
) -> Result<f64> {
    let (first, last) = match (polyline.first(), polyline.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => {
            return Err(TrailFinderError::invalid_geometry(
                "cannot measure distance to an empty polyline",
            ))
        }
    };

    let distance = match policy {
        DistancePolicy::VertexScan => polyline
            .iter()
            .map(|&vertex| great_circle_distance(point, vertex))
            .fold(f64::INFINITY, f64::min),
        DistancePolicy::EndpointOnly => {
            great_circle_distance(point, first).min(great_circle_distance(point, last))
        }
    };

    Ok(distance)
}

/// Minimum distance in meters from `point` to any of `fragments`.
///
/// Fails with `InvalidGeometry` when there are no fragments.
pub fn min_distance_to_fragments(
    point: Coordinate,
    fragments: &[Polyline],
    policy: DistancePolicy,
) -> Result<f64> {
    if fragments.is_empty() {
        return Err(TrailFinderError::invalid_geometry(
            "feature has no geometry fragments",
        ));
    }

    let mut best = f64::INFINITY;
    for fragment in fragments {
        best = best.min(min_distance_to_polyline(point, fragment.coords(), policy)?);
    }
    Ok(best)
}

/// Total length of a polyline in meters.
pub fn polyline_length(coords: &[Coordinate]) -> f64 {
    coords
        .windows(2)
        .map(|w| great_circle_distance(w[0], w[1]))
        .sum()
}


#[cfg(test)]
mod tests {
    use super::*;

    fn sample_line() -> Vec<Coordinate> {
        vec![
            Coordinate::new(10.7000, 59.9000),
            Coordinate::new(10.7100, 59.9050),
            Coordinate::new(10.7200, 59.9150),
            Coordinate::new(10.7300, 59.9100),
        ]
    }

    #[test]
    fn test_distance_zero_for_coincident_points() {
        let p = Coordinate::new(10.75, 59.91);
        assert_eq!(great_circle_distance(p, p), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = Coordinate::new(10.75, 59.91);
        let b = Coordinate::new(5.32, 60.39);
        assert!((great_circle_distance(a, b) - great_circle_distance(b, a)).abs() < 1e-9);
        assert!(great_circle_distance(a, b) > 0.0);
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 1.0);
        let expected = EARTH_RADIUS_METERS * 1.0_f64.to_radians();
        assert!((great_circle_distance(a, b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_distance_antipodal_is_finite() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(180.0, 0.0);
        let d = great_circle_distance(a, b);
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1.0);

        let c = Coordinate::new(-179.999, -0.001);
        let d = great_circle_distance(Coordinate::new(0.0, 0.0), c);
        assert!(d.is_finite() && d > 20_000_000.0);
    }

    #[test]
    fn test_vertex_scan_is_minimum_over_vertices() {
        let line = sample_line();
        let point = Coordinate::new(10.7180, 59.9140);
        let d = min_distance_to_polyline(point, &line, DistancePolicy::VertexScan).unwrap();

        for &vertex in &line {
            assert!(d <= great_circle_distance(point, vertex));
        }
        assert_eq!(d, great_circle_distance(point, line[2]));
    }

    #[test]
    fn test_vertex_scan_ignores_segment_interiors() {
        // Point sits right on the middle of a straight segment, far from both vertices.
        let line = vec![Coordinate::new(10.0, 60.0), Coordinate::new(10.2, 60.0)];
        let point = Coordinate::new(10.1, 60.0);
        let d = min_distance_to_polyline(point, &line, DistancePolicy::VertexScan).unwrap();
        assert!(d > 5_000.0);
    }

    #[test]
    fn test_endpoint_only_uses_first_and_last() {
        let line = sample_line();
        let point = line[2];
        let d = min_distance_to_polyline(point, &line, DistancePolicy::EndpointOnly).unwrap();
        let expected = great_circle_distance(point, line[0]).min(great_circle_distance(point, line[3]));
        assert_eq!(d, expected);
        assert!(d > 0.0);

        let scan = min_distance_to_polyline(point, &line, DistancePolicy::VertexScan).unwrap();
        assert_eq!(scan, 0.0);
    }

    #[test]
    fn test_empty_polyline_is_invalid_geometry() {
        let point = Coordinate::new(10.0, 60.0);
        for policy in [DistancePolicy::VertexScan, DistancePolicy::EndpointOnly] {
            assert!(matches!(
                min_distance_to_polyline(point, &[], policy),
                Err(TrailFinderError::InvalidGeometry { .. })
            ));
        }
        assert!(matches!(
            min_distance_to_fragments(point, &[], DistancePolicy::VertexScan),
            Err(TrailFinderError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_min_distance_across_fragments() {
        let near = Polyline::new(vec![Coordinate::new(10.001, 60.0)]).unwrap();
        let far = Polyline::new(vec![Coordinate::new(10.1, 60.0)]).unwrap();
        let point = Coordinate::new(10.0, 60.0);
        let fragments = vec![far, near.clone()];
        let d = min_distance_to_fragments(point, &fragments, DistancePolicy::VertexScan).unwrap();
        assert_eq!(d, great_circle_distance(point, near.first()));
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("vertex".parse::<DistancePolicy>().unwrap(), DistancePolicy::VertexScan);
        assert_eq!(
            "Endpoint-Only".parse::<DistancePolicy>().unwrap(),
            DistancePolicy::EndpointOnly
        );
        assert!("segment".parse::<DistancePolicy>().is_err());
        assert_eq!(DistancePolicy::default(), DistancePolicy::VertexScan);
    }

    #[test]
    fn test_polyline_length() {
        let line = vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 1.0), Coordinate::new(0.0, 2.0)];
        let expected = 2.0 * EARTH_RADIUS_METERS * 1.0_f64.to_radians();
        assert!((polyline_length(&line) - expected).abs() < 1e-6);
        assert_eq!(polyline_length(&line[..1]), 0.0);
    }
}
