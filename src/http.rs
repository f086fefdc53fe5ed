//! HTTP boundary for the query engine.
//!
//! Endpoints:
//! - `GET /api/routes?bbox=minLng,minLat,maxLng,maxLat` - the dataset as a
//!   GeoJSON FeatureCollection, optionally only the features intersecting `bbox`
//! - `GET /api/routes/nearby?lat=&lng=&limit=&category=&minLength=&ids=&policy=&mode=`
//!   - nearest routes to a point, `{"routes": [...]}`
//! - `GET /api/health` - index statistics
//!
//! Raw text parameters are parsed and validated here; the engine only ever
//! sees finite coordinates and typed options. An optional static directory is
//! served for every other path.

use std::path::Path;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::config::ServerConfig;
use crate::{Bounds, Coordinate, QueryEngine, QueryOptions, Result, RouteResult, TrailFinderError};

/// Shared state for all handlers.
#[derive(Clone)]
struct AppState {
    engine: QueryEngine,
    /// Pre-serialized `/api/routes` body; the dataset never changes.
    dump: Bytes,
}

/// Error response wrapper mapping the error taxonomy to status codes.
#[derive(Debug)]
pub struct ApiError(pub TrailFinderError);

impl From<TrailFinderError> for ApiError {
    fn from(err: TrailFinderError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TrailFinderError::InvalidParameter { .. } | TrailFinderError::InvalidFilter { .. } => {
                StatusCode::BAD_REQUEST
            }
            TrailFinderError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            TrailFinderError::InvalidGeometry { .. }
            | TrailFinderError::Io(_)
            | TrailFinderError::Parse(_)
            | TrailFinderError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("[Server] {} ({})", self.0, status);
        }
        let body = json!({ "error": self.0.to_string(), "kind": self.0.kind() });
        (status, Json(body)).into_response()
    }
}

/// Raw query string of `/api/routes`.
#[derive(Debug, Default, Deserialize)]
pub struct RoutesParams {
    pub bbox: Option<String>,
}

impl RoutesParams {
    /// The requested viewport, if any. Order is `minLng,minLat,maxLng,maxLat`.
    pub fn bounds(&self) -> Result<Option<Bounds>> {
        let Some(raw) = non_empty(&self.bbox) else {
            return Ok(None);
        };
        let values = raw
            .split(',')
            .map(|part| parse_finite("bbox", part))
            .collect::<Result<Vec<_>>>()?;
        let [min_lng, min_lat, max_lng, max_lat] = values[..] else {
            return Err(TrailFinderError::invalid_parameter(
                "bbox",
                "expected minLng,minLat,maxLng,maxLat",
            ));
        };
        if min_lng > max_lng || min_lat > max_lat {
            return Err(TrailFinderError::invalid_parameter(
                "bbox",
                "minimum exceeds maximum",
            ));
        }
        Ok(Some(Bounds {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }))
    }
}

/// Raw query string of `/api/routes/nearby`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NearbyParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_finite(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TrailFinderError::invalid_parameter(name, format!("'{}' is not a number", raw)))
}

impl NearbyParams {
    /// The query point, as (lat, lng) from the request.
    pub fn point(&self) -> Result<Coordinate> {
        let (Some(lat), Some(lng)) = (non_empty(&self.lat), non_empty(&self.lng)) else {
            return Err(TrailFinderError::invalid_parameter(
                "lat/lng",
                "Latitude and longitude are required",
            ));
        };
        Ok(Coordinate::from_lat_lon(
            parse_finite("lat", lat)?,
            parse_finite("lng", lng)?,
        ))
    }

    /// Typed query options layered over `base`.
    pub fn options(&self, base: QueryOptions) -> Result<QueryOptions> {
        let mut options = base;

        if let Some(raw) = non_empty(&self.limit) {
            let limit: i64 = raw.parse().map_err(|_| {
                TrailFinderError::invalid_parameter("limit", format!("'{}' is not an integer", raw))
            })?;
            if limit <= 0 {
                return Err(TrailFinderError::invalid_parameter(
                    "limit",
                    "must be a positive integer",
                ));
            }
            options = options.with_limit(limit as usize);
        }
        if let Some(raw) = non_empty(&self.category) {
            options = options.with_category_name(raw)?;
        }
        if let Some(raw) = non_empty(&self.min_length) {
            options = options.with_min_length(parse_finite("minLength", raw)?);
        }
        if let Some(raw) = non_empty(&self.policy) {
            options = options.with_distance_policy(raw.parse()?);
        }
        if let Some(raw) = non_empty(&self.mode) {
            options = options.with_mode(raw.parse()?);
        }
        if let Some(raw) = non_empty(&self.ids) {
            let ids = raw
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse::<u64>().map_err(|_| {
                        TrailFinderError::invalid_parameter("ids", format!("'{}' is not a feature id", id))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            options = options.with_explicit_ids(ids);
        }

        Ok(options)
    }
}

/// Build the router over an already loaded engine.
pub fn build_router(engine: QueryEngine, static_dir: Option<&Path>) -> Result<Router> {
    let dump = Bytes::from(serde_json::to_vec(&engine.index().to_feature_collection())?);
    let state = AppState { engine, dump };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/routes", get(all_routes))
        .route("/api/routes/nearby", get(nearby_routes))
        .route("/api/health", get(health))
        .layer(cors)
        .with_state(state);

    Ok(match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    })
}

async fn all_routes(
    State(state): State<AppState>,
    Query(params): Query<RoutesParams>,
) -> std::result::Result<Response, ApiError> {
    if state.engine.index().is_empty() {
        return Err(TrailFinderError::NotReady.into());
    }
    match params.bounds()? {
        Some(bounds) => Ok(Json(state.engine.index().to_feature_collection_within(&bounds)).into_response()),
        None => Ok(([(header::CONTENT_TYPE, "application/json")], state.dump.clone()).into_response()),
    }
}

async fn nearby_routes(
    State(state): State<AppState>,
    Query(params): Query<NearbyParams>,
) -> std::result::Result<Response, ApiError> {
    let point = params.point()?;
    let options = params.options(state.engine.options())?;
    let routes: Vec<RouteResult> = state.engine.nearest(point, &options)?;

    if routes.is_empty() {
        debug!("[Server] No routes near ({}, {})", point.lat, point.lon);
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({
                "message": "No routes found near the specified location",
                "params": params,
            })),
        )
            .into_response());
    }

    Ok(Json(json!({ "routes": routes })).into_response())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = if state.engine.index().is_empty() {
        "not_ready"
    } else {
        "ok"
    };
    Json(json!({
        "status": status,
        "stats": state.engine.stats(),
        "defaults": state.engine.defaults(),
    }))
}

/// Serve the router on the configured address until Ctrl-C.
pub async fn serve(config: &ServerConfig, engine: QueryEngine) -> Result<()> {
    let app = build_router(engine, config.static_dir.as_deref())?;
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("[Server] Server running at http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("[Server] Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("[Server] Failed to listen for shutdown signal: {}", err);
    }
}
