//! Query defaults and server configuration.

use serde::{Deserialize, Serialize};

use crate::{DistancePolicy, QueryOptions, Result, TrailFinderError};

/// Defaults applied to queries that do not set a field explicitly.
///
/// The distance policy is chosen per dataset: endpoint-only is only adequate
/// when every fragment is short and nearly straight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryDefaults {
    /// Result limit when the request has none. Default: 5
    pub limit: usize,
    /// Distance policy when the request has none. Default: vertex-scan
    pub distance_policy: DistancePolicy,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            limit: 5,
            distance_policy: DistancePolicy::VertexScan,
        }
    }
}

impl QueryDefaults {
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(TrailFinderError::Config {
                message: "default limit must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Query options seeded with these defaults.
    pub fn options(&self) -> QueryOptions {
        QueryOptions::default()
            .with_limit(self.limit)
            .with_distance_policy(self.distance_policy)
    }
}

#[cfg(feature = "http")]
pub use server::{LogLevel, ServerConfig};

#[cfg(feature = "http")]
mod server {
    use std::net::SocketAddr;
    use std::path::PathBuf;

    use clap::{Parser, ValueEnum};
    use log::LevelFilter;

    use super::QueryDefaults;
    use crate::{DistancePolicy, Result, TrailFinderError};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
    pub enum LogLevel {
        Error,
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn to_filter(self) -> LevelFilter {
            match self {
                LogLevel::Error => LevelFilter::Error,
                LogLevel::Warn => LevelFilter::Warn,
                LogLevel::Info => LevelFilter::Info,
                LogLevel::Debug => LevelFilter::Debug,
                LogLevel::Trace => LevelFilter::Trace,
            }
        }
    }

    /// Command-line configuration for the `trail-finder` server.
    #[derive(Debug, Clone, Parser)]
    #[command(name = "trail-finder", version, about = "Serve nearest-route queries over HTTP")]
    pub struct ServerConfig {
        /// GeoJSON FeatureCollection with LineString/MultiLineString route features
        #[arg(long, env = "TRAIL_FINDER_DATASET")]
        pub dataset: PathBuf,

        /// Address to listen on
        #[arg(long, env = "TRAIL_FINDER_BIND", default_value = "0.0.0.0:3000")]
        pub bind: SocketAddr,

        /// Directory with the static web front-end
        #[arg(long, env = "TRAIL_FINDER_STATIC_DIR")]
        pub static_dir: Option<PathBuf>,

        /// Result limit for requests without one
        #[arg(long, default_value_t = 5)]
        pub default_limit: usize,

        /// Rank by fragment endpoints only (short, straight fragments only)
        #[arg(long)]
        pub endpoint_only: bool,

        /// Log level (overridden by RUST_LOG when set)
        #[arg(long, value_enum, default_value_t = LogLevel::Info)]
        pub log_level: LogLevel,
    }

    impl ServerConfig {
        pub fn query_defaults(&self) -> QueryDefaults {
            QueryDefaults {
                limit: self.default_limit,
                distance_policy: if self.endpoint_only {
                    DistancePolicy::EndpointOnly
                } else {
                    DistancePolicy::VertexScan
                },
            }
        }

        pub fn validate(&self) -> Result<()> {
            self.query_defaults().validate()?;
            if let Some(dir) = &self.static_dir {
                if !dir.is_dir() {
                    return Err(TrailFinderError::Config {
                        message: format!("static directory {} does not exist", dir.display()),
                    });
                }
            }
            Ok(())
        }
    }

}
