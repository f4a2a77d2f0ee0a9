use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::ranking::RiskThresholds;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub world_data: WorldDataConfig,
    pub risk: RiskConfig,
    pub caches: CacheConfig,
    pub clustering: ClusterConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let world_data = WorldDataConfig {
            endpoint: env::var("WORLD_DATA_URL")
                .unwrap_or_else(|_| WorldDataConfig::DEFAULT_ENDPOINT.to_string()),
            timeout: Duration::from_secs(parse_var("WORLD_DATA_TIMEOUT_SECS", 10u64)?),
        };

        let low = parse_var("RISK_THRESHOLD_LOW", 100.0f64)?;
        let medium = parse_var("RISK_THRESHOLD_MEDIUM", 250.0f64)?;
        let default_thresholds =
            RiskThresholds::new(low, medium).ok_or(ConfigError::InvalidThresholds { low, medium })?;
        let horizon_days = parse_var("RISK_RECALCULATION_HORIZON_DAYS", 14i64)?;
        if horizon_days <= 0 {
            return Err(ConfigError::InvalidValue {
                var: "RISK_RECALCULATION_HORIZON_DAYS",
            });
        }

        let caches = CacheConfig {
            configuration_ttl: Duration::from_secs(parse_var("CONFIG_CACHE_TTL_SECS", 60u64)?),
            library_ttl: Duration::from_secs(parse_var("LIBRARY_CACHE_TTL_SECS", 300u64)?),
        };

        let max_zoom = parse_var("CLUSTER_MAX_ZOOM", 16u8)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            world_data,
            risk: RiskConfig {
                recalculation_horizon_days: horizon_days,
                default_thresholds,
            },
            caches,
            clustering: ClusterConfig {
                max_zoom,
                ..ClusterConfig::default()
            },
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { var }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Location-intelligence service connection settings.
#[derive(Debug, Clone)]
pub struct WorldDataConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl WorldDataConfig {
    pub const DEFAULT_ENDPOINT: &'static str = "http://127.0.0.1:8090/v1/location-bulk";
}

/// Risk projection knobs shared by every tenant unless overridden.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub recalculation_horizon_days: i64,
    pub default_thresholds: RiskThresholds,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            recalculation_horizon_days: 14,
            default_thresholds: RiskThresholds {
                low: 100.0,
                medium: 250.0,
            },
        }
    }
}

/// Eviction windows for the process-wide caches.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub configuration_ttl: Duration,
    pub library_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            configuration_ttl: Duration::from_secs(60),
            library_ttl: Duration::from_secs(300),
        }
    }
}

/// Zoom range and grid resolution of the location cluster index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterConfig {
    pub max_zoom: u8,
    /// Each tile is split into `2^cell_bits` cells per axis.
    pub cell_bits: u8,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            max_zoom: 16,
            cell_bits: 2,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { var: &'static str },
    InvalidThresholds { low: f64, medium: f64 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { var } => {
                write!(f, "{var} is set but could not be parsed")
            }
            ConfigError::InvalidThresholds { low, medium } => write!(
                f,
                "risk thresholds must be finite with low <= medium (low {low}, medium {medium})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::InvalidThresholds { .. } => None,
        }
    }
}
