use dotenv::dotenv;
use std::env;
use std::path::PathBuf;

use crate::domain::errors::ConfigError;

/// Lifetime of an attempt in the remote prover's cache. Reservations must
/// outlive it, so the local TTL defaults to the same value.
pub const DEFAULT_RESERVATION_TTL_MS: i64 = 3_600_000;

/// Configuration for the network collaborators
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Network name (e.g., "mainnet", "testnet4")
    pub network: String,
    /// Explorer REST base URL (UTXO list and broadcast)
    pub explorer_url: String,
    /// Explorer request timeout in seconds
    pub explorer_timeout_secs: u64,
    /// Prover base URL
    pub prover_url: String,
    /// Prover request timeout in seconds
    pub prover_timeout_secs: u64,
    /// Fee rate in sat/vB sent with every prove request
    pub fee_rate: f64,
}

/// Configuration for the reservation cache
#[derive(Debug, Clone)]
pub struct ReservationConfig {
    /// Local reservation time-to-live in milliseconds
    pub ttl_ms: i64,
    /// The prover's documented attempt cache retention in milliseconds
    pub prover_cache_retention_ms: i64,
    /// Path of the JSON file backing the cache
    pub store_path: PathBuf,
}

/// Configuration for offline runs
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Multiplier applied to every simulated step duration
    pub time_scale: f64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub reservation: ReservationConfig,
    pub simulation: SimulationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        // Ensure .env file is loaded
        dotenv().ok();

        let network_config = NetworkConfig {
            network: env::var("BITCOIN_NETWORK").unwrap_or_else(|_| "testnet4".to_string()),
            explorer_url: env::var("EXPLORER_API_URL")
                .unwrap_or_else(|_| "https://mempool.space/testnet4/api".to_string()),
            explorer_timeout_secs: parse_var("EXPLORER_TIMEOUT_SECS", 10),
            prover_url: env::var("PROVER_API_URL")
                .unwrap_or_else(|_| "https://v9.charms.dev".to_string()),
            prover_timeout_secs: parse_var("PROVER_TIMEOUT_SECS", 300),
            fee_rate: parse_var("FEE_RATE", 2.0),
        };

        let reservation_config = ReservationConfig {
            ttl_ms: parse_var("RESERVATION_TTL_MS", DEFAULT_RESERVATION_TTL_MS),
            prover_cache_retention_ms: parse_var(
                "PROVER_CACHE_RETENTION_MS",
                DEFAULT_RESERVATION_TTL_MS,
            ),
            store_path: env::var("RESERVATION_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".zkusd/reservations.json")),
        };

        let simulation_config = SimulationConfig {
            time_scale: parse_var("SIMULATION_TIME_SCALE", 1.0),
        };

        Self {
            network: network_config,
            reservation: reservation_config,
            simulation: simulation_config,
        }
    }

    /// Reject configurations that would reintroduce the double-reservation race
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reservation.ttl_ms <= 0 {
            return Err(ConfigError::Invalid(format!(
                "RESERVATION_TTL_MS must be positive, got {}",
                self.reservation.ttl_ms
            )));
        }
        if self.reservation.ttl_ms != self.reservation.prover_cache_retention_ms {
            return Err(ConfigError::RetentionMismatch {
                ttl_ms: self.reservation.ttl_ms,
                retention_ms: self.reservation.prover_cache_retention_ms,
            });
        }
        if !self.simulation.time_scale.is_finite() || self.simulation.time_scale < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "SIMULATION_TIME_SCALE must be a non-negative number, got {}",
                self.simulation.time_scale
            )));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                network: "testnet4".to_string(),
                explorer_url: "https://mempool.space/testnet4/api".to_string(),
                explorer_timeout_secs: 10,
                prover_url: "https://v9.charms.dev".to_string(),
                prover_timeout_secs: 300,
                fee_rate: 2.0,
            },
            reservation: ReservationConfig {
                ttl_ms: DEFAULT_RESERVATION_TTL_MS,
                prover_cache_retention_ms: DEFAULT_RESERVATION_TTL_MS,
                store_path: PathBuf::from(".zkusd/reservations.json"),
            },
            simulation: SimulationConfig {
                time_scale: 1.0,
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
