use crate::error::{AppError, Result};

pub const PROVIDER_BASE_URL: &str = "https://api.partnermatic.com/api/monetization";
pub const PROVIDER_SOURCE: &str = "partnermatic";

/// Bound on the outbound provider call. Expiry counts as a fetch failure.
pub const PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Look-back windows accepted by the movers ranking.
pub const MOVER_WINDOWS: &[u32] = &[7, 15, 30, 60, 90];
pub const DEFAULT_MOVER_WINDOW: u32 = 30;

/// Look-back windows accepted by the per-offer history view.
pub const HISTORY_WINDOWS: &[u32] = &[30, 60, 90];
pub const DEFAULT_HISTORY_WINDOW: u32 = 90;

/// Floor applied to the percentage-change divisor so a zero starting EPC
/// still yields a finite result.
pub const EPC_DIVISOR_FLOOR: f64 = 0.0001;

/// Name given to a new offer when the provider omits one.
pub const UNKNOWN_OFFER_NAME: &str = "Unknown Offer";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub provider_base_url: String,
    /// Source tag sent with every provider request (PROVIDER_SOURCE)
    pub provider_source: String,
    /// Credential for the provider (PROVIDER_TOKEN). Ingestion is refused when unset.
    pub provider_token: Option<String>,
    pub provider_timeout_secs: u64,
    /// Background snapshot interval (SNAPSHOT_INTERVAL_SECS). 0 disables the scheduler.
    pub snapshot_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "epc_monitor.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            provider_base_url: std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| PROVIDER_BASE_URL.to_string()),
            provider_source: std::env::var("PROVIDER_SOURCE")
                .unwrap_or_else(|_| PROVIDER_SOURCE.to_string()),
            provider_token: std::env::var("PROVIDER_TOKEN")
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            provider_timeout_secs: std::env::var("PROVIDER_TIMEOUT_SECS")
                .unwrap_or_else(|_| PROVIDER_TIMEOUT_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(PROVIDER_TIMEOUT_SECS),
            snapshot_interval_secs: std::env::var("SNAPSHOT_INTERVAL_SECS")
                .unwrap_or_else(|_| "0".to_string())
                .parse::<u64>()
                .unwrap_or(0),
        })
    }
}
