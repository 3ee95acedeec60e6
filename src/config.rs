//! Service configuration from environment variables

use crate::flow::FlowSettings;
use chrono::Duration;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SITE_URL: &str = "http://localhost";
const DEFAULT_TEXTBACK_API_URL: &str = "https://api.textback.io/api";
const DEFAULT_TEXTBACK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CHAIN_LIFETIME_SECS: i64 = 24 * 60 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub port: u16,
    pub site_url: String,
    pub textback_api_url: String,
    pub textback_api_token: Option<String>,
    pub textback_timeout: std::time::Duration,
    pub chain_lifetime: Duration,
    pub token_ttl: Duration,
    /// `None` disables the in-process sweeper
    pub sweep_interval: Option<std::time::Duration>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparsable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<i64>().ok());

        let db_path = lookup("BOOKING_DB_PATH").unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.booking-funnel/booking.db")
        });

        let port = lookup("BOOKING_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let chain_lifetime = Duration::seconds(
            parsed("BOOKING_CHAIN_LIFETIME_SECS")
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_CHAIN_LIFETIME_SECS),
        );

        let token_ttl = parsed("BOOKING_TOKEN_TTL_SECS")
            .filter(|secs| *secs > 0)
            .map_or(chain_lifetime, Duration::seconds);

        let timeout_secs = lookup("TEXTBACK_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TEXTBACK_TIMEOUT_SECS);

        let sweep_secs = lookup("BOOKING_SWEEP_INTERVAL_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        Self {
            db_path,
            port,
            site_url: lookup("BOOKING_SITE_URL").unwrap_or_else(|| DEFAULT_SITE_URL.to_string()),
            textback_api_url: lookup("TEXTBACK_API_URL")
                .unwrap_or_else(|| DEFAULT_TEXTBACK_API_URL.to_string()),
            textback_api_token: lookup("TEXTBACK_API_TOKEN").filter(|t| !t.is_empty()),
            textback_timeout: std::time::Duration::from_secs(timeout_secs),
            chain_lifetime,
            token_ttl,
            sweep_interval: (sweep_secs > 0).then(|| std::time::Duration::from_secs(sweep_secs)),
        }
    }

    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            site_url: self.site_url.clone(),
            chain_lifetime: self.chain_lifetime,
            token_ttl: self.token_ttl,
        }
    }
}
