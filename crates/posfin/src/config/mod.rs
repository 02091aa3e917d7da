use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration as StdDuration;

use chrono::Duration;

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

/// Top-level configuration for the marketplace engine.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub engine: EngineConfig,
    pub ledger: LedgerConfig,
    pub webhook: WebhookConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            engine: EngineConfig::load()?,
            ledger: LedgerConfig::load()?,
            webhook: WebhookConfig::load(),
        })
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Cadences, phase windows, and alerting knobs for the lifecycle engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub status_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub revenue_interval_secs: u64,
    pub health_interval_secs: u64,
    pub auction_window_hours: i64,
    pub selection_window_hours: i64,
    pub urgency_horizon_hours: i64,
    pub alert_cooldown_minutes: i64,
    pub scan_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 60,
            sweep_interval_secs: 300,
            revenue_interval_secs: 300,
            health_interval_secs: 30,
            auction_window_hours: 48,
            selection_window_hours: 24,
            urgency_horizon_hours: 2,
            alert_cooldown_minutes: 30,
            scan_limit: 500,
        }
    }
}

impl EngineConfig {
    fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            status_interval_secs: env_u64("APP_STATUS_INTERVAL_SECS", defaults.status_interval_secs)?,
            sweep_interval_secs: env_u64("APP_SWEEP_INTERVAL_SECS", defaults.sweep_interval_secs)?,
            revenue_interval_secs: env_u64(
                "APP_REVENUE_INTERVAL_SECS",
                defaults.revenue_interval_secs,
            )?,
            health_interval_secs: env_u64("APP_HEALTH_INTERVAL_SECS", defaults.health_interval_secs)?,
            auction_window_hours: env_i64("APP_AUCTION_WINDOW_HOURS", defaults.auction_window_hours)?,
            selection_window_hours: env_i64(
                "APP_SELECTION_WINDOW_HOURS",
                defaults.selection_window_hours,
            )?,
            urgency_horizon_hours: env_i64(
                "APP_URGENCY_HORIZON_HOURS",
                defaults.urgency_horizon_hours,
            )?,
            alert_cooldown_minutes: env_i64(
                "APP_ALERT_COOLDOWN_MINUTES",
                defaults.alert_cooldown_minutes,
            )?,
            scan_limit: env_u64("APP_SCAN_LIMIT", defaults.scan_limit as u64)? as usize,
        })
    }

    pub fn status_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.status_interval_secs)
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs)
    }

    pub fn revenue_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.revenue_interval_secs)
    }

    pub fn health_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.health_interval_secs)
    }

    pub fn auction_window(&self) -> Duration {
        Duration::hours(self.auction_window_hours)
    }

    pub fn selection_window(&self) -> Duration {
        Duration::hours(self.selection_window_hours)
    }

    pub fn urgency_horizon(&self) -> Duration {
        Duration::hours(self.urgency_horizon_hours)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::minutes(self.alert_cooldown_minutes)
    }
}

/// Bounds for the revenue collection ledger.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub pending_timeout_minutes: i64,
    pub max_retries: u32,
    pub retry_delay_minutes: i64,
    pub retry_window_hours: i64,
    pub anomaly_window_days: i64,
    pub anomaly_threshold: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            pending_timeout_minutes: 60,
            max_retries: 3,
            retry_delay_minutes: 15,
            retry_window_hours: 24,
            anomaly_window_days: 30,
            anomaly_threshold: 2.0,
        }
    }
}

impl LedgerConfig {
    fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            pending_timeout_minutes: env_i64(
                "APP_LEDGER_TIMEOUT_MINUTES",
                defaults.pending_timeout_minutes,
            )?,
            max_retries: env_u64("APP_LEDGER_MAX_RETRIES", u64::from(defaults.max_retries))? as u32,
            retry_delay_minutes: env_i64(
                "APP_LEDGER_RETRY_DELAY_MINUTES",
                defaults.retry_delay_minutes,
            )?,
            retry_window_hours: env_i64(
                "APP_LEDGER_RETRY_WINDOW_HOURS",
                defaults.retry_window_hours,
            )?,
            anomaly_window_days: env_i64(
                "APP_ANOMALY_WINDOW_DAYS",
                defaults.anomaly_window_days,
            )?,
            anomaly_threshold: defaults.anomaly_threshold,
        })
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::minutes(self.pending_timeout_minutes)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::minutes(self.retry_delay_minutes)
    }

    pub fn retry_window(&self) -> Duration {
        Duration::hours(self.retry_window_hours)
    }
}

/// Outbound monitoring webhook. Forwarding is disabled unless both the URL
/// and the bearer token are configured.
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub token: Option<String>,
}

impl WebhookConfig {
    fn load() -> Self {
        Self {
            url: env::var("ALERT_WEBHOOK_URL").ok().filter(|value| !value.is_empty()),
            token: env::var("ALERT_WEBHOOK_TOKEN").ok().filter(|value| !value.is_empty()),
        }
    }

    pub fn endpoint(&self) -> Option<(&str, &str)> {
        match (self.url.as_deref(), self.token.as_deref()) {
            (Some(url), Some(token)) => Some((url, token)),
            _ => None,
        }
    }
}

fn env_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

fn env_i64(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<i64>()
            .map_err(|_| ConfigError::InvalidNumber { key }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key } => {
                write!(f, "{key} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_STATUS_INTERVAL_SECS",
            "APP_AUCTION_WINDOW_HOURS",
            "APP_LEDGER_MAX_RETRIES",
            "ALERT_WEBHOOK_URL",
            "ALERT_WEBHOOK_TOKEN",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.engine.status_interval_secs, 60);
        assert_eq!(config.engine.auction_window_hours, 48);
        assert_eq!(config.ledger.max_retries, 3);
        assert!(config.webhook.endpoint().is_none());
    }

    #[test]
    fn engine_overrides_are_read_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_STATUS_INTERVAL_SECS", "15");
        env::set_var("APP_AUCTION_WINDOW_HOURS", "72");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.engine.status_interval_secs, 15);
        assert_eq!(config.engine.auction_window(), Duration::hours(72));
        reset_env();
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_STATUS_INTERVAL_SECS", "soon");
        let result = AppConfig::load();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidNumber {
                key: "APP_STATUS_INTERVAL_SECS"
            })
        ));
        reset_env();
    }

    #[test]
    fn webhook_requires_both_url_and_token() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ALERT_WEBHOOK_URL", "https://hooks.example.com/engine");
        let config = AppConfig::load().expect("config loads");
        assert!(config.webhook.endpoint().is_none());
        env::set_var("ALERT_WEBHOOK_TOKEN", "secret");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.webhook.endpoint(),
            Some(("https://hooks.example.com/engine", "secret")),
        );
        reset_env();
    }
}
