use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment environment. Production tightens cookie and secret handling.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub environment: Environment,
    /// Origins allowed to call the API from a browser with credentials
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Take the client IP from `X-Forwarded-For`/`X-Real-IP`. Only enable
    /// behind a proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            environment: Environment::default(),
            allowed_origins: Vec::new(),
            trust_proxy_headers: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing session tokens. Required in production.
    pub jwt_secret: Option<String>,
    /// Lifetime of an `admin` session in hours (default: 24)
    #[serde(default = "default_admin_session_hours")]
    pub admin_session_hours: i64,
    /// Lifetime of a `founder` session in days (default: 30)
    #[serde(default = "default_long_session_days")]
    pub founder_session_days: i64,
    /// Lifetime of a `client` session in days (default: 30)
    #[serde(default = "default_long_session_days")]
    pub client_session_days: i64,
    /// Founder account created on first start if no staff account uses this email
    pub founder_email: Option<String>,
    pub founder_password: Option<String>,
    #[serde(default = "default_founder_name")]
    pub founder_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            admin_session_hours: default_admin_session_hours(),
            founder_session_days: default_long_session_days(),
            client_session_days: default_long_session_days(),
            founder_email: None,
            founder_password: None,
            founder_name: default_founder_name(),
        }
    }
}

fn default_admin_session_hours() -> i64 {
    24
}

fn default_long_session_days() -> i64 {
    30
}

fn default_founder_name() -> String {
    "Founder".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database file name inside `server.data_dir`
    #[serde(default = "default_db_file")]
    pub file_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Upper bound for acquiring a connection or waiting on a write lock
    #[serde(default = "default_db_timeout")]
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            file_name: default_db_file(),
            max_connections: default_max_connections(),
            timeout_secs: default_db_timeout(),
        }
    }
}

fn default_db_file() -> String {
    "portal.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_db_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    #[serde(default = "default_true")]
    pub smtp_tls: bool,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    /// Inbox that receives new booking and contact notifications
    pub admin_address: Option<String>,
    /// Upper bound for a single send
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

impl EmailConfig {
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            smtp_tls: true,
            from_address: None,
            from_name: default_from_name(),
            admin_address: None,
            send_timeout_secs: default_send_timeout(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_from_name() -> String {
    "Agency Portal".to_string()
}

fn default_send_timeout() -> u64 {
    10
}

/// Fixed-window limit for the public contact form
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_contact_requests")]
    pub contact_requests_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// How often stale counters are pruned
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            contact_requests_per_window: default_contact_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_contact_requests() -> u32 {
    5
}

fn default_window_seconds() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    600
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// Slots offered by the availability endpoint, in display order
    #[serde(default = "default_daily_slots")]
    pub daily_slots: Vec<String>,
    #[serde(default = "default_duration")]
    pub default_duration_minutes: i64,
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            daily_slots: default_daily_slots(),
            default_duration_minutes: default_duration(),
            default_timezone: default_timezone(),
        }
    }
}

fn default_daily_slots() -> Vec<String> {
    [
        "9:00 AM", "10:00 AM", "11:00 AM", "12:00 PM", "2:00 PM", "3:00 PM", "4:00 PM",
        "5:00 PM",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_duration() -> i64 {
    30
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn is_production(&self) -> bool {
        self.server.environment.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.admin_session_hours, 24);
        assert_eq!(config.auth.client_session_days, 30);
        assert_eq!(config.rate_limit.contact_requests_per_window, 5);
        assert_eq!(config.booking.daily_slots.len(), 8);
        assert!(!config.is_production());
        assert!(!config.email.is_configured());
        assert!(!config.server.trust_proxy_headers);
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            environment = "production"
            port = 8080

            [auth]
            jwt_secret = "s3cret"

            [booking]
            daily_slots = ["10:00 AM"]
            "#,
        )
        .unwrap();
        assert!(config.is_production());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.founder_session_days, 30);
        assert_eq!(config.booking.daily_slots, vec!["10:00 AM".to_string()]);
        assert_eq!(config.booking.default_duration_minutes, 30);
    }
}
