//! Configuration loading and validation for the watchdog server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};
use watchdog::prober::DEFAULT_HTTP_PORTS;
use watchdog::{
    EscalationPolicy, NotifyFailurePolicy, ProbeConfig, ReconcilePolicy, RetryPolicy,
};

// Re-export Validate trait for derive macro
#[allow(unused_imports)]
use validator::Validate as _;

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found in search paths")]
    FileNotFound,

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub sheets: SheetSettings,

    #[serde(default)]
    pub state: StateSettings,

    #[serde(default)]
    pub notify: NotifySettings,

    #[serde(default)]
    pub probe: ProbeSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.server.validate()?;
        self.sheets.validate()?;
        self.state.validate()?;
        self.notify.validate()?;
        self.probe.validate()?;
        Ok(())
    }
}

/// Server-level settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerSettings {
    /// Address the HTTP trigger endpoint listens on.
    #[validate(length(min = 1))]
    pub listen_addr: String,

    /// Optional internal timer: run a pass this often in addition to
    /// HTTP triggers.
    #[serde(default, with = "humantime_serde")]
    pub run_interval: Option<Duration>,
}

/// Google Sheets row source settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SheetSettings {
    /// Spreadsheet document id. Required at runtime.
    pub spreadsheet_id: String,

    /// Monitored range: `A2:D`, or `Tab!A2:D` to pin one tab.
    #[validate(length(min = 1), custom = "validate_cell_range")]
    pub cell_range: String,

    /// Sheets API base URL.
    #[validate(length(min = 1))]
    pub api_base: String,

    /// Bearer token for the Sheets API, inline.
    pub access_token: Option<String>,

    /// Name of an environment variable holding the bearer token.
    pub access_token_env: Option<String>,

    /// Backoff schedule for the rate-limited metadata call.
    #[serde(default)]
    pub metadata_retry: RetrySettings,
}

/// Bounded-backoff schedule
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetrySettings {
    #[validate(range(min = 1, max = 100))]
    pub max_attempts: u32,

    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
}

/// State persistence settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StateSettings {
    /// Directory holding one JSON snapshot per collection.
    #[validate(length(min = 1))]
    pub dir: String,

    /// Prefix for per-collection state keys.
    #[validate(length(min = 1))]
    pub key_prefix: String,
}

/// Notification settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NotifySettings {
    /// Chat webhook URL. When absent, state changes are only logged.
    #[validate(custom = "validate_webhook_url")]
    pub webhook_url: Option<String>,

    /// Whether a delivery failure aborts the pass.
    #[serde(default)]
    pub on_failure: NotifyFailurePolicy,

    /// When the urgent-mention flag is set on error notifications.
    #[serde(default)]
    pub escalation: EscalationPolicy,
}

/// Probe settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProbeSettings {
    #[serde(with = "humantime_serde")]
    pub http_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub tcp_timeout: Duration,

    /// Ports on which plain `http` targets get a GET instead of a raw
    /// connect.
    pub http_ports: Vec<u16>,

    /// Bound on concurrent probes per pass.
    #[validate(range(min = 1, max = 1024))]
    pub concurrency: usize,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            run_interval: None,
        }
    }
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            cell_range: "A2:D".to_string(),
            api_base: "https://sheets.googleapis.com".to_string(),
            access_token: None,
            access_token_env: Some("SHEETS_ACCESS_TOKEN".to_string()),
            metadata_retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(5),
        }
    }
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            dir: "./state".to_string(),
            key_prefix: "server_status".to_string(),
        }
    }
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            on_failure: NotifyFailurePolicy::Lenient,
            escalation: EscalationPolicy::FirstErrorOnly,
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10),
            tcp_timeout: Duration::from_secs(15),
            http_ports: DEFAULT_HTTP_PORTS.to_vec(),
            concurrency: 16,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: None,
            format: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            sheets: SheetSettings::default(),
            state: StateSettings::default(),
            notify: NotifySettings::default(),
            probe: ProbeSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

// Custom validators

fn validate_cell_range(range: &str) -> Result<(), ValidationError> {
    let cell_part = match range.split_once('!') {
        Some((sheet, cells)) => {
            if sheet.trim().is_empty() {
                return Err(ValidationError::new("cell_range_empty_sheet"));
            }
            cells
        }
        None => range,
    };
    // Must start with a column reference like "A2" or "A".
    if !cell_part
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
    {
        return Err(ValidationError::new("cell_range_invalid_origin"));
    }
    Ok(())
}

fn validate_webhook_url(url: &str) -> Result<(), ValidationError> {
    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(ValidationError::new("webhook_url_not_http"));
    }
    Ok(())
}

// Conversions to runtime types

impl Config {
    pub fn to_probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            http_timeout: self.probe.http_timeout,
            tcp_timeout: self.probe.tcp_timeout,
            http_ports: self.probe.http_ports.clone(),
        }
    }

    pub fn to_reconcile_policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            notify_failure: self.notify.on_failure,
            escalation: self.notify.escalation,
        }
    }

    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sheets.metadata_retry.max_attempts,
            initial_delay: self.sheets.metadata_retry.initial_delay,
            multiplier: 2,
        }
    }
}

impl SheetSettings {
    /// Resolve the configured bearer token: inline value first, then
    /// the named environment variable.
    pub fn resolve_access_token(&self) -> Option<String> {
        if let Some(token) = &self.access_token {
            return Some(token.clone());
        }
        self.access_token_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|token| !token.is_empty())
    }

    /// Split `cell_range` into an optional pinned tab and the cell
    /// part.
    pub fn split_range(&self) -> (Option<String>, String) {
        match self.cell_range.split_once('!') {
            Some((sheet, cells)) => (Some(sheet.to_string()), cells.to_string()),
            None => (None, self.cell_range.clone()),
        }
    }
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/sheetwatch/watchdog-server.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./watchdog-server.yaml"));

        paths
            .into_iter()
            .find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/sheetwatch/watchdog-server.yaml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_valid_yaml_parsing() {
        let yaml = r#"
server:
  listen_addr: "127.0.0.1:9090"
  run_interval: 5m

sheets:
  spreadsheet_id: "1abcDEF"
  cell_range: "Servers!A2:D"
  api_base: "https://sheets.googleapis.com"

notify:
  webhook_url: "https://hooks.slack.com/services/T0/B0/x"
  on_failure: fatal
  escalation: every-error

probe:
  http_timeout: 10s
  tcp_timeout: 15s
  http_ports: [80, 443, 8080, 8443]
  concurrency: 32
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.listen_addr, "127.0.0.1:9090");
        assert_eq!(config.server.run_interval, Some(Duration::from_secs(300)));
        assert_eq!(config.sheets.spreadsheet_id, "1abcDEF");
        assert_eq!(config.notify.on_failure, NotifyFailurePolicy::Fatal);
        assert_eq!(config.notify.escalation, EscalationPolicy::EveryError);
        assert_eq!(config.probe.concurrency, 32);
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = r#"
sheets:
  spreadsheet_id: "1abcDEF"
  cell_range: "A2:D"
  api_base: "https://sheets.googleapis.com"
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert!(config.server.run_interval.is_none());
        assert_eq!(config.probe.http_timeout, Duration::from_secs(10));
        assert_eq!(config.probe.tcp_timeout, Duration::from_secs(15));
        assert_eq!(config.state.key_prefix, "server_status");
        assert_eq!(config.notify.on_failure, NotifyFailurePolicy::Lenient);
    }

    #[test]
    fn test_invalid_cell_range() {
        assert!(validate_cell_range("A2:D").is_ok());
        assert!(validate_cell_range("Servers!A2:D").is_ok());
        assert!(validate_cell_range("!A2:D").is_err());
        assert!(validate_cell_range("2A:D").is_err());
    }

    #[test]
    fn test_invalid_webhook_url() {
        assert!(validate_webhook_url("https://hooks.slack.com/services/x").is_ok());
        assert!(validate_webhook_url("ftp://hooks.slack.com").is_err());
        assert!(validate_webhook_url("").is_err());
    }

    #[test]
    fn test_invalid_concurrency() {
        let yaml = r#"
probe:
  http_timeout: 10s
  tcp_timeout: 15s
  http_ports: [80]
  concurrency: 0
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_split_range() {
        let mut sheets = SheetSettings::default();
        assert_eq!(sheets.split_range(), (None, "A2:D".to_string()));

        sheets.cell_range = "Servers!A2:D".to_string();
        assert_eq!(
            sheets.split_range(),
            (Some("Servers".to_string()), "A2:D".to_string())
        );
    }

    #[test]
    fn test_resolve_access_token_prefers_inline() {
        let sheets = SheetSettings {
            access_token: Some("inline-token".to_string()),
            ..SheetSettings::default()
        };
        assert_eq!(sheets.resolve_access_token().as_deref(), Some("inline-token"));
    }

    #[test]
    fn test_policy_conversions() {
        let config = Config::default();
        let policy = config.to_reconcile_policy();
        assert_eq!(policy.notify_failure, NotifyFailurePolicy::Lenient);
        assert_eq!(policy.escalation, EscalationPolicy::FirstErrorOnly);

        let retry = config.to_retry_policy();
        assert_eq!(retry.max_attempts, 10);
        assert_eq!(retry.initial_delay, Duration::from_secs(5));

        let probe = config.to_probe_config();
        assert_eq!(probe.http_ports, DEFAULT_HTTP_PORTS.to_vec());
    }

    #[test]
    fn test_humantime_serde_parsing() {
        let yaml = r#"
probe:
  http_timeout: 2500ms
  tcp_timeout: 1m
  http_ports: [80]
  concurrency: 8
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.probe.http_timeout, Duration::from_millis(2500));
        assert_eq!(config.probe.tcp_timeout, Duration::from_secs(60));
    }
}
