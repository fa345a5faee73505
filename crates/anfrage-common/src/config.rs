//! Configuration for Anfrage Desk

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "ANFRAGE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound queue configuration
    #[serde(default)]
    pub queue: QueueConfig,

    /// Inbound fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Mail transport tuning
    #[serde(default)]
    pub mail: MailConfig,

    /// Scheduled trigger endpoints
    #[serde(default)]
    pub cron: CronConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Agency presentation used in generated emails
    #[serde(default)]
    pub desk: DeskConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_database_url() -> String {
    "postgres://localhost/anfrage".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Outbound queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Attempts granted to a newly enqueued email
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: i32,

    /// Maximum items claimed by one drain pass
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Seconds after which a `processing` claim is considered abandoned
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            batch_size: default_batch_size(),
            stale_after_secs: default_stale_after(),
        }
    }
}

impl QueueConfig {
    /// Reject settings under which no email could ever be sent
    pub fn validate(&self) -> crate::Result<()> {
        if self.default_max_attempts < 1 {
            return Err(crate::Error::Config(format!(
                "queue.default_max_attempts must be at least 1, got {}",
                self.default_max_attempts
            )));
        }
        if self.batch_size < 1 {
            return Err(crate::Error::Config(format!(
                "queue.batch_size must be at least 1, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

fn default_max_attempts() -> i32 {
    3
}

fn default_batch_size() -> i64 {
    50
}

fn default_stale_after() -> u64 {
    900
}

/// Inbound fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Mailbox folder to poll
    #[serde(default = "default_mailbox")]
    pub mailbox: String,

    /// Upper bound on messages ingested per pass
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mailbox: default_mailbox(),
            max_messages: default_max_messages(),
        }
    }
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_max_messages() -> usize {
    50
}

/// Which ticket identifier is written into outbound subject tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectRef {
    /// Human-facing ticket number, e.g. `[ANFRAGE-482]`
    #[default]
    Number,
    /// Opaque ticket id
    Id,
}

/// Mail transport tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Connect, greeting and socket timeout for SMTP and IMAP
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,

    /// Identifier embedded in outbound subject tags
    #[serde(default)]
    pub subject_ref: SubjectRef,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_mail_timeout(),
            subject_ref: SubjectRef::default(),
        }
    }
}

fn default_mail_timeout() -> u64 {
    30
}

/// Scheduled trigger endpoints configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronConfig {
    /// Networks allowed to call the trigger endpoints
    #[serde(default = "default_allowed_networks")]
    pub allowed_networks: Vec<String>,

    /// Optional shared secret expected in the `X-Cron-Token` header
    pub token: Option<String>,

    /// Upper bound on a single worker invocation
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u64,
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            allowed_networks: default_allowed_networks(),
            token: None,
            max_duration_secs: default_max_duration(),
        }
    }
}

impl CronConfig {
    /// Parse the configured networks
    pub fn networks(&self) -> crate::Result<Vec<IpNet>> {
        self.allowed_networks
            .iter()
            .map(|n| {
                n.parse::<IpNet>().map_err(|e| {
                    crate::Error::Config(format!("Invalid cron network '{}': {}", n, e))
                })
            })
            .collect()
    }
}

fn default_allowed_networks() -> Vec<String> {
    [
        "127.0.0.0/8",
        "::1/128",
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_duration() -> u64 {
    55
}

/// API configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// CORS allowed origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Agency presentation used in generated emails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Agency name used in greetings and signatures
    #[serde(default = "default_agency_name")]
    pub agency_name: String,

    /// Base URL of the staff back office, used for ticket links
    #[serde(default = "default_staff_url")]
    pub staff_url: String,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            agency_name: default_agency_name(),
            staff_url: default_staff_url(),
        }
    }
}

fn default_agency_name() -> String {
    "Immobilien".to_string()
}

fn default_staff_url() -> String {
    "http://localhost:8080/admin".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Check values that parse fine but cannot work
    pub fn validate(&self) -> crate::Result<()> {
        self.queue.validate()
    }

    /// Load configuration from file and environment.
    ///
    /// The first existing file among `$ANFRAGE_CONFIG`, `./config.toml` and
    /// `/etc/anfrage/config.toml` is used; variables such as
    /// `ANFRAGE__DATABASE__URL` override individual keys.
    pub fn load() -> crate::Result<Self> {
        let mut paths = Vec::new();
        if let Ok(explicit) = std::env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from("./config.toml"));
        paths.push(PathBuf::from("/etc/anfrage/config.toml"));

        let mut builder = config::Config::builder();
        if let Some(path) = paths.iter().find(|p| p.exists()) {
            tracing::info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path.as_path()));
        } else {
            tracing::warn!("No configuration file found, using defaults and environment");
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("ANFRAGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}
