use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_REALTIME_BACKEND: &str = "in-memory";
const DEFAULT_SERIAL_NAMESPACE: &str = "NPC";
const DEFAULT_SERIAL_MAX_ATTEMPTS: u32 = 1000;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 1024;

/// Request lifecycle switches that differ between deployments.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Permit the manual `issued -> completed` end-state transition
    #[serde(default)]
    pub allow_request_completion: bool,

    /// Include system-admin holders in the submission fan-out alongside admins
    #[serde(default = "default_true_bool")]
    pub notify_system_admins_on_submit: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            allow_request_completion: false,
            notify_system_admins_on_submit: true,
        }
    }
}

/// Serial number allocation settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SerialConfig {
    /// Leading segment of every serial (`NPC/...`)
    #[serde(default = "default_serial_namespace")]
    #[validate(length(min = 1, max = 16))]
    pub namespace: String,

    /// Candidate probes allowed before giving up with a conflict
    #[serde(default = "default_serial_max_attempts")]
    #[validate(range(min = 1, max = 100000))]
    pub max_attempts: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            namespace: default_serial_namespace(),
            max_attempts: default_serial_max_attempts(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Redis connection URL, used when `realtime_backend` is "redis"
    pub redis_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// Live notification transport: "in-memory" or "redis"
    #[serde(default = "default_realtime_backend")]
    #[validate(custom = "validate_realtime_backend")]
    pub realtime_backend: String,

    /// Capacity of the domain event channel
    #[serde(default = "default_event_buffer_size")]
    #[validate(range(min = 1, message = "event_buffer_size must be greater than 0"))]
    pub event_buffer_size: usize,

    #[serde(default)]
    #[validate]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    #[validate]
    pub serial: SerialConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            redis_url: "redis://localhost:6379".to_string(),
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            realtime_backend: default_realtime_backend(),
            event_buffer_size: default_event_buffer_size(),
            lifecycle: LifecycleConfig::default(),
            serial: SerialConfig::default(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn uses_redis_realtime(&self) -> bool {
        self.realtime_backend.eq_ignore_ascii_case("redis")
    }
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_realtime_backend() -> String {
    DEFAULT_REALTIME_BACKEND.to_string()
}

fn default_event_buffer_size() -> usize {
    DEFAULT_EVENT_BUFFER_SIZE
}

fn default_serial_namespace() -> String {
    DEFAULT_SERIAL_NAMESPACE.to_string()
}

fn default_serial_max_attempts() -> u32 {
    DEFAULT_SERIAL_MAX_ATTEMPTS
}

fn validate_realtime_backend(backend: &str) -> Result<(), ValidationError> {
    match backend.to_ascii_lowercase().as_str() {
        "in-memory" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("realtime_backend");
            err.message = Some("realtime_backend must be 'in-memory' or 'redis'".into());
            Err(err)
        }
    }
}

/// Log level for the crate's own targets. Unknown names fall back to the
/// default level.
fn normalized_level(level: &str) -> String {
    match level.trim().parse::<tracing::Level>() {
        Ok(parsed) => parsed.as_str().to_ascii_lowercase(),
        Err(_) => DEFAULT_LOG_LEVEL.to_string(),
    }
}

/// `RUST_LOG` wins when set and non-empty
fn filter_directive(level: &str, rust_log: Option<String>) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| {
            format!(
                "equipment_tracker={},tower_http=debug",
                normalized_level(level)
            )
        })
}

/// Installs the global subscriber: an env filter plus plain or JSON output.
/// A second call is a no-op.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let directive = filter_directive(level, env::var("RUST_LOG").ok());
    let registry = tracing_subscriber::registry().with(EnvFilter::new(directive));

    if json {
        let _ = registry.with(fmt::layer().json()).try_init();
    } else {
        let _ = registry.with(fmt::layer()).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://equipment.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
