use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
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
const DEFAULT_PAYMENT_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_REGISTRAR_API_BASE: &str = "https://api.nameforge.io";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_SERVICE_FEE: &str = "12.00";
const DEFAULT_CURRENCY: &str = "usd";
const DEFAULT_TERM_YEARS: i32 = 1;
const DEFAULT_SEARCH_TIMEOUT_SECS: u64 = 8;
const DEFAULT_EXTERNAL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_EXTERNAL_RETRY_BUDGET: u32 = 2;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port (1024-65535)
    #[serde(default = "default_port")]
    #[validate(range(min = 1024))]
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

    /// Public base URL of the application, used for checkout redirect targets
    #[validate(url)]
    pub app_base_url: String,

    /// Payment processor API base URL
    #[serde(default = "default_payment_api_base")]
    #[validate(url)]
    pub payment_api_base: String,

    /// Payment processor secret key (required; no insecure default)
    #[validate(length(min = 8))]
    pub payment_secret_key: String,

    /// Shared secret for verifying inbound payment webhooks.
    /// When unset, signature verification is skipped (dev only).
    #[serde(default)]
    pub payment_webhook_secret: Option<String>,

    /// Accepted clock skew for webhook signatures, in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub payment_webhook_tolerance_secs: u64,

    /// Registrar / hosting platform API base URL
    #[serde(default = "default_registrar_api_base")]
    #[validate(url)]
    pub registrar_api_base: String,

    /// Registrar API token (required)
    #[validate(length(min = 8))]
    pub registrar_api_token: String,

    /// Hosting project the purchased domains get attached to
    #[validate(length(min = 1))]
    pub registrar_project_id: String,

    /// Flat yearly service fee added on top of the registrar price
    #[serde(default = "default_service_fee")]
    pub domain_service_fee: Decimal,

    /// Billing currency for domain checkouts
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Registration term offered at checkout, in years
    #[serde(default = "default_term_years")]
    pub domain_term_years: i32,

    /// Caller-visible deadline for a whole domain search fan-out
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Per-call timeout for registrar / payment API requests
    #[serde(default = "default_external_timeout")]
    pub external_timeout_secs: u64,

    /// Retry budget for idempotent external reads (availability, price, verify)
    #[serde(default = "default_external_retry_budget")]
    pub external_retry_budget: u32,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_payment_api_base() -> String {
    DEFAULT_PAYMENT_API_BASE.to_string()
}
fn default_registrar_api_base() -> String {
    DEFAULT_REGISTRAR_API_BASE.to_string()
}
fn default_webhook_tolerance() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_service_fee() -> Decimal {
    DEFAULT_SERVICE_FEE.parse().unwrap_or(Decimal::ZERO)
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_term_years() -> i32 {
    DEFAULT_TERM_YEARS
}
fn default_search_timeout() -> u64 {
    DEFAULT_SEARCH_TIMEOUT_SECS
}
fn default_external_timeout() -> u64 {
    DEFAULT_EXTERNAL_TIMEOUT_SECS
}
fn default_external_retry_budget() -> u32 {
    DEFAULT_EXTERNAL_RETRY_BUDGET
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Cross-field checks the derive cannot express.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.is_production() && self.payment_webhook_secret.is_none() {
            let mut err = ValidationError::new("payment_webhook_secret");
            err.message = Some("Webhook secret is required in production".into());
            errors.add("payment_webhook_secret", err);
        }
        if self.domain_service_fee.is_sign_negative() {
            let mut err = ValidationError::new("domain_service_fee");
            err.message = Some("Service fee cannot be negative".into());
            errors.add("domain_service_fee", err);
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration load error: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation error: {0}")]
    Validation(ValidationErrors),
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
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

    // NOTE: payment_secret_key, registrar_api_token, and registrar_project_id
    // have no defaults - they MUST come from the environment or a config file.
    let builder = Config::builder()
        .set_default("database_url", "sqlite://mixsite_domains.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("app_base_url", "http://localhost:3000")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false));

    let config = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    for required in ["payment_secret_key", "registrar_api_token", "registrar_project_id"] {
        if config.get_string(required).is_err() {
            error!(
                "{} is not configured. Set APP__{} in the environment or a config file.",
                required,
                required.to_uppercase()
            );
            return Err(AppConfigError::Load(ConfigError::NotFound(format!(
                "{required} is required but not configured"
            ))));
        }
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("mixsite_domains={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}
