//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use bigdecimal::BigDecimal;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub payment: PaymentConfig,
    pub upload: UploadConfig,
    pub gateway: GatewayConfig,
    pub storage: StorageConfig,
    pub notification: NotificationConfig,
    /// Boot with in-memory repositories and storage
    pub skip_externals: bool,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Payment rules
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Orders below this total are rejected before any gateway call
    pub minimum_amount: BigDecimal,
    pub currency: String,
    /// Shared secret expected in the `x-approval-secret` header
    pub approval_secret: String,
}

/// Payment slip upload limits
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_bytes: usize,
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub allowed_mime_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub folder: String,
}

/// Card gateway client
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_base_url: String,
    pub vault_base_url: String,
    pub public_key: String,
    pub secret_key: String,
    pub timeout_secs: u64,
    /// Gateway calls are not retried by default
    pub max_retries: u32,
}

/// Object storage for payment slips
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub base_url: String,
    pub bucket: String,
    pub service_key: String,
    pub timeout_secs: u64,
}

/// Outbound payment notifications
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// Log-only notifications when unset
    pub webhook_url: Option<String>,
    pub signing_secret: String,
    pub timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        let skip_externals = env::var("SKIP_EXTERNALS")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let database = if skip_externals {
            DatabaseConfig::from_env().unwrap_or_else(|_| DatabaseConfig::unused())
        } else {
            DatabaseConfig::from_env()?
        };

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database,
            logging: LoggingConfig::from_env()?,
            payment: PaymentConfig::from_env()?,
            upload: UploadConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            notification: NotificationConfig::from_env()?,
            skip_externals,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if !self.skip_externals {
            self.database.validate()?;
            self.gateway.validate()?;
            self.storage.validate()?;
        }
        self.logging.validate()?;
        self.payment.validate()?;
        self.upload.validate()?;
        self.notification.validate()?;

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn list_var(name: &str, default: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn check_url(name: &str, url: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be a valid URL",
            name
        )));
    }
    Ok(())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    fn unused() -> Self {
        DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
            connection_timeout: 30,
            idle_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let minimum_amount = BigDecimal::from_str(
            env::var("PAYMENT_MINIMUM_AMOUNT")
                .unwrap_or_else(|_| "20".to_string())
                .trim(),
        )
        .map_err(|_| ConfigError::InvalidValue("PAYMENT_MINIMUM_AMOUNT".to_string()))?;

        Ok(PaymentConfig {
            minimum_amount,
            currency: env::var("PAYMENT_CURRENCY")
                .unwrap_or_else(|_| "thb".to_string())
                .to_lowercase(),
            approval_secret: env::var("PAYMENT_APPROVAL_SECRET").unwrap_or_default(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.minimum_amount < BigDecimal::from(0) {
            return Err(ConfigError::InvalidValue(
                "PAYMENT_MINIMUM_AMOUNT cannot be negative".to_string(),
            ));
        }

        if self.currency.len() != 3 {
            return Err(ConfigError::InvalidValue("PAYMENT_CURRENCY".to_string()));
        }

        // An empty secret would accept any approval request
        if self.approval_secret.is_empty() {
            return Err(ConfigError::MissingVariable(
                "PAYMENT_APPROVAL_SECRET".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        PaymentConfig {
            minimum_amount: BigDecimal::from(20),
            currency: "thb".to_string(),
            approval_secret: String::new(),
        }
    }
}

impl UploadConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(UploadConfig {
            max_file_bytes: parse_var("UPLOAD_MAX_FILE_BYTES", "5242880")?,
            min_dimension: parse_var("UPLOAD_MIN_DIMENSION", "200")?,
            max_dimension: parse_var("UPLOAD_MAX_DIMENSION", "10000")?,
            allowed_mime_types: list_var("UPLOAD_ALLOWED_MIME_TYPES", "image/jpeg,image/png"),
            allowed_extensions: list_var("UPLOAD_ALLOWED_EXTENSIONS", "jpg,jpeg,png"),
            folder: env::var("UPLOAD_FOLDER").unwrap_or_else(|_| "payment-slips".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_bytes == 0 {
            return Err(ConfigError::InvalidValue("UPLOAD_MAX_FILE_BYTES".to_string()));
        }

        if self.min_dimension == 0 || self.min_dimension > self.max_dimension {
            return Err(ConfigError::InvalidValue(
                "UPLOAD_MIN_DIMENSION must be > 0 and <= UPLOAD_MAX_DIMENSION".to_string(),
            ));
        }

        if self.allowed_mime_types.is_empty() || self.allowed_extensions.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one image type must be allowed".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            max_file_bytes: 5 * 1024 * 1024,
            min_dimension: 200,
            max_dimension: 10_000,
            allowed_mime_types: vec!["image/jpeg".to_string(), "image/png".to_string()],
            allowed_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
            folder: "payment-slips".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(GatewayConfig {
            api_base_url: env::var("GATEWAY_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.omise.co".to_string()),
            vault_base_url: env::var("GATEWAY_VAULT_BASE_URL")
                .unwrap_or_else(|_| "https://vault.omise.co".to_string()),
            public_key: env::var("GATEWAY_PUBLIC_KEY").unwrap_or_default(),
            secret_key: env::var("GATEWAY_SECRET_KEY").unwrap_or_default(),
            timeout_secs: parse_var("GATEWAY_TIMEOUT_SECS", "30")?,
            max_retries: parse_var("GATEWAY_MAX_RETRIES", "0")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("GATEWAY_API_BASE_URL", &self.api_base_url)?;
        check_url("GATEWAY_VAULT_BASE_URL", &self.vault_base_url)?;

        if self.public_key.is_empty() {
            return Err(ConfigError::MissingVariable("GATEWAY_PUBLIC_KEY".to_string()));
        }
        if self.secret_key.is_empty() {
            return Err(ConfigError::MissingVariable("GATEWAY_SECRET_KEY".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("GATEWAY_TIMEOUT_SECS".to_string()));
        }

        Ok(())
    }
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(StorageConfig {
            base_url: env::var("STORAGE_BASE_URL").unwrap_or_default(),
            bucket: env::var("STORAGE_BUCKET").unwrap_or_else(|_| "payments".to_string()),
            service_key: env::var("STORAGE_SERVICE_KEY").unwrap_or_default(),
            timeout_secs: parse_var("STORAGE_TIMEOUT_SECS", "30")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("STORAGE_BASE_URL", &self.base_url)?;

        if self.bucket.is_empty() {
            return Err(ConfigError::InvalidValue("STORAGE_BUCKET".to_string()));
        }
        if self.service_key.is_empty() {
            return Err(ConfigError::MissingVariable("STORAGE_SERVICE_KEY".to_string()));
        }

        Ok(())
    }
}

impl NotificationConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(NotificationConfig {
            webhook_url: env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            signing_secret: env::var("NOTIFICATION_SIGNING_SECRET").unwrap_or_default(),
            timeout_secs: parse_var("NOTIFICATION_TIMEOUT_SECS", "10")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.webhook_url {
            check_url("NOTIFICATION_WEBHOOK_URL", url)?;
            if self.signing_secret.is_empty() {
                return Err(ConfigError::MissingVariable(
                    "NOTIFICATION_SIGNING_SECRET".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

impl From<ConfigError> for crate::error::AppError {
    fn from(err: ConfigError) -> Self {
        crate::error::AppError::infrastructure(crate::error::InfrastructureError::Configuration {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_payment_config_requires_approval_secret() {
        let mut config = PaymentConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingVariable(_))
        ));

        config.approval_secret = "s3cret".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.minimum_amount, BigDecimal::from(20));
    }

    #[test]
    fn test_upload_defaults() {
        let config = UploadConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_file_bytes, 5 * 1024 * 1024);
        assert_eq!((config.min_dimension, config.max_dimension), (200, 10_000));
    }

    #[test]
    fn test_upload_dimension_bounds_validation() {
        let config = UploadConfig {
            min_dimension: 500,
            max_dimension: 100,
            ..UploadConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_notification_webhook_needs_secret() {
        let config = NotificationConfig {
            webhook_url: Some("https://hooks.example.com/payments".to_string()),
            signing_secret: String::new(),
            timeout_secs: 10,
        };
        assert!(config.validate().is_err());

        let log_only = NotificationConfig {
            webhook_url: None,
            signing_secret: String::new(),
            timeout_secs: 10,
        };
        assert!(log_only.validate().is_ok());
    }

    #[test]
    fn test_gateway_requires_keys() {
        let config = GatewayConfig {
            api_base_url: "https://api.omise.co".to_string(),
            vault_base_url: "https://vault.omise.co".to_string(),
            public_key: String::new(),
            secret_key: "skey".to_string(),
            timeout_secs: 30,
            max_retries: 0,
        };
        assert!(config.validate().is_err());
    }
}
