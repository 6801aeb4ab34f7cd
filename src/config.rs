//! Application configuration module
//! Loads settings from environment variables (optionally a `.env` file) and validates them

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::payments::providers::CardPayConfig;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// `None` keeps orders and refunds in process memory
    pub database: Option<DatabaseConfig>,
    pub logging: LoggingConfig,
    pub billing: BillingConfig,
    pub cardpay: CardPayConfig,
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

/// Deployment environment; production enforces per-project payment method settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "test" | "sandbox" | "development" | "dev" => Ok(Environment::Test),
            _ => Err(ConfigError::InvalidValue(format!(
                "BILLING_ENVIRONMENT: {}",
                value
            ))),
        }
    }
}

/// Billing engine settings
#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub environment: Environment,
    /// Alphabetic code of the PSP accounting currency
    pub psp_accounting_currency: String,
    pub reference_refresh_interval: u64, // seconds
    pub external_call_timeout: u64,      // seconds
    /// JSON export of the reference collections
    pub reference_data_path: Option<String>,
    /// Base URL of the GeoIP service; a static lookup is used when unset
    pub geoip_url: Option<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Test,
            psp_accounting_currency: "EUR".to_string(),
            reference_refresh_interval: 60,
            external_call_timeout: 10,
            reference_data_path: None,
            geoip_url: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env_optional()?,
            logging: LoggingConfig::from_env()?,
            billing: BillingConfig::from_env()?,
            cardpay: CardPayConfig::from_env(),
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.logging.validate()?;
        self.billing.validate()?;

        if self.cardpay.api_url.is_empty() {
            return Err(ConfigError::InvalidValue("CARDPAY_API_URL".to_string()));
        }
        if self.cardpay.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("CARDPAY_TIMEOUT_SECS".to_string()));
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
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
    /// `None` when `DATABASE_URL` is not set
    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        match env::var("DATABASE_URL") {
            Ok(_) => Self::from_env().map(Some),
            Err(_) => Ok(None),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ConfigError::InvalidValue(
                "DATABASE_URL must start with postgres:// or postgresql://".to_string(),
            ));
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

impl BillingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(BillingConfig {
            environment: env::var("BILLING_ENVIRONMENT")
                .unwrap_or_else(|_| "test".to_string())
                .parse()?,
            psp_accounting_currency: env::var("PSP_ACCOUNTING_CURRENCY")
                .unwrap_or_else(|_| "EUR".to_string())
                .trim()
                .to_uppercase(),
            reference_refresh_interval: env::var("REFERENCE_REFRESH_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| {
                    ConfigError::InvalidValue("REFERENCE_REFRESH_INTERVAL_SECS".to_string())
                })?,
            external_call_timeout: env::var("EXTERNAL_CALL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EXTERNAL_CALL_TIMEOUT_SECS".to_string()))?,
            reference_data_path: env::var("REFERENCE_DATA_PATH")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            geoip_url: env::var("GEOIP_URL")
                .ok()
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .filter(|v| !v.is_empty()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.psp_accounting_currency.len() != 3 {
            return Err(ConfigError::InvalidValue(
                "PSP_ACCOUNTING_CURRENCY must be a three-letter code".to_string(),
            ));
        }

        if self.reference_refresh_interval == 0 {
            return Err(ConfigError::InvalidValue(
                "REFERENCE_REFRESH_INTERVAL_SECS".to_string(),
            ));
        }

        if self.external_call_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "EXTERNAL_CALL_TIMEOUT_SECS".to_string(),
            ));
        }

        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.reference_refresh_interval)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout)
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

impl From<std::num::ParseIntError> for ConfigError {
    fn from(_: std::num::ParseIntError) -> Self {
        ConfigError::InvalidValue("Failed to parse integer value".to_string())
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
            port: 0, // Invalid port
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_host_validation() {
        let config = ServerConfig {
            host: "".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "Production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!("test".parse::<Environment>().unwrap(), Environment::Test);
        assert!("staging-eu".parse::<Environment>().is_err());
        assert!(Environment::Production.is_production());
    }

    #[test]
    fn test_billing_config_validation() {
        assert!(BillingConfig::default().validate().is_ok());

        let config = BillingConfig {
            psp_accounting_currency: "EURO".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = BillingConfig {
            external_call_timeout: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_url_scheme_validation() {
        let config = DatabaseConfig {
            url: "mysql://localhost/billing".to_string(),
            max_connections: 10,
            min_connections: 1,
            connection_timeout: 30,
            idle_timeout: None,
        };
        assert!(config.validate().is_err());
    }
}
