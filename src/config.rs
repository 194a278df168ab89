//! Application configuration module
//! Handles environment variable loading, configuration validation, and
//! application settings

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub pix: PixConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Gateway integration settings
#[derive(Debug, Clone)]
pub struct PixConfig {
    pub cert_dir: String,
    pub request_timeout: u64, // seconds
    pub max_idle_connections: usize,
    pub allow_tls_fallback: bool,
    pub token_safety_margin: u64, // seconds
    pub charge_expiry: u64,       // seconds
    pub poll_max_attempts: u32,
    pub expected_journey: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            logging: LoggingConfig::from_env()?,
            pix: PixConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        self.pix.validate()?;
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

impl PixConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PixConfig {
            cert_dir: env::var("PIX_CERT_DIR").unwrap_or_else(|_| "certificates".to_string()),
            request_timeout: env::var("PIX_REQUEST_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_REQUEST_TIMEOUT".to_string()))?,
            max_idle_connections: env::var("PIX_MAX_IDLE_CONNECTIONS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_MAX_IDLE_CONNECTIONS".to_string()))?,
            allow_tls_fallback: env::var("PIX_TLS_FALLBACK")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_TLS_FALLBACK".to_string()))?,
            token_safety_margin: env::var("PIX_TOKEN_SAFETY_MARGIN")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_TOKEN_SAFETY_MARGIN".to_string()))?,
            charge_expiry: env::var("PIX_CHARGE_EXPIRY")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_CHARGE_EXPIRY".to_string()))?,
            poll_max_attempts: env::var("PIX_POLL_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "12".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PIX_POLL_MAX_ATTEMPTS".to_string()))?,
            expected_journey: env::var("PIX_EXPECTED_JOURNEY")
                .unwrap_or_else(|_| "JORNADA_3".to_string()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue("PIX_REQUEST_TIMEOUT".to_string()));
        }
        if self.poll_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "PIX_POLL_MAX_ATTEMPTS".to_string(),
            ));
        }
        if self.expected_journey.is_empty() {
            return Err(ConfigError::InvalidValue(
                "PIX_EXPECTED_JOURNEY".to_string(),
            ));
        }
        Ok(())
    }

    pub fn http_settings(&self) -> crate::pix::transport::HttpSettings {
        crate::pix::transport::HttpSettings {
            request_timeout: Duration::from_secs(self.request_timeout),
            max_idle_connections: self.max_idle_connections,
            allow_tls_fallback: self.allow_tls_fallback,
        }
    }

    pub fn poll_settings(&self) -> crate::pix::polling::PollSettings {
        crate::pix::polling::PollSettings {
            max_attempts: self.poll_max_attempts,
            expected_journey: self.expected_journey.clone(),
            ..crate::pix::polling::PollSettings::default()
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),
}
