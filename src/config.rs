use anyhow::{Result, anyhow};
use chrono::FixedOffset;
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::scheduler::SM2Scheduler;

// Import logging macros
use crate::{log_system_event, log_validation};

/// Largest accepted reference-zone offset, one minute short of a full day.
const MAX_OFFSET_MINUTES: i32 = 23 * 60 + 59;

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub scheduler: SchedulerConfig,
}

/// Database connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

/// Review scheduling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Offset from UTC, in minutes, of the zone whose midnight starts a study day.
    pub utc_offset_minutes: i32,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            scheduler: SchedulerConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            server_address = %self.server.address(),
            log_level = %self.logging.level,
            scheduler_utc_offset_minutes = self.scheduler.utc_offset_minutes,
            "Configuration summary"
        );
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = self.check_values() {
            log_validation!(failure, "configuration", error = e);
            return Err(e);
        }

        let base_level = self.logging.level.split(',').next().unwrap_or_default();
        let known_levels = ["trace", "debug", "info", "warn", "error"];
        if !known_levels.contains(&base_level.to_lowercase().as_str()) {
            warn!("Invalid log level '{}', using 'info' as fallback", self.logging.level);
        }

        log_validation!(success, "configuration", "Configuration validated");
        Ok(())
    }

    fn check_values(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.scheduler.utc_offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(anyhow!(
                "SCHEDULER_UTC_OFFSET_MINUTES must be within ±{} minutes",
                MAX_OFFSET_MINUTES
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:study_planner.db?mode=rwc".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string());

        let port = port_str.parse::<u16>().map_err(|_| {
            anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str)
        })?;

        let host = env::var("HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info,study_planner=debug".to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY")
            .unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

impl SchedulerConfig {
    fn from_env() -> Result<Self> {
        let raw = env::var("SCHEDULER_UTC_OFFSET_MINUTES")
            .unwrap_or_else(|_| "0".to_string());

        let utc_offset_minutes = raw.trim().parse::<i32>()
            .map_err(|_| anyhow!("Invalid SCHEDULER_UTC_OFFSET_MINUTES value: '{}'", raw))?;

        Ok(SchedulerConfig { utc_offset_minutes })
    }

    pub fn reference_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC offset out of range: {} minutes", self.utc_offset_minutes))
    }

    pub fn build_scheduler(&self) -> Result<SM2Scheduler> {
        Ok(SM2Scheduler::with_offset(self.reference_offset()?))
    }
}

/// Mask sensitive data in configuration for safe logging
fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            database: DatabaseConfig {
                url: "sqlite:test.db".to_string(),
            },
            server: ServerConfig {
                port: 3000,
                host: "0.0.0.0".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_enabled: true,
                console_enabled: true,
                log_directory: "logs".to_string(),
            },
            scheduler: SchedulerConfig {
                utc_offset_minutes: -180,
            },
        }
    }

    #[test]
    fn test_mask_sensitive_data() {
        assert_eq!(mask_sensitive_data("short"), "*****");
        assert_eq!(mask_sensitive_data("sqlite:study_planner.db"), "sqli***r.db");
    }

    #[test]
    fn test_config_validation() {
        let config = valid_config();
        assert!(config.validate().is_ok());

        let mut invalid_port = config.clone();
        invalid_port.server.port = 0;
        assert!(invalid_port.validate().is_err());

        let mut invalid_url = config.clone();
        invalid_url.database.url = "postgres://localhost/study".to_string();
        assert!(invalid_url.validate().is_err());

        let mut invalid_offset = config;
        invalid_offset.scheduler.utc_offset_minutes = 24 * 60;
        assert!(invalid_offset.validate().is_err());
    }

    #[test]
    fn test_scheduler_offset_conversion() {
        let config = valid_config();
        let offset = config.scheduler.reference_offset().unwrap();
        assert_eq!(offset.local_minus_utc(), -3 * 3600);

        let scheduler = config.scheduler.build_scheduler().unwrap();
        assert_eq!(scheduler.reference_offset(), offset);
    }

    #[test]
    fn test_server_address() {
        let config = valid_config();
        assert_eq!(config.server.address(), "0.0.0.0:3000");
    }
}
