//! Service settings layered from defaults and `HOP_*` environment variables

use config::{Config, Environment};
use serde::Deserialize;

use crate::error::ConfigError;

/// Listener and feature settings shared by the services
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    /// Interface to bind (`HOP_HOST`)
    pub host: String,
    /// Port to bind (`HOP_PORT`)
    pub port: u16,
    /// Query the Pwned Passwords range API on password changes (`HOP_BREACH_CHECK`)
    pub breach_check: bool,
    /// Cron expression for the daily booking counter reset (`HOP_BOOKING_RESET_SCHEDULE`)
    pub booking_reset_schedule: String,
    /// Log account emails instead of sending them over SMTP (`HOP_LOG_MAILER`)
    pub log_mailer: bool,
}

impl ServiceSettings {
    /// Load settings, falling back to `default_port` when `HOP_PORT` is unset
    pub fn load(default_port: u16) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", i64::from(default_port))?
            .set_default("breach_check", true)?
            .set_default("booking_reset_schedule", "0 0 0 * * *")?
            .set_default("log_mailer", false)?
            .add_source(Environment::with_prefix("HOP").try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// `host:port` string for `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        unsafe {
            std::env::remove_var("HOP_HOST");
            std::env::remove_var("HOP_PORT");
            std::env::remove_var("HOP_BREACH_CHECK");
            std::env::remove_var("HOP_BOOKING_RESET_SCHEDULE");
            std::env::remove_var("HOP_LOG_MAILER");
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();

        let settings = ServiceSettings::load(3001).unwrap();
        assert_eq!(settings.bind_address(), "0.0.0.0:3001");
        assert!(settings.breach_check);
        assert_eq!(settings.booking_reset_schedule, "0 0 0 * * *");
        assert!(!settings.log_mailer);
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear_env();
        unsafe {
            std::env::set_var("HOP_HOST", "127.0.0.1");
            std::env::set_var("HOP_PORT", "8080");
            std::env::set_var("HOP_BREACH_CHECK", "false");
            std::env::set_var("HOP_LOG_MAILER", "true");
        }

        let settings = ServiceSettings::load(3000).unwrap();
        assert_eq!(settings.bind_address(), "127.0.0.1:8080");
        assert!(!settings.breach_check);
        assert!(settings.log_mailer);

        clear_env();
    }
}
