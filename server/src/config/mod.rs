use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;

pub use cors::create_cors_layer;

const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Which authority this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    Event,
    Ticket,
    Booking,
    /// All three authorities in one process, wired to each other directly.
    All,
}

impl ServiceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceRole::Event => "event",
            ServiceRole::Ticket => "ticket",
            ServiceRole::Booking => "booking",
            ServiceRole::All => "all",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            ServiceRole::Event => 4001,
            ServiceRole::Ticket => 4002,
            ServiceRole::Booking => 4003,
            ServiceRole::All => 4000,
        }
    }
}

impl FromStr for ServiceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" => Ok(ServiceRole::Event),
            "ticket" => Ok(ServiceRole::Ticket),
            "booking" => Ok(ServiceRole::Booking),
            "all" => Ok(ServiceRole::All),
            other => Err(format!(
                "unknown role '{other}', expected event, ticket, booking or all"
            )),
        }
    }
}

impl Display for ServiceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub role: ServiceRole,
    pub host: String,
    pub port: u16,
    /// Unset means in-memory stores.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub event_service_url: String,
    pub ticket_service_url: String,
    pub schedule_authority_url: String,
    pub remote_timeout: Duration,
    pub schedule_timeout: Duration,
    pub reconcile_interval: Duration,
    pub cors_allowed_origins: Vec<String>,
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                value: value.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs: u64 = parsed(lookup, name, default)?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn text(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let role: ServiceRole = parsed(&lookup, "SERVICE_ROLE", ServiceRole::All)?;

        Ok(Self {
            role,
            host: text(&lookup, "HOST", "0.0.0.0"),
            port: parsed(&lookup, "PORT", role.default_port())?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 5)?,
            jwt_secret: text(&lookup, "JWT_SECRET_KEY", "dev-secret-123"),
            event_service_url: text(&lookup, "EVENT_SERVICE_URL", "http://localhost:4001/rpc"),
            ticket_service_url: text(&lookup, "TICKET_SERVICE_URL", "http://localhost:4002/rpc"),
            schedule_authority_url: text(
                &lookup,
                "SCHEDULE_AUTHORITY_URL",
                "http://localhost:4010/graphql",
            ),
            remote_timeout: seconds(&lookup, "REMOTE_TIMEOUT_SECS", 5)?,
            schedule_timeout: seconds(&lookup, "SCHEDULE_TIMEOUT_SECS", 10)?,
            reconcile_interval: seconds(&lookup, "RECONCILE_INTERVAL_SECS", 60)?,
            cors_allowed_origins: text(&lookup, "CORS_ALLOWED_ORIGINS", DEFAULT_ALLOWED_ORIGINS)
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.role, ServiceRole::All);
        assert_eq!(config.port, 4000);
        assert!(config.database_url.is_none());
        assert_eq!(config.remote_timeout, Duration::from_secs(5));
        assert_eq!(config.schedule_timeout, Duration::from_secs(10));
        assert_eq!(config.cors_allowed_origins.len(), 2);
    }

    #[test]
    fn test_role_selects_port() {
        let config = load(&[("SERVICE_ROLE", "Booking")]).unwrap();
        assert_eq!(config.role, ServiceRole::Booking);
        assert_eq!(config.bind_address(), "0.0.0.0:4003");

        let config = load(&[("SERVICE_ROLE", "ticket"), ("PORT", "9000")]).unwrap();
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_bad_values_name_the_variable() {
        let err = load(&[("SERVICE_ROLE", "gateway")]).unwrap_err();
        assert!(err.to_string().contains("SERVICE_ROLE"));

        let err = load(&[("REMOTE_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("REMOTE_TIMEOUT_SECS"));

        assert!(load(&[("RECONCILE_INTERVAL_SECS", "0")]).is_err());
    }
}
