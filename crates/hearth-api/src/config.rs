//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use hearth_session::OrchestratorConfig;

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Everything the server needs to start.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Base URL of the campaign-management service.
    pub campaign_service_url: String,
    /// Base URL of the agent responder.
    pub agent_responder_url: String,
    /// Pool size for the event store.
    pub database_max_connections: u32,
    /// OTLP collector endpoint; span export is off when unset.
    pub otlp_endpoint: Option<String>,
    /// Session engine tuning.
    pub orchestrator: OrchestratorConfig,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("{key} environment variable must be set")))
        };

        let defaults = OrchestratorConfig::default();
        let agent_deadline_secs: u64 =
            parse_or(&lookup, "AGENT_DEADLINE_SECS", defaults.agent_deadline.as_secs())?;
        if agent_deadline_secs == 0 {
            return Err(AppError::Config(
                "AGENT_DEADLINE_SECS must be greater than zero".into(),
            ));
        }
        let subscriber_queue_capacity = parse_or(
            &lookup,
            "SUBSCRIBER_QUEUE_CAPACITY",
            defaults.subscriber_queue_capacity,
        )?;
        let agent_context_events =
            parse_or(&lookup, "AGENT_CONTEXT_EVENTS", defaults.agent_context_events)?;

        let orchestrator = OrchestratorConfig {
            agent_context_events,
            ..defaults
        }
        .with_agent_deadline(Duration::from_secs(agent_deadline_secs))
        .with_subscriber_queue_capacity(subscriber_queue_capacity);

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            host: lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            campaign_service_url: required("CAMPAIGN_SERVICE_URL")?,
            agent_responder_url: required("AGENT_RESPONDER_URL")?,
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_DATABASE_MAX_CONNECTIONS,
            )?,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .filter(|value| !value.trim().is_empty()),
            orchestrator,
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a valid address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}
