//! Settings for the `doorward-registry` service.

use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::info;

use crate::secrets::{redact_secrets_in_config, EnvFileSecretProvider, SecretProvider};
use crate::{ConfigError, ConfigManager};

/// Name of the service config file (`<dir>/doorward.json`) and its schema.
pub const SERVICE_CONFIG_NAME: &str = "doorward";

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub timezone: String,
    pub io_timeout_ms: u64,
    pub nats_url: String,
    pub kv_bucket: String,
    #[serde(default)]
    pub nats_creds_path: Option<String>,
    pub jwt_secret: String,
    pub jwt_algorithm: String,
    pub jwt_ttl_hours: u64,
    pub cors_origins: Vec<String>,
    pub debug: bool,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("bind_addr", &self.bind_addr)
            .field("timezone", &self.timezone)
            .field("io_timeout_ms", &self.io_timeout_ms)
            .field("nats_url", &self.nats_url)
            .field("kv_bucket", &self.kv_bucket)
            .field("nats_creds_path", &self.nats_creds_path)
            .field("jwt_secret", &"***")
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_ttl_hours", &self.jwt_ttl_hours)
            .field("cors_origins", &self.cors_origins)
            .field("debug", &self.debug)
            .finish()
    }
}

impl ServiceConfig {
    /// Load from the process environment, the default config directory and
    /// the default secrets sources.
    pub fn from_env() -> Result<Self, ConfigError> {
        let manager = ConfigManager::new();
        let config = manager.load_service(&EnvFileSecretProvider::new(), |name| {
            std::env::var(name).ok()
        })?;

        let mut shown = json!({
            "bindAddr": config.bind_addr,
            "timezone": config.timezone,
            "ioTimeoutMs": config.io_timeout_ms,
            "natsUrl": config.nats_url,
            "kvBucket": config.kv_bucket,
            "natsCredsPath": config.nats_creds_path,
            "jwtSecret": config.jwt_secret,
            "jwtTtlHours": config.jwt_ttl_hours,
            "corsOrigins": config.cors_origins,
            "debug": config.debug,
        });
        redact_secrets_in_config(&mut shown);
        info!(config = %shown, config_dir = ?manager.config_dir(), "Service configuration loaded");

        Ok(config)
    }
}

impl ConfigManager {
    /// File or schema defaults, then environment overrides read through
    /// `env`, then `secret://` resolution, then schema validation.
    pub fn load_service<P, E>(&self, provider: &P, env: E) -> Result<ServiceConfig, ConfigError>
    where
        P: SecretProvider + ?Sized,
        E: Fn(&str) -> Option<String>,
    {
        self.load_layered(SERVICE_CONFIG_NAME, provider, |value| {
            apply_env_overrides(value, env)
        })
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Integer,
    Flag,
    List,
}

/// Environment variable → config field.
const OVERRIDES: &[(&str, &str, Kind)] = &[
    ("DOORWARD_BIND_ADDR", "bindAddr", Kind::Text),
    ("DOORWARD_TIMEZONE", "timezone", Kind::Text),
    ("DOORWARD_IO_TIMEOUT_MS", "ioTimeoutMs", Kind::Integer),
    ("NATS_URL", "natsUrl", Kind::Text),
    ("DOORWARD_KV_BUCKET", "kvBucket", Kind::Text),
    ("NATS_CREDS_PATH", "natsCredsPath", Kind::Text),
    ("JWT_SECRET", "jwtSecret", Kind::Text),
    ("JWT_ALGORITHM", "jwtAlgorithm", Kind::Text),
    ("JWT_TTL_HOURS", "jwtTtlHours", Kind::Integer),
    ("DOORWARD_CORS_ORIGINS", "corsOrigins", Kind::List),
    ("DEBUG", "debug", Kind::Flag),
];

/// Overlay set environment variables onto a config object. Empty values
/// are treated as unset.
pub fn apply_env_overrides<E>(config: &mut Value, env: E) -> Result<(), ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let Value::Object(map) = config else {
        return Err(ConfigError::JsonParsingFailed {
            message: "config root must be an object".to_string(),
        });
    };

    for &(var, field, kind) in OVERRIDES {
        let Some(raw) = env(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
            continue;
        };

        let value = match kind {
            Kind::Text => Value::String(raw),
            Kind::Integer => raw
                .parse::<u64>()
                .map(Value::from)
                .map_err(|e| ConfigError::InvalidEnvOverride {
                    var: var.to_string(),
                    message: e.to_string(),
                })?,
            Kind::Flag => Value::Bool(parse_flag(var, &raw)?),
            Kind::List => Value::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
        };
        map.insert(field.to_string(), value);
    }

    Ok(())
}

fn parse_flag(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvOverride {
            var: var.to_string(),
            message: format!("expected a boolean, got {:?}", other),
        }),
    }
}
