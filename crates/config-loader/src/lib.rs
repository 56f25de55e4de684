use jsonschema::{Draft, JSONSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

pub mod secrets;
pub mod service;
pub use secrets::{redact_secrets_in_config, EnvFileSecretProvider, SecretError, SecretProvider};
pub use service::{apply_env_overrides, ServiceConfig, SERVICE_CONFIG_NAME};

/// Schemas compiled into the binary, keyed by config name.
const BUILTIN_SCHEMAS: &[(&str, &str)] = &[(
    SERVICE_CONFIG_NAME,
    include_str!("../schema/doorward-config.v1.json"),
)];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Schema not found for config: {name}")]
    SchemaNotFound { name: String },

    #[error("Config file not found: {path}")]
    ConfigFileNotFound { path: String },

    #[error("Schema compilation failed: {message}")]
    SchemaCompilationFailed { message: String },

    #[error("Config validation failed: {}", summarize(.errors))]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("JSON parsing failed: {message}")]
    JsonParsingFailed { message: String },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("Secret resolution failed: {error}")]
    SecretResolutionFailed { error: SecretError },

    #[error("Invalid value for {var}: {message}")]
    InvalidEnvOverride { var: String, message: String },
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub json_pointer: String,
    pub message: String,
    pub schema_path: String,
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| {
            if e.json_pointer.is_empty() {
                e.message.clone()
            } else {
                format!("{}: {}", e.json_pointer, e.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct ConfigManager {
    config_dir: PathBuf,
    schemas: HashMap<String, Value>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_config_dir(Self::find_config_dir())
    }

    pub fn with_config_dir(config_dir: PathBuf) -> Self {
        Self {
            config_dir,
            schemas: HashMap::new(),
        }
    }

    /// Register (or replace) the schema used for `name`.
    pub fn with_schema(mut self, name: &str, schema: Value) -> Self {
        self.schemas.insert(name.to_string(), schema);
        self
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    fn find_config_dir() -> PathBuf {
        if let Ok(config_dir) = std::env::var("DOORWARD_CONFIG_DIR") {
            PathBuf::from(config_dir)
        } else {
            PathBuf::from(".doorward/config")
        }
    }

    #[instrument(skip(self))]
    pub fn load<T: DeserializeOwned>(&self, name: &str) -> Result<T, ConfigError> {
        self.load_with_secrets(name, &EnvFileSecretProvider::new())
    }

    #[instrument(skip(self, provider))]
    pub fn load_with_secrets<T: DeserializeOwned, P: SecretProvider + ?Sized>(
        &self,
        name: &str,
        provider: &P,
    ) -> Result<T, ConfigError> {
        self.load_layered(name, provider, |_| Ok(()))
    }

    /// Schema defaults, then the config file's top-level keys, then
    /// `overlay`, then secret resolution, then validation, then
    /// deserialization.
    pub fn load_layered<T, P, F>(&self, name: &str, provider: &P, overlay: F) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        P: SecretProvider + ?Sized,
        F: FnOnce(&mut Value) -> Result<(), ConfigError>,
    {
        debug!("Loading config: {}", name);

        let mut config_value = self.load_config_file(name)?;
        overlay(&mut config_value)?;

        secrets::resolve_secrets_in_config(&mut config_value, provider)
            .map_err(|e| ConfigError::SecretResolutionFailed { error: e })?;

        self.validate_config(name, &config_value)?;

        serde_json::from_value(config_value).map_err(|e| ConfigError::JsonParsingFailed {
            message: e.to_string(),
        })
    }

    #[instrument(skip(self))]
    pub fn validate_config_file(&self, name: &str, config_path: &Path) -> Result<(), ConfigError> {
        self.validate_config_file_with_secrets(name, config_path, &EnvFileSecretProvider::new())
    }

    #[instrument(skip(self, provider))]
    pub fn validate_config_file_with_secrets<P: SecretProvider + ?Sized>(
        &self,
        name: &str,
        config_path: &Path,
        provider: &P,
    ) -> Result<(), ConfigError> {
        debug!("Validating config file: {:?} as {}", config_path, name);

        if !config_path.exists() {
            return Err(ConfigError::ConfigFileNotFound {
                path: config_path.to_string_lossy().to_string(),
            });
        }

        let mut config_value = read_json(config_path)?;

        secrets::resolve_secrets_in_config(&mut config_value, provider)
            .map_err(|e| ConfigError::SecretResolutionFailed { error: e })?;

        self.validate_config(name, &config_value)
    }

    fn load_config_file(&self, name: &str) -> Result<Value, ConfigError> {
        let config_path = self.config_dir.join(format!("{}.json", name));

        debug!("Loading config from: {:?}", config_path);

        let mut config = self.load_default_config(name)?;
        if !config_path.exists() {
            debug!("Config file not found, using defaults from schema");
            return Ok(config);
        }

        match read_json(&config_path)? {
            Value::Object(file) => {
                if let Value::Object(defaults) = &mut config {
                    defaults.extend(file);
                }
                Ok(config)
            }
            // non-object files are left for schema validation to reject
            other => Ok(other),
        }
    }

    /// Top-level `default` values of the schema. Required properties without a
    /// default are left for overrides to fill; validation runs afterwards.
    fn load_default_config(&self, name: &str) -> Result<Value, ConfigError> {
        let schema_value = self.schema_value(name)?;

        let mut default_config = serde_json::Map::new();
        if let Some(properties) = schema_value.get("properties").and_then(|p| p.as_object()) {
            for (key, property) in properties {
                if let Some(default_value) = property.get("default") {
                    default_config.insert(key.clone(), default_value.clone());
                }
            }
        }

        let default_config_value = Value::Object(default_config);
        debug!("Loaded default config: {}", default_config_value);
        Ok(default_config_value)
    }

    fn validate_config(&self, name: &str, config: &Value) -> Result<(), ConfigError> {
        let schema_value = self.schema_value(name)?;
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_value)
            .map_err(|e| ConfigError::SchemaCompilationFailed {
                message: e.to_string(),
            })?;

        if let Err(errors) = schema.validate(config) {
            let validation_errors: Vec<ValidationError> = errors
                .map(|error| ValidationError {
                    json_pointer: error.instance_path.to_string(),
                    message: error.to_string(),
                    schema_path: error.schema_path.to_string(),
                })
                .collect();

            return Err(ConfigError::ValidationFailed {
                errors: validation_errors,
            });
        }

        Ok(())
    }

    fn schema_value(&self, name: &str) -> Result<Value, ConfigError> {
        if let Some(schema) = self.schemas.get(name) {
            return Ok(schema.clone());
        }

        let raw = BUILTIN_SCHEMAS
            .iter()
            .find(|(builtin, _)| *builtin == name)
            .map(|(_, raw)| *raw)
            .ok_or_else(|| ConfigError::SchemaNotFound {
                name: name.to_string(),
            })?;

        serde_json::from_str(raw).map_err(|e| ConfigError::SchemaCompilationFailed {
            message: e.to_string(),
        })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        message: format!("Failed to read config file: {}", e),
    })?;

    serde_json::from_str(&content).map_err(|e| ConfigError::JsonParsingFailed {
        message: e.to_string(),
    })
}
