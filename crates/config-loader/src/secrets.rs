use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

static SECRET_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^secret://([^/]+)/(.+)$").expect("secret uri pattern"));

const SENSITIVE_KEY_PARTS: &[&str] = &["password", "secret", "token", "creds"];

#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Secret not found: {scope}/{key}")]
    SecretNotFound { scope: String, key: String },

    #[error("Failed to read secrets file: {path} - {message}")]
    SecretsFileError { path: String, message: String },

    #[error("Failed to parse secrets file: {message}")]
    SecretsParseError { message: String },
}

pub trait SecretProvider: Send + Sync {
    fn resolve(&self, scope: &str, key: &str) -> Result<String, SecretError>;
}

/// Resolves `scope/key` from `SECRET_<SCOPE>_<KEY>`, then from a JSON file of
/// `{ "scope": { "key": "value" } }`.
pub struct EnvFileSecretProvider {
    secrets_file_path: Option<PathBuf>,
    cached_secrets: OnceCell<HashMap<String, HashMap<String, String>>>,
}

impl EnvFileSecretProvider {
    pub fn new() -> Self {
        let secrets_file_path = env::var("DOORWARD_SECRETS_FILE")
            .map(PathBuf::from)
            .ok()
            .or_else(|| {
                let default_path = PathBuf::from(".doorward/secrets.json");
                default_path.exists().then_some(default_path)
            });

        Self {
            secrets_file_path,
            cached_secrets: OnceCell::new(),
        }
    }

    pub fn with_secrets_file<P: Into<PathBuf>>(secrets_file_path: P) -> Self {
        Self {
            secrets_file_path: Some(secrets_file_path.into()),
            cached_secrets: OnceCell::new(),
        }
    }

    fn load_secrets_from_file(
        &self,
    ) -> Result<HashMap<String, HashMap<String, String>>, SecretError> {
        let Some(ref path) = self.secrets_file_path else {
            return Ok(HashMap::new());
        };

        debug!("Loading secrets from file: {:?}", path);

        let content = fs::read_to_string(path).map_err(|e| SecretError::SecretsFileError {
            path: path.to_string_lossy().to_string(),
            message: e.to_string(),
        })?;

        let parsed: Value =
            serde_json::from_str(&content).map_err(|e| SecretError::SecretsParseError {
                message: e.to_string(),
            })?;

        let mut secrets = HashMap::new();
        for (scope, scope_value) in parsed.as_object().into_iter().flatten() {
            let Some(scope_obj) = scope_value.as_object() else {
                continue;
            };
            let mut scope_secrets = HashMap::new();
            for (key, value) in scope_obj {
                match value.as_str() {
                    Some(s) => {
                        scope_secrets.insert(key.clone(), s.to_string());
                    }
                    // never log the value
                    None => warn!("Non-string value in secrets file for {}/{}", scope, key),
                }
            }
            secrets.insert(scope.clone(), scope_secrets);
        }

        Ok(secrets)
    }

    fn get_cached_secrets(&self) -> &HashMap<String, HashMap<String, String>> {
        self.cached_secrets.get_or_init(|| {
            self.load_secrets_from_file().unwrap_or_else(|e| {
                warn!("Failed to load secrets from file: {}", e);
                HashMap::new()
            })
        })
    }
}

impl SecretProvider for EnvFileSecretProvider {
    fn resolve(&self, scope: &str, key: &str) -> Result<String, SecretError> {
        let env_var_name = format!("SECRET_{}_{}", scope.to_uppercase(), key.to_uppercase());

        if let Ok(value) = env::var(&env_var_name) {
            debug!(
                "Resolved secret {}/{} from environment variable {}",
                scope, key, env_var_name
            );
            return Ok(value);
        }

        if let Some(value) = self
            .get_cached_secrets()
            .get(scope)
            .and_then(|scope_secrets| scope_secrets.get(key))
        {
            debug!("Resolved secret {}/{} from secrets file", scope, key);
            return Ok(value.clone());
        }

        Err(SecretError::SecretNotFound {
            scope: scope.to_string(),
            key: key.to_string(),
        })
    }
}

impl Default for EnvFileSecretProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Replace every `secret://scope/key` string in `config` with its value.
pub fn resolve_secrets_in_config<P: SecretProvider + ?Sized>(
    config: &mut Value,
    provider: &P,
) -> Result<(), SecretError> {
    match config {
        Value::String(s) => {
            let reference = SECRET_URI
                .captures(s)
                .and_then(|c| Some((c.get(1)?.as_str().to_string(), c.get(2)?.as_str().to_string())));
            if let Some((scope, key)) = reference {
                *s = provider.resolve(&scope, &key)?;
            }
        }
        Value::Object(obj) => {
            for v in obj.values_mut() {
                resolve_secrets_in_config(v, provider)?;
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                resolve_secrets_in_config(item, provider)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Mask values under sensitive-looking keys so a config can be logged.
pub fn redact_secrets_in_config(config: &mut Value) {
    match config {
        Value::Object(obj) => {
            for (key, v) in obj.iter_mut() {
                let lowered = key.to_lowercase();
                if SENSITIVE_KEY_PARTS.iter().any(|part| lowered.contains(part)) {
                    if let Value::String(s) = v {
                        *s = "***".to_string();
                    }
                } else {
                    redact_secrets_in_config(v);
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                redact_secrets_in_config(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_env_secret_resolution() {
        env::set_var("SECRET_JWT_SIGNING", "env_secret_value");

        let provider = EnvFileSecretProvider::new();
        assert_eq!(provider.resolve("jwt", "signing").unwrap(), "env_secret_value");

        env::remove_var("SECRET_JWT_SIGNING");
    }

    #[test]
    #[serial]
    fn test_file_secret_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let secrets_file = temp_dir.path().join("secrets.json");
        fs::write(
            &secrets_file,
            json!({ "jwt": { "signing": "file_secret_value", "rotation": 3 } }).to_string(),
        )
        .unwrap();

        let provider = EnvFileSecretProvider::with_secrets_file(&secrets_file);
        assert_eq!(provider.resolve("jwt", "signing").unwrap(), "file_secret_value");
        // non-string values are skipped
        assert!(matches!(
            provider.resolve("jwt", "rotation"),
            Err(SecretError::SecretNotFound { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_env_takes_precedence_over_file() {
        let temp_dir = TempDir::new().unwrap();
        let secrets_file = temp_dir.path().join("secrets.json");
        fs::write(&secrets_file, r#"{ "nats": { "token": "from_file" } }"#).unwrap();
        env::set_var("SECRET_NATS_TOKEN", "from_env");

        let provider = EnvFileSecretProvider::with_secrets_file(&secrets_file);
        assert_eq!(provider.resolve("nats", "token").unwrap(), "from_env");

        env::remove_var("SECRET_NATS_TOKEN");
    }

    #[test]
    #[serial]
    fn test_resolve_secrets_in_config() {
        env::set_var("SECRET_JWT_SIGNING", "resolved_signing_key");

        let provider = EnvFileSecretProvider::with_secrets_file("/nonexistent/secrets.json");
        let mut config = json!({
            "jwtSecret": "secret://jwt/signing",
            "corsOrigins": ["http://localhost:5173", "secret://cors/extra"]
        });

        // cors/extra is not defined anywhere
        assert!(resolve_secrets_in_config(&mut config, &provider).is_err());

        env::set_var("SECRET_CORS_EXTRA", "https://admin.example.edu");
        resolve_secrets_in_config(&mut config, &provider).unwrap();

        assert_eq!(config["jwtSecret"], "resolved_signing_key");
        assert_eq!(config["corsOrigins"][1], "https://admin.example.edu");

        env::remove_var("SECRET_JWT_SIGNING");
        env::remove_var("SECRET_CORS_EXTRA");
    }

    #[test]
    fn test_redact_secrets_in_config() {
        let mut config = json!({
            "bindAddr": "0.0.0.0:8080",
            "jwtSecret": "actual-signing-key-material",
            "natsCredsPath": "/etc/nats/doorward.creds",
            "corsOrigins": ["http://localhost:5173"]
        });

        redact_secrets_in_config(&mut config);

        assert_eq!(config["jwtSecret"], "***");
        assert_eq!(config["natsCredsPath"], "***");
        assert_eq!(config["bindAddr"], "0.0.0.0:8080");
        assert_eq!(config["corsOrigins"][0], "http://localhost:5173");
    }
}
