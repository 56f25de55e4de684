use config_loader::{
    ConfigError, ConfigManager, EnvFileSecretProvider, ServiceConfig, SERVICE_CONFIG_NAME,
};
use serial_test::serial;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

const SIGNING_KEY: &str = "0123456789abcdef0123456789abcdef";

fn setup() -> (TempDir, ConfigManager, EnvFileSecretProvider) {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let secrets_file = temp_dir.path().join("secrets.json");
    fs::write(
        &secrets_file,
        format!(r#"{{ "jwt": {{ "signing": "{}" }} }}"#, SIGNING_KEY),
    )
    .unwrap();

    let manager = ConfigManager::with_config_dir(config_dir);
    let provider = EnvFileSecretProvider::with_secrets_file(secrets_file);
    (temp_dir, manager, provider)
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn given_no_file_and_jwt_secret_in_env_when_load_then_schema_defaults_apply() {
    let (_tmp, manager, provider) = setup();

    let config = manager
        .load_service(&provider, env_of(&[("JWT_SECRET", SIGNING_KEY)]))
        .unwrap();

    assert_eq!(config.bind_addr, "0.0.0.0:8080");
    assert_eq!(config.timezone, "Asia/Almaty");
    assert_eq!(config.io_timeout_ms, 3000);
    assert_eq!(config.kv_bucket, "doorward");
    assert_eq!(config.jwt_algorithm, "HS256");
    assert_eq!(config.jwt_ttl_hours, 72);
    assert_eq!(config.cors_origins, vec!["http://localhost:5173".to_string()]);
    assert!(!config.debug);
    assert_eq!(config.nats_creds_path, None);
}

#[test]
fn given_no_jwt_secret_anywhere_when_load_then_validation_names_the_field() {
    let (_tmp, manager, provider) = setup();

    let err = manager.load_service(&provider, env_of(&[])).unwrap_err();

    match err {
        ConfigError::ValidationFailed { errors } => {
            assert!(errors.iter().any(|e| e.message.contains("jwtSecret")));
        }
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn given_file_and_env_when_load_then_env_wins() {
    let (_tmp, manager, provider) = setup();
    fs::write(
        manager.config_dir().join("doorward.json"),
        r#"{
            "bindAddr": "127.0.0.1:9000",
            "timezone": "Europe/Berlin",
            "ioTimeoutMs": 1500,
            "kvBucket": "campus",
            "jwtSecret": "secret://jwt/signing"
        }"#,
    )
    .unwrap();

    let config = manager
        .load_service(
            &provider,
            env_of(&[("DOORWARD_TIMEZONE", "Asia/Almaty"), ("DEBUG", "1")]),
        )
        .unwrap();

    assert_eq!(config.bind_addr, "127.0.0.1:9000");
    assert_eq!(config.timezone, "Asia/Almaty");
    assert_eq!(config.io_timeout_ms, 1500);
    assert_eq!(config.kv_bucket, "campus");
    assert_eq!(config.jwt_secret, SIGNING_KEY);
    assert!(config.debug);
}

#[test]
fn given_short_jwt_secret_when_load_then_validation_error() {
    let (_tmp, manager, provider) = setup();

    let result = manager.load_service(&provider, env_of(&[("JWT_SECRET", "short")]));
    assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
}

#[test]
fn given_unresolvable_secret_reference_when_load_then_secret_error() {
    let (_tmp, manager, provider) = setup();

    let result = manager.load_service(
        &provider,
        env_of(&[("JWT_SECRET", "secret://jwt/missing")]),
    );
    assert!(matches!(
        result,
        Err(ConfigError::SecretResolutionFailed { .. })
    ));
}

#[test]
fn given_invalid_file_values_when_validate_config_file_then_each_error_reported() {
    let (_tmp, manager, provider) = setup();
    let path = manager.config_dir().join("candidate.json");
    fs::write(
        &path,
        r#"{
            "bindAddr": "0.0.0.0:8080",
            "timezone": "Asia/Almaty",
            "ioTimeoutMs": 0,
            "kvBucket": "has spaces",
            "jwtSecret": "secret://jwt/signing",
            "jwtAlgorithm": "RS256",
            "unknownSetting": true
        }"#,
    )
    .unwrap();

    let result = manager.validate_config_file_with_secrets(SERVICE_CONFIG_NAME, &path, &provider);
    match result {
        Err(ConfigError::ValidationFailed { errors }) => assert!(errors.len() >= 4),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
fn given_missing_file_when_validate_config_file_then_file_not_found() {
    let (_tmp, manager, _provider) = setup();
    let result =
        manager.validate_config_file(SERVICE_CONFIG_NAME, &manager.config_dir().join("nope.json"));
    assert!(matches!(result, Err(ConfigError::ConfigFileNotFound { .. })));
}

#[test]
fn given_malformed_json_when_load_then_parsing_error() {
    let (_tmp, manager, provider) = setup();
    fs::write(manager.config_dir().join("doorward.json"), "{ not json").unwrap();

    let result = manager.load_service(&provider, env_of(&[]));
    assert!(matches!(result, Err(ConfigError::JsonParsingFailed { .. })));
}

#[test]
fn given_broken_custom_schema_when_load_then_compilation_failed() {
    let (_tmp, manager, _provider) = setup();
    let manager = manager.with_schema(
        "bad",
        serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": { "field": { "type": "invalid_type" } }
        }),
    );
    fs::write(manager.config_dir().join("bad.json"), r#"{"field": "value"}"#).unwrap();

    let result: Result<serde_json::Value, ConfigError> = manager.load("bad");
    assert!(matches!(
        result,
        Err(ConfigError::SchemaCompilationFailed { .. })
    ));
}

#[test]
#[serial]
fn given_process_environment_when_from_env_then_config_dir_and_overrides_are_read() {
    let (tmp, _manager, _provider) = setup();
    let config_dir = tmp.path().join("config");
    fs::write(
        config_dir.join("doorward.json"),
        r#"{
            "bindAddr": "127.0.0.1:7000",
            "timezone": "Asia/Almaty",
            "ioTimeoutMs": 3000,
            "kvBucket": "doorward"
        }"#,
    )
    .unwrap();

    std::env::set_var("DOORWARD_CONFIG_DIR", &config_dir);
    std::env::set_var("JWT_SECRET", SIGNING_KEY);
    std::env::set_var("JWT_TTL_HOURS", "12");

    let result = ServiceConfig::from_env();

    std::env::remove_var("DOORWARD_CONFIG_DIR");
    std::env::remove_var("JWT_SECRET");
    std::env::remove_var("JWT_TTL_HOURS");

    let config = result.unwrap();
    assert_eq!(config.bind_addr, "127.0.0.1:7000");
    assert_eq!(config.jwt_ttl_hours, 12);
    assert_eq!(config.jwt_secret, SIGNING_KEY);
}
