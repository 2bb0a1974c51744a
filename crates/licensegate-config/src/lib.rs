use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TENANT_ID_ENV: &str = "LICENSEGATE_TENANT_ID";
pub const CLIENT_ID_ENV: &str = "LICENSEGATE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "LICENSEGATE_CLIENT_SECRET";
pub const DEEP_LINK_ENV: &str = "LICENSEGATE_DEEP_LINK";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub catalog: Catalog,
    pub notify: Notify,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub csv_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notify {
    pub authority_url: String,
    pub graph_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub deep_link_prefix: String,
    pub fallback_deep_link: String,
}

fn default_scope() -> String {
    "https://graph.microsoft.com/.default".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// OAuth client-credential secrets. Absent values surface when a notification is attempted.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub deep_link: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            tenant_id: env_value(TENANT_ID_ENV),
            client_id: env_value(CLIENT_ID_ENV),
            client_secret: env_value(CLIENT_SECRET_ENV),
            deep_link: env_value(DEEP_LINK_ENV),
        }
    }
}

/// Where the notification dispatcher reads its secrets from.
#[derive(Debug, Clone)]
pub enum SecretSource {
    Env,
    Fixed(Secrets),
}

impl SecretSource {
    pub fn resolve(&self) -> Secrets {
        match self {
            SecretSource::Env => Secrets::from_env(),
            SecretSource::Fixed(secrets) => secrets.clone(),
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

pub fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.catalog.csv_path.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "catalog.csv_path must not be empty".to_string(),
        ));
    }
    if cfg.notify.timeout_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "notify.timeout_ms must be >= 1".to_string(),
        ));
    }
    if cfg.notify.deep_link_prefix.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "notify.deep_link_prefix must not be empty".to_string(),
        ));
    }
    if !cfg
        .notify
        .fallback_deep_link
        .starts_with(&cfg.notify.deep_link_prefix)
    {
        return Err(ConfigError::UnsupportedConfig(format!(
            "notify.fallback_deep_link must start with {}",
            cfg.notify.deep_link_prefix
        )));
    }
    for (key, url) in [
        ("notify.authority_url", &cfg.notify.authority_url),
        ("notify.graph_url", &cfg.notify.graph_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::UnsupportedConfig(format!(
                "{key} must be an http(s) url"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(contents: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("licensegate-config-test-{nanos}.yaml"));
        std::fs::write(&path, contents).expect("write temp config");
        path.to_string_lossy().to_string()
    }

    fn base_yaml() -> String {
        r#"
server:
  listen_addr: "127.0.0.1:0"

catalog:
  csv_path: "./data/master_software_list.csv"

notify:
  authority_url: "https://login.microsoftonline.com"
  graph_url: "https://graph.microsoft.com/v1.0"
  timeout_ms: 10000
  deep_link_prefix: "https://teams.microsoft.com/l/"
  fallback_deep_link: "https://teams.microsoft.com/l/entity/license-portal/requests"
"#
        .to_string()
    }

    #[test]
    fn loads_base_config_with_defaults() {
        let path = write_temp_config(&base_yaml());
        let cfg = load_and_validate(&path).expect("base config should be accepted");
        assert_eq!(cfg.catalog.csv_path, "./data/master_software_list.csv");
        assert_eq!(cfg.notify.timeout_ms, 10_000);
        assert_eq!(cfg.notify.scope, "https://graph.microsoft.com/.default");
    }

    #[test]
    fn timeout_defaults_when_omitted() {
        let path = write_temp_config(&base_yaml().replace("  timeout_ms: 10000\n", ""));
        let cfg = load_and_validate(&path).expect("config without timeout should be accepted");
        assert_eq!(cfg.notify.timeout_ms, 10_000);
    }

    #[test]
    fn rejects_fallback_outside_prefix() {
        let path = write_temp_config(&base_yaml().replace(
            "fallback_deep_link: \"https://teams.microsoft.com/l/entity/license-portal/requests\"",
            "fallback_deep_link: \"https://evil.example.com/\"",
        ));
        let err = load_and_validate(&path).expect_err("expected unsupported config");
        assert!(matches!(err, ConfigError::UnsupportedConfig(_)));
    }

    #[test]
    fn rejects_zero_timeout() {
        let path = write_temp_config(&base_yaml().replace("timeout_ms: 10000", "timeout_ms: 0"));
        let err = load_and_validate(&path).expect_err("expected unsupported config");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::UnsupportedConfig(_)
        ));
    }

    #[test]
    fn rejects_missing_catalog_section() {
        let path = write_temp_config(
            &base_yaml().replace("catalog:\n  csv_path: \"./data/master_software_list.csv\"\n", ""),
        );
        let err = load_and_validate(&path).expect_err("expected schema failure");
        assert!(matches!(
            err,
            ConfigError::SchemaValidation(_) | ConfigError::Parse(_)
        ));
    }

    #[test]
    fn fixed_secret_source_resolves_verbatim() {
        let source = SecretSource::Fixed(Secrets {
            tenant_id: Some("t".to_string()),
            client_id: None,
            client_secret: Some("s".to_string()),
            deep_link: None,
        });
        let secrets = source.resolve();
        assert_eq!(secrets.tenant_id.as_deref(), Some("t"));
        assert!(secrets.client_id.is_none());
    }
}
