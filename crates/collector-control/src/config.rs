use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access::AccessPattern;
use crate::static_config::{StaticConfigItem, STATIC_CONFIG_TABLE};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    values: BTreeMap<String, String>,
}

impl SystemConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_string(&self, key: &str) -> String {
        self.get(key)
            .map(str::to_string)
            .or_else(|| default_value(key).map(str::to_string))
            .unwrap_or_default()
    }

    pub fn get_number(&self, key: &str) -> i64 {
        self.get(key)
            .or_else(|| default_value(key))
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .or_else(|| default_value(key))
            .and_then(parse_bool)
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("type mismatch for key {0}: expected {1}")]
    TypeMismatch(String, String),
    #[error("invalid allowed address pattern: {0}")]
    InvalidPattern(String),
}

pub struct SystemConfigLoader;

impl SystemConfigLoader {
    pub fn from_str(input: &str) -> Result<SystemConfig, ConfigError> {
        let root: toml::Table =
            toml::from_str(input).map_err(|err| ConfigError::Parse(err.to_string()))?;

        let mut values = BTreeMap::new();
        let mut pending: Vec<(String, &toml::Value)> = root
            .iter()
            .map(|(key, value)| (key.clone(), value))
            .collect();

        while let Some((key, value)) = pending.pop() {
            let (raw, kind) = match value {
                toml::Value::Table(table) => {
                    for (nested_key, nested) in table {
                        pending.push((format!("{key}.{nested_key}"), nested));
                    }
                    continue;
                }
                toml::Value::String(text) => (text.clone(), "string"),
                toml::Value::Integer(number) => (number.to_string(), "number"),
                toml::Value::Float(number) => (number.to_string(), "number"),
                toml::Value::Boolean(flag) => (flag.to_string(), "boolean"),
                _ => {
                    return Err(ConfigError::TypeMismatch(
                        key,
                        "string|number|boolean".to_string(),
                    ))
                }
            };
            let item = config_item(&key).ok_or_else(|| ConfigError::UnknownKey(key.clone()))?;
            if item.value_type != kind {
                return Err(ConfigError::TypeMismatch(key, item.value_type.to_string()));
            }
            values.insert(key, raw);
        }

        Ok(SystemConfig { values })
    }
}

#[derive(Clone, Debug)]
pub struct CollectorSettings {
    pub allowed_addr_pattern: Option<AccessPattern>,
    pub timeout: Duration,
    pub monitoring_path: String,
    pub user_agent: String,
    pub resolution: Option<Duration>,
    pub history_limit: usize,
    pub applications_path: Option<String>,
    pub log_requests: bool,
}

impl CollectorSettings {
    pub fn from_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        let pattern = config.get_string("security.allowed_addr_pattern");
        let allowed_addr_pattern = if pattern.trim().is_empty() {
            None
        } else {
            let compiled = AccessPattern::new(&pattern)
                .map_err(|err| ConfigError::InvalidPattern(err.to_string()))?;
            Some(compiled)
        };

        let timeout_ms = config.get_number("collector.timeout_ms");
        let timeout_ms = if timeout_ms <= 0 { 10_000 } else { timeout_ms as u64 };

        let resolution_seconds = config.get_number("collector.resolution_seconds");
        let resolution = (resolution_seconds > 0)
            .then(|| Duration::from_secs(resolution_seconds as u64));

        let applications_path = config.get_string("storage.applications_path");
        let applications_path = if applications_path.trim().is_empty() {
            None
        } else {
            Some(applications_path)
        };

        Ok(Self {
            allowed_addr_pattern,
            timeout: Duration::from_millis(timeout_ms),
            monitoring_path: config.get_string("collector.monitoring_path"),
            user_agent: config.get_string("collector.user_agent"),
            resolution,
            history_limit: config.get_number("collector.history_limit").max(0) as usize,
            applications_path,
            log_requests: config.get_bool("log.requests"),
        })
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self::from_config(&SystemConfig::default()).unwrap_or(Self {
            allowed_addr_pattern: None,
            timeout: Duration::from_millis(10_000),
            monitoring_path: "/monitoring".to_string(),
            user_agent: "monitoring-collector".to_string(),
            resolution: Some(Duration::from_secs(60)),
            history_limit: 120,
            applications_path: None,
            log_requests: false,
        })
    }
}

fn config_item(key: &str) -> Option<&'static StaticConfigItem> {
    STATIC_CONFIG_TABLE.iter().find(|item| item.key == key)
}

fn default_value(key: &str) -> Option<&'static str> {
    config_item(key).map(|item| item.default_value)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
