use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Backend holding the indexer progress (watermark, completed ids and running flag).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateStoreConfig {
    /// Process local store, progress is lost on restart.
    Memory,

    /// Redis store keeping the whole progress as one JSON value under `key`.
    Redis {
        #[serde(default = "default_redis_host")]
        host: String,
        #[serde(default = "default_redis_port")]
        port: u16,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<SecretString>,
        #[serde(default = "default_redis_key")]
        key: String,
    },
}

impl StateStoreConfig {
    pub const DEFAULT_REDIS_HOST: &'static str = "localhost";

    pub const DEFAULT_REDIS_PORT: u16 = 6379;

    pub const DEFAULT_REDIS_KEY: &'static str = "etl:state";

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let StateStoreConfig::Redis { host, key, .. } = self {
            if host.trim().is_empty() {
                return Err(ValidationError::EmptyField("state_store.redis.host"));
            }

            if key.trim().is_empty() {
                return Err(ValidationError::EmptyField("state_store.redis.key"));
            }
        }

        Ok(())
    }
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self::Memory
    }
}

fn default_redis_host() -> String {
    StateStoreConfig::DEFAULT_REDIS_HOST.to_string()
}

fn default_redis_port() -> u16 {
    StateStoreConfig::DEFAULT_REDIS_PORT
}

fn default_redis_key() -> String {
    StateStoreConfig::DEFAULT_REDIS_KEY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_is_parsed_from_plain_string() {
        let config: StateStoreConfig = serde_json::from_str(r#""memory""#).unwrap();

        assert!(matches!(config, StateStoreConfig::Memory));
    }

    #[test]
    fn redis_fields_fall_back_to_defaults() {
        let config: StateStoreConfig =
            serde_json::from_str(r#"{"redis": {"host": "cache"}}"#).unwrap();

        match config {
            StateStoreConfig::Redis {
                host,
                port,
                username,
                password,
                key,
            } => {
                assert_eq!(host, "cache");
                assert_eq!(port, 6379);
                assert!(username.is_none());
                assert!(password.is_none());
                assert_eq!(key, "etl:state");
            }
            StateStoreConfig::Memory => panic!("expected redis configuration"),
        }
    }
}
