use std::time::Duration;

use fred::prelude::{Client, ClientLike, KeysInterface, ReconnectPolicy, Server, ServerConfig};
use fred::types::Builder;
use serde_json::Value;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::store::state::{StateMap, StateStore};

/// Timeout applied to connection attempts and commands.
const REDIS_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings of [`RedisStateStore`].
#[derive(Debug, Clone)]
pub struct RedisStateStoreConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Key holding the serialized state.
    pub key: String,
}

/// [`StateStore`] keeping the whole state as one JSON string under a single Redis key.
#[derive(Clone)]
pub struct RedisStateStore {
    client: Client,
    key: String,
}

impl RedisStateStore {
    /// Connects to Redis and waits until the connection is usable.
    pub async fn connect(config: RedisStateStoreConfig) -> EtlResult<Self> {
        let RedisStateStoreConfig {
            host,
            port,
            username,
            password,
            key,
        } = config;

        let client = Builder::default_centralized()
            .with_config(|redis_config| {
                redis_config.username = username;
                redis_config.password = password;
                redis_config.server = ServerConfig::Centralized {
                    server: Server::new(host.as_str(), port),
                };
            })
            .with_connection_config(|config| {
                config.connection_timeout = REDIS_TIMEOUT;
                config.internal_command_timeout = REDIS_TIMEOUT;
            })
            .with_performance_config(|config| {
                config.default_command_timeout = REDIS_TIMEOUT;
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 10_000, 2))
            .build()?;

        client.init().await?;
        info!(%host, port, %key, "connected to redis state store");

        Ok(Self { client, key })
    }
}

impl StateStore for RedisStateStore {
    async fn retrieve_state(&self) -> EtlResult<StateMap> {
        let raw: Option<String> = self.client.get(self.key.as_str()).await?;

        let Some(raw) = raw else {
            debug!(key = %self.key, "no state saved yet");
            return Ok(StateMap::new());
        };

        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(state) => Ok(state),
            other => bail!(
                ErrorKind::StateStoreError,
                "Saved state is not a JSON object",
                format!("key `{}` holds {other}", self.key)
            ),
        }
    }

    async fn save_state(&self, state: StateMap) -> EtlResult<()> {
        let payload = serde_json::to_string(&state)?;
        self.client
            .set::<(), _, _>(self.key.as_str(), payload, None, None, false)
            .await?;

        Ok(())
    }
}
