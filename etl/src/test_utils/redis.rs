use uuid::Uuid;

use crate::store::state::redis::{RedisStateStore, RedisStateStoreConfig};

/// Reads the local test Redis server from the environment.
///
/// - `TESTS_REDIS_HOST`: Redis hostname (required)
/// - `TESTS_REDIS_PORT`: Redis port (required)
/// - `TESTS_REDIS_PASSWORD`: password of the default user (optional)
///
/// Every call picks a new state key so tests never share state.
pub fn local_redis_config() -> RedisStateStoreConfig {
    RedisStateStoreConfig {
        host: std::env::var("TESTS_REDIS_HOST").expect("TESTS_REDIS_HOST must be set"),
        port: std::env::var("TESTS_REDIS_PORT")
            .expect("TESTS_REDIS_PORT must be set")
            .parse()
            .expect("TESTS_REDIS_PORT must be a valid port number"),
        username: None,
        password: std::env::var("TESTS_REDIS_PASSWORD").ok(),
        key: format!("etl:test:{}", Uuid::new_v4()),
    }
}

/// Connects a [`RedisStateStore`] to the local test server under a fresh key.
///
/// # Panics
///
/// Panics if the server is unreachable.
pub async fn spawn_redis_state_store() -> (RedisStateStore, RedisStateStoreConfig) {
    let config = local_redis_config();
    let store = RedisStateStore::connect(config.clone())
        .await
        .expect("Failed to connect to the test Redis server");

    (store, config)
}
