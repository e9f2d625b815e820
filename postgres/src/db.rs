use std::time::Duration;

use indexer_config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::{
    PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};

/// Upper bound for waiting on a free connection from the pool.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds a small pool for the source database.
///
/// Connections are opened lazily on first use so the process can start while the database is
/// still unreachable; the first failing query then surfaces as a connection error.
pub fn connect_to_source_database(config: &PgConnectionConfig) -> PgPool {
    let options: PgConnectOptions = config.with_db();

    PgPoolOptions::new()
        .min_connections(0)
        .max_connections(2)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_lazy_with(options)
}
