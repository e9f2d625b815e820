use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream::BoxStream};
use indexer_config::shared::PgConnectionConfig;
use postgres::content;
use postgres::db::connect_to_source_database;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EtlError, EtlResult};
use crate::source::{ChangeOrigin, Source};
use crate::types::{FilmWorkRow, GenreRow};

/// [`Source`] reading the `content` schema of a Postgres database.
///
/// Cloning is cheap, clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    /// Creates a source whose connections are opened on first use.
    pub fn new(config: &PgConnectionConfig) -> Self {
        Self {
            pool: connect_to_source_database(config),
        }
    }
}

impl Source for PgSource {
    async fn changed_film_work_ids(
        &self,
        origin: ChangeOrigin,
        since: Option<DateTime<Utc>>,
    ) -> EtlResult<Vec<Uuid>> {
        let ids = match origin {
            ChangeOrigin::FilmWork => {
                content::film_work_ids_modified_since(&self.pool, since).await?
            }
            ChangeOrigin::Person => {
                content::film_work_ids_by_modified_persons(&self.pool, since).await?
            }
            ChangeOrigin::Genre => {
                content::film_work_ids_by_modified_genres(&self.pool, since).await?
            }
        };

        debug!(%origin, ?since, count = ids.len(), "fetched changed film work ids");

        Ok(ids)
    }

    fn film_work_rows(&self, ids: Vec<Uuid>) -> BoxStream<'_, EtlResult<FilmWorkRow>> {
        content::film_work_rows(&self.pool, ids)
            .map_err(EtlError::from)
            .boxed()
    }

    fn genre_rows(&self) -> BoxStream<'_, EtlResult<GenreRow>> {
        content::genre_rows(&self.pool)
            .map_err(EtlError::from)
            .boxed()
    }
}
