use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream, stream::BoxStream};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::source::{ChangeOrigin, Source};
use crate::types::{FilmWorkRow, GenreRow};

#[derive(Debug)]
struct StoredFilmWork {
    row: FilmWorkRow,
    modified: DateTime<Utc>,
}

#[derive(Debug)]
struct StoredPerson {
    modified: DateTime<Utc>,
    film_work_ids: BTreeSet<Uuid>,
}

#[derive(Debug)]
struct StoredGenre {
    row: GenreRow,
    modified: DateTime<Utc>,
    film_work_ids: BTreeSet<Uuid>,
}

#[derive(Debug, Default)]
struct Inner {
    film_works: BTreeMap<Uuid, StoredFilmWork>,
    persons: BTreeMap<Uuid, StoredPerson>,
    genres: BTreeMap<Uuid, StoredGenre>,
    unavailable: bool,
    id_queries: usize,
    film_work_row_requests: Vec<Vec<Uuid>>,
    genre_row_requests: usize,
}

/// In-memory [`Source`] mimicking the `content` schema.
///
/// Records every call so tests can assert which queries a cycle issued, and can be switched
/// to an unavailable mode where every call fails with [`ErrorKind::SourceConnectionFailed`].
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    inner: Arc<Mutex<Inner>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a film work with its `modified` timestamp.
    pub async fn insert_film_work(&self, row: FilmWorkRow, modified: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        inner
            .film_works
            .insert(row.id, StoredFilmWork { row, modified });
    }

    /// Inserts or replaces a person linked to `film_work_ids`.
    pub async fn insert_person(
        &self,
        id: Uuid,
        modified: DateTime<Utc>,
        film_work_ids: impl IntoIterator<Item = Uuid>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.persons.insert(
            id,
            StoredPerson {
                modified,
                film_work_ids: film_work_ids.into_iter().collect(),
            },
        );
    }

    /// Inserts or replaces a genre linked to `film_work_ids`.
    pub async fn insert_genre(
        &self,
        row: GenreRow,
        modified: DateTime<Utc>,
        film_work_ids: impl IntoIterator<Item = Uuid>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.genres.insert(
            row.id,
            StoredGenre {
                row,
                modified,
                film_work_ids: film_work_ids.into_iter().collect(),
            },
        );
    }

    /// Sets the `modified` timestamp of an existing film work, person or genre.
    ///
    /// Returns `false` when no record with `id` exists.
    pub async fn touch(&self, origin: ChangeOrigin, id: Uuid, modified: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().await;
        let slot = match origin {
            ChangeOrigin::FilmWork => inner.film_works.get_mut(&id).map(|fw| &mut fw.modified),
            ChangeOrigin::Person => inner.persons.get_mut(&id).map(|p| &mut p.modified),
            ChangeOrigin::Genre => inner.genres.get_mut(&id).map(|g| &mut g.modified),
        };

        match slot {
            Some(slot) => {
                *slot = modified;
                true
            }
            None => false,
        }
    }

    /// Makes every following call fail as if the database was unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }

    /// Number of id queries issued so far.
    pub async fn id_queries(&self) -> usize {
        self.inner.lock().await.id_queries
    }

    /// Id lists passed to [`Source::film_work_rows`], in call order.
    pub async fn film_work_row_requests(&self) -> Vec<Vec<Uuid>> {
        self.inner.lock().await.film_work_row_requests.clone()
    }

    pub async fn genre_row_requests(&self) -> usize {
        self.inner.lock().await.genre_row_requests
    }

    /// Total number of calls of any kind.
    pub async fn total_calls(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.id_queries + inner.film_work_row_requests.len() + inner.genre_row_requests
    }
}

fn modified_after(modified: DateTime<Utc>, since: Option<DateTime<Utc>>) -> bool {
    since.is_none_or(|since| modified > since)
}

impl Source for MemorySource {
    async fn changed_film_work_ids(
        &self,
        origin: ChangeOrigin,
        since: Option<DateTime<Utc>>,
    ) -> EtlResult<Vec<Uuid>> {
        let mut inner = self.inner.lock().await;
        inner.id_queries += 1;

        if inner.unavailable {
            bail!(
                ErrorKind::SourceConnectionFailed,
                "Source database connection failed",
                "memory source is unavailable"
            );
        }

        let ids = match origin {
            ChangeOrigin::FilmWork => inner
                .film_works
                .iter()
                .filter(|(_, fw)| modified_after(fw.modified, since))
                .map(|(id, _)| *id)
                .collect(),
            ChangeOrigin::Person => inner
                .persons
                .values()
                .filter(|p| modified_after(p.modified, since))
                .flat_map(|p| p.film_work_ids.iter().copied())
                .collect(),
            ChangeOrigin::Genre => inner
                .genres
                .values()
                .filter(|g| modified_after(g.modified, since))
                .flat_map(|g| g.film_work_ids.iter().copied())
                .collect(),
        };

        Ok(ids)
    }

    fn film_work_rows(&self, ids: Vec<Uuid>) -> BoxStream<'_, EtlResult<FilmWorkRow>> {
        let inner = self.inner.clone();

        stream::once(async move {
            let mut inner = inner.lock().await;
            inner.film_work_row_requests.push(ids.clone());

            let rows: Vec<EtlResult<FilmWorkRow>> = if inner.unavailable {
                vec![Err(etl_error!(
                    ErrorKind::SourceConnectionFailed,
                    "Source database connection failed",
                    "memory source is unavailable"
                ))]
            } else {
                let requested: BTreeSet<Uuid> = ids.into_iter().collect();
                requested
                    .iter()
                    .filter_map(|id| inner.film_works.get(id))
                    .map(|fw| Ok(fw.row.clone()))
                    .collect()
            };

            stream::iter(rows)
        })
        .flatten()
        .boxed()
    }

    fn genre_rows(&self) -> BoxStream<'_, EtlResult<GenreRow>> {
        let inner = self.inner.clone();

        stream::once(async move {
            let mut inner = inner.lock().await;
            inner.genre_row_requests += 1;

            let rows: Vec<EtlResult<GenreRow>> = if inner.unavailable {
                vec![Err(etl_error!(
                    ErrorKind::SourceConnectionFailed,
                    "Source database connection failed",
                    "memory source is unavailable"
                ))]
            } else {
                let mut genres: Vec<GenreRow> =
                    inner.genres.values().map(|g| g.row.clone()).collect();
                genres.sort_by(|a, b| a.name.cmp(&b.name));
                genres.into_iter().map(Ok).collect()
            };

            stream::iter(rows)
        })
        .flatten()
        .boxed()
    }
}
