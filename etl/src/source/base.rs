use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::EtlResult;
use crate::types::{FilmWorkRow, GenreRow};

/// Table whose modifications can make a film work document stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeOrigin {
    /// The film work row itself.
    FilmWork,
    /// A person linked to the film work.
    Person,
    /// A genre linked to the film work.
    Genre,
}

impl fmt::Display for ChangeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOrigin::FilmWork => f.write_str("film_work"),
            ChangeOrigin::Person => f.write_str("person"),
            ChangeOrigin::Genre => f.write_str("genre"),
        }
    }
}

/// Read-only access to the relational store holding the catalogue.
///
/// Implementations must not return partial results: a failing query is reported as an error
/// instead of a truncated id list.
pub trait Source {
    /// Returns ids of film works affected by changes of `origin` made after `since`.
    ///
    /// When `since` is `None` every film work reachable through `origin` is returned. Ids may
    /// repeat; callers deduplicate.
    fn changed_film_work_ids(
        &self,
        origin: ChangeOrigin,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = EtlResult<Vec<Uuid>>> + Send;

    /// Streams one denormalized row per existing film work among `ids`.
    fn film_work_rows(&self, ids: Vec<Uuid>) -> BoxStream<'_, EtlResult<FilmWorkRow>>;

    /// Streams every genre.
    fn genre_rows(&self) -> BoxStream<'_, EtlResult<GenreRow>>;
}
