use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::EtlResult;
use crate::source::{ChangeOrigin, Source};

/// Returns the film works to synchronize because they, one of their people or one of their
/// genres changed after `since`, minus the ones already in `completed`.
///
/// `None` selects every film work. A failure of any of the three queries fails the whole
/// resolution.
pub async fn resolve<S>(
    source: &S,
    since: Option<DateTime<Utc>>,
    completed: &BTreeSet<Uuid>,
) -> EtlResult<BTreeSet<Uuid>>
where
    S: Source,
{
    let (film_works, persons, genres) = futures::try_join!(
        source.changed_film_work_ids(ChangeOrigin::FilmWork, since),
        source.changed_film_work_ids(ChangeOrigin::Person, since),
        source.changed_film_work_ids(ChangeOrigin::Genre, since),
    )?;

    let changed: BTreeSet<Uuid> = film_works
        .into_iter()
        .chain(persons)
        .chain(genres)
        .collect();
    let changed_count = changed.len();

    let pending: BTreeSet<Uuid> = changed.difference(completed).copied().collect();
    debug!(
        ?since,
        changed = changed_count,
        already_completed = changed_count - pending.len(),
        pending = pending.len(),
        "resolved changed film works"
    );

    Ok(pending)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::source::memory::MemorySource;
    use crate::types::{FilmWorkRow, GenreRow};

    #[tokio::test]
    async fn transitive_changes_are_included() {
        let source = MemorySource::new();
        let t0 = Utc::now() - Duration::hours(2);
        let t1 = t0 + Duration::hours(1);

        let untouched = Uuid::new_v4();
        let through_person = Uuid::new_v4();
        let through_genre = Uuid::new_v4();
        let direct = Uuid::new_v4();
        for id in [untouched, through_person, through_genre] {
            source.insert_film_work(FilmWorkRow::new(id), t0).await;
        }
        source.insert_film_work(FilmWorkRow::new(direct), t1).await;
        source
            .insert_person(Uuid::new_v4(), t1, [through_person])
            .await;
        source
            .insert_genre(
                GenreRow {
                    id: Uuid::new_v4(),
                    name: "Drama".to_string(),
                    description: None,
                },
                t1,
                [through_genre],
            )
            .await;

        let since = t0 + Duration::minutes(30);
        let changed = resolve(&source, Some(since), &BTreeSet::new()).await.unwrap();

        assert_eq!(
            changed,
            BTreeSet::from([through_person, through_genre, direct])
        );
    }

    #[tokio::test]
    async fn completed_ids_are_subtracted() {
        let source = MemorySource::new();
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        source.insert_film_work(FilmWorkRow::new(a), now).await;
        source.insert_film_work(FilmWorkRow::new(b), now).await;

        let changed = resolve(&source, None, &BTreeSet::from([a])).await.unwrap();

        assert_eq!(changed, BTreeSet::from([b]));
    }

    #[tokio::test]
    async fn source_failures_are_not_partial_results() {
        let source = MemorySource::new();
        source
            .insert_film_work(FilmWorkRow::new(Uuid::new_v4()), Utc::now())
            .await;
        source.set_unavailable(true).await;

        let err = resolve(&source, None, &BTreeSet::new()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    }
}
