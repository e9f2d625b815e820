use std::collections::BTreeSet;

use futures::stream::{self, BoxStream, TryChunksError};
use futures::{StreamExt, TryStreamExt};
use tracing::info;
use uuid::Uuid;

use crate::error::EtlResult;
use crate::source::Source;
use crate::types::{FilmWorkRow, GenreRow};

/// Streams the denormalized rows of `ids` in chunks of at most `chunk_size` rows.
///
/// The rows come from a single forward-only query and every chunk is yielded as soon as it is
/// full. Empty `ids` produce an empty stream without querying the source.
pub fn extract_film_works<S>(
    source: &S,
    ids: BTreeSet<Uuid>,
    chunk_size: usize,
) -> BoxStream<'_, EtlResult<Vec<FilmWorkRow>>>
where
    S: Source,
{
    if ids.is_empty() {
        info!("no data to update");
        return stream::empty().boxed();
    }

    let total = ids.len();
    let mut extracted = 0;

    source
        .film_work_rows(ids.into_iter().collect())
        .try_chunks(chunk_size.max(1))
        .map_err(|TryChunksError(_, err)| err)
        .inspect_ok(move |chunk| {
            extracted += chunk.len();
            info!(extracted, total, "extracted film work chunk");
        })
        .boxed()
}

/// Streams every genre in chunks of at most `chunk_size` rows.
pub fn extract_genres<S>(source: &S, chunk_size: usize) -> BoxStream<'_, EtlResult<Vec<GenreRow>>>
where
    S: Source,
{
    let mut extracted = 0;

    source
        .genre_rows()
        .try_chunks(chunk_size.max(1))
        .map_err(|TryChunksError(_, err)| err)
        .inspect_ok(move |chunk| {
            extracted += chunk.len();
            info!(extracted, "extracted genre chunk");
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::source::memory::MemorySource;

    async fn source_with(ids: &[Uuid]) -> MemorySource {
        let source = MemorySource::new();
        for id in ids {
            source
                .insert_film_work(FilmWorkRow::new(*id), Utc::now())
                .await;
        }
        source
    }

    #[tokio::test]
    async fn rows_are_chunked_in_order() {
        let mut ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        ids.sort();
        let source = source_with(&ids).await;

        let chunks: Vec<Vec<Uuid>> =
            extract_film_works(&source, ids.iter().copied().collect(), 2)
                .map_ok(|chunk| chunk.into_iter().map(|row| row.id).collect())
                .try_collect()
                .await
                .unwrap();

        assert_eq!(chunks, vec![vec![ids[0], ids[1]], vec![ids[2]]]);
        assert_eq!(source.film_work_row_requests().await, vec![ids]);
    }

    #[tokio::test]
    async fn empty_id_set_does_not_query_the_source() {
        let source = source_with(&[Uuid::new_v4()]).await;

        let chunks: Vec<Vec<FilmWorkRow>> = extract_film_works(&source, BTreeSet::new(), 2)
            .try_collect()
            .await
            .unwrap();

        assert!(chunks.is_empty());
        assert_eq!(source.total_calls().await, 0);
    }

    #[tokio::test]
    async fn missing_ids_are_skipped() {
        let present = Uuid::new_v4();
        let source = source_with(&[present]).await;

        let chunks: Vec<Vec<FilmWorkRow>> =
            extract_film_works(&source, BTreeSet::from([present, Uuid::new_v4()]), 10)
                .try_collect()
                .await
                .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1);
        assert_eq!(chunks[0][0].id, present);
    }
}
