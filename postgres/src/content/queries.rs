use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sqlx::PgPool;
use uuid::Uuid;

use crate::content::{FilmWorkRow, GenreRow};

/// Film works whose own row changed after `$1`, or every film work when `$1` is `NULL`.
const FILM_WORK_IDS_MODIFIED_SINCE: &str = r#"
    select fw.id
    from content.film_work fw
    where $1::timestamptz is null or fw.modified > $1
"#;

/// Film works featuring a person whose row changed after `$1`.
const FILM_WORK_IDS_BY_MODIFIED_PERSONS: &str = r#"
    select distinct pfw.film_work_id
    from content.person p
    join content.person_film_work pfw on pfw.person_id = p.id
    where ($1::timestamptz is null or p.modified > $1)
      and pfw.film_work_id is not null
"#;

/// Film works tagged with a genre whose row changed after `$1`.
const FILM_WORK_IDS_BY_MODIFIED_GENRES: &str = r#"
    select distinct gfw.film_work_id
    from content.genre g
    join content.genre_film_work gfw on gfw.genre_id = g.id
    where ($1::timestamptz is null or g.modified > $1)
      and gfw.film_work_id is not null
"#;

/// Denormalized film works for the ids bound to `$1`, one row per film work.
const FILM_WORKS_BY_IDS: &str = r#"
    select
        fw.id,
        fw.rating,
        fw.title,
        fw.description,
        coalesce(
            json_agg(distinct g.name) filter (where g.id is not null),
            '[]'
        ) as genre,
        coalesce(
            json_agg(distinct p.full_name) filter (where pfw.role = 'director'),
            '[]'
        ) as director,
        coalesce(
            json_agg(distinct p.full_name) filter (where pfw.role = 'actor'),
            '[]'
        ) as actors_names,
        coalesce(
            json_agg(distinct p.full_name) filter (where pfw.role = 'writer'),
            '[]'
        ) as writers_names,
        coalesce(
            json_agg(distinct jsonb_build_object('id', p.id, 'name', p.full_name))
                filter (where pfw.role = 'actor'),
            '[]'
        ) as actors,
        coalesce(
            json_agg(distinct jsonb_build_object('id', p.id, 'name', p.full_name))
                filter (where pfw.role = 'writer'),
            '[]'
        ) as writers,
        coalesce(
            json_agg(distinct jsonb_build_object('id', p.id, 'name', p.full_name))
                filter (where pfw.role = 'director'),
            '[]'
        ) as directors,
        coalesce(
            json_agg(distinct jsonb_build_object('id', g.id, 'name', g.name))
                filter (where g.id is not null),
            '[]'
        ) as genres
    from content.film_work fw
    left join content.genre_film_work gfw on gfw.film_work_id = fw.id
    left join content.genre g on g.id = gfw.genre_id
    left join content.person_film_work pfw on pfw.film_work_id = fw.id
    left join content.person p on p.id = pfw.person_id
    where fw.id = any($1)
    group by fw.id
    order by fw.id
"#;

const ALL_GENRES: &str = r#"
    select g.id, g.name, g.description
    from content.genre g
    order by g.name
"#;

/// Returns ids of film works modified after `since`, or all of them when `since` is `None`.
pub async fn film_work_ids_modified_since(
    pool: &PgPool,
    since: Option<DateTime<Utc>>,
) -> sqlx::Result<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(FILM_WORK_IDS_MODIFIED_SINCE)
        .bind(since)
        .fetch_all(pool)
        .await
}

/// Returns ids of film works linked to a person modified after `since`.
pub async fn film_work_ids_by_modified_persons(
    pool: &PgPool,
    since: Option<DateTime<Utc>>,
) -> sqlx::Result<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(FILM_WORK_IDS_BY_MODIFIED_PERSONS)
        .bind(since)
        .fetch_all(pool)
        .await
}

/// Returns ids of film works linked to a genre modified after `since`.
pub async fn film_work_ids_by_modified_genres(
    pool: &PgPool,
    since: Option<DateTime<Utc>>,
) -> sqlx::Result<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>(FILM_WORK_IDS_BY_MODIFIED_GENRES)
        .bind(since)
        .fetch_all(pool)
        .await
}

/// Streams the denormalized rows of the given film works.
///
/// Rows are produced as the server returns them, so callers can chunk the stream without
/// buffering the full result.
pub fn film_work_rows(pool: &PgPool, ids: Vec<Uuid>) -> BoxStream<'_, sqlx::Result<FilmWorkRow>> {
    sqlx::query_as::<_, FilmWorkRow>(FILM_WORKS_BY_IDS)
        .bind(ids)
        .fetch(pool)
}

/// Streams every genre.
pub fn genre_rows(pool: &PgPool) -> BoxStream<'_, sqlx::Result<GenreRow>> {
    sqlx::query_as::<_, GenreRow>(ALL_GENRES).fetch(pool)
}
