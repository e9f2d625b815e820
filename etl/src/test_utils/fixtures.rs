use chrono::{DateTime, Utc};
use indexer_config::shared::{BatchConfig, PipelineConfig, RetryConfig};
use sqlx::types::Json;
use uuid::Uuid;

use crate::destination::Destination;
use crate::index::IndexSet;
use crate::pipeline::Pipeline;
use crate::source::Source;
use crate::store::state::StateStore;
use crate::types::{FilmWorkRow, GenreRef, GenreRow, PersonRef};

pub const TEST_MOVIES_INDEX: &str = "movies";

pub const TEST_GENRES_INDEX: &str = "genres";

/// Returns `count` random ids in ascending order, the order rows are streamed in.
pub fn sorted_ids(count: usize) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = (0..count).map(|_| Uuid::new_v4()).collect();
    ids.sort();
    ids
}

/// A film work row with a title, one actor and one genre.
pub fn film_work(id: Uuid, title: &str) -> FilmWorkRow {
    let actor = PersonRef {
        id: Uuid::new_v4(),
        name: format!("Actor of {title}"),
    };
    let genre = GenreRef {
        id: Uuid::new_v4(),
        name: "Drama".to_string(),
    };

    FilmWorkRow {
        rating: Some(7.5),
        title: Some(title.to_string()),
        genre: Some(Json(vec![genre.name.clone()])),
        actors_names: Some(Json(vec![actor.name.clone()])),
        actors: Some(Json(vec![actor])),
        genres: Some(Json(vec![genre])),
        ..FilmWorkRow::new(id)
    }
}

pub fn genre(name: &str) -> GenreRow {
    GenreRow {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: None,
    }
}

/// A timestamp `minutes` minutes in the past.
pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::minutes(minutes)
}

/// Pipeline configuration with millisecond backoff and pause.
pub fn test_pipeline_config(chunk_size: usize) -> PipelineConfig {
    PipelineConfig {
        batch: BatchConfig {
            max_size: chunk_size,
        },
        sleep_ms: 10,
        retry: RetryConfig {
            initial_delay_ms: 1,
            backoff_factor: 2.0,
            max_delay_ms: 5,
        },
        stale_running_flag_ms: PipelineConfig::DEFAULT_STALE_RUNNING_FLAG_MS,
    }
}

/// Builds a pipeline writing to [`TEST_MOVIES_INDEX`] and [`TEST_GENRES_INDEX`].
pub fn test_pipeline<Src, St, D>(
    chunk_size: usize,
    source: Src,
    state_store: St,
    destination: D,
) -> Pipeline<Src, St, D>
where
    Src: Source + Sync,
    St: StateStore + Sync,
    D: Destination + Sync,
{
    Pipeline::new(
        test_pipeline_config(chunk_size),
        IndexSet::new(TEST_MOVIES_INDEX, TEST_GENRES_INDEX),
        source,
        state_store,
        destination,
    )
}
