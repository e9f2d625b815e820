use serde::Deserialize;
use sqlx::{prelude::FromRow, types::Json};
use uuid::Uuid;

/// A person linked to a film work, as aggregated by the film work query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonRef {
    pub id: Uuid,
    pub name: String,
}

/// A genre linked to a film work, as aggregated by the film work query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenreRef {
    pub id: Uuid,
    pub name: String,
}

/// A film work joined with its genres and people, one row per film work.
///
/// Every aggregate is nullable at the row level. The query coalesces empty aggregates to an
/// empty JSON array but consumers must not rely on it.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FilmWorkRow {
    pub id: Uuid,
    pub rating: Option<f64>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Genre names.
    pub genre: Option<Json<Vec<String>>>,
    /// Names of people with the `director` role.
    pub director: Option<Json<Vec<String>>>,
    pub actors_names: Option<Json<Vec<String>>>,
    pub writers_names: Option<Json<Vec<String>>>,
    pub actors: Option<Json<Vec<PersonRef>>>,
    pub writers: Option<Json<Vec<PersonRef>>>,
    pub directors: Option<Json<Vec<PersonRef>>>,
    pub genres: Option<Json<Vec<GenreRef>>>,
}

impl FilmWorkRow {
    /// Creates a row with every optional column set to `NULL`.
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            rating: None,
            title: None,
            description: None,
            genre: None,
            director: None,
            actors_names: None,
            writers_names: None,
            actors: None,
            writers: None,
            directors: None,
            genres: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct GenreRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}
