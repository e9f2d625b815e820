use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A document that can be written to the search index.
///
/// The returned identifier is used verbatim as the document `_id`, which makes repeated
/// writes of the same document idempotent upserts.
pub trait IndexDocument: Serialize {
    fn document_id(&self) -> Uuid;
}

/// An `{id, name}` pair embedded in a film work document for linked people and genres.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: Uuid,
    pub name: String,
}

/// Film work as stored in the movies index.
///
/// List fields are never absent: a film work without actors has an empty `actors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilmWorkDocument {
    pub id: Uuid,
    pub imdb_rating: Option<f64>,
    /// Genre names, mapped as keywords for filtering.
    pub genre: Vec<String>,
    pub title: String,
    pub description: Option<String>,
    /// Director names.
    pub director: Vec<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
    pub actors: Vec<NamedEntity>,
    pub writers: Vec<NamedEntity>,
    pub directors: Vec<NamedEntity>,
    pub genres: Vec<NamedEntity>,
}

impl IndexDocument for FilmWorkDocument {
    fn document_id(&self) -> Uuid {
        self.id
    }
}

/// Genre as stored in the genres index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreDocument {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl IndexDocument for GenreDocument {
    fn document_id(&self) -> Uuid {
        self.id
    }
}
