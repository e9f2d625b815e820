//! Documents written to the search index and the rows they are built from.

mod document;

pub use document::*;

// Re-exports.
pub use postgres::content::{FilmWorkRow, GenreRef, GenreRow, PersonRef};
