use crate::error::EtlResult;
use crate::types::{GenreDocument, GenreRow};

/// Builds the document of a genre row. Names and descriptions are copied as they are.
pub fn transform_genre(row: GenreRow) -> EtlResult<GenreDocument> {
    Ok(GenreDocument {
        id: row.id,
        name: row.name,
        description: row.description,
    })
}

pub fn transform_genres(rows: Vec<GenreRow>) -> EtlResult<Vec<GenreDocument>> {
    rows.into_iter().map(transform_genre).collect()
}
