use sqlx::types::Json;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::types::{FilmWorkDocument, FilmWorkRow, GenreRef, NamedEntity, PersonRef};

/// Builds the document of a film work row.
///
/// Missing aggregates become empty lists and optional scalars are copied as they are. Fails
/// with [`ErrorKind::ValidationError`] when the title is missing.
pub fn transform_film_work(row: FilmWorkRow) -> EtlResult<FilmWorkDocument> {
    let Some(title) = row.title else {
        bail!(
            ErrorKind::ValidationError,
            "Film work has no title",
            format!("film work {}", row.id)
        );
    };

    Ok(FilmWorkDocument {
        id: row.id,
        imdb_rating: row.rating,
        genre: names(row.genre),
        title,
        description: row.description,
        director: names(row.director),
        actors_names: names(row.actors_names),
        writers_names: names(row.writers_names),
        actors: people(row.actors),
        writers: people(row.writers),
        directors: people(row.directors),
        genres: genres(row.genres),
    })
}

/// Transforms a whole chunk, failing on the first invalid row.
pub fn transform_film_works(rows: Vec<FilmWorkRow>) -> EtlResult<Vec<FilmWorkDocument>> {
    rows.into_iter().map(transform_film_work).collect()
}

fn names(aggregate: Option<Json<Vec<String>>>) -> Vec<String> {
    aggregate.map(|Json(names)| names).unwrap_or_default()
}

fn people(aggregate: Option<Json<Vec<PersonRef>>>) -> Vec<NamedEntity> {
    aggregate
        .map(|Json(people)| {
            people
                .into_iter()
                .map(|person| NamedEntity {
                    id: person.id,
                    name: person.name,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn genres(aggregate: Option<Json<Vec<GenreRef>>>) -> Vec<NamedEntity> {
    aggregate
        .map(|Json(genres)| {
            genres
                .into_iter()
                .map(|genre| NamedEntity {
                    id: genre.id,
                    name: genre.name,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn titled_row(title: &str) -> FilmWorkRow {
        FilmWorkRow {
            title: Some(title.to_string()),
            ..FilmWorkRow::new(Uuid::new_v4())
        }
    }

    #[test]
    fn null_aggregates_become_empty_lists() {
        let row = titled_row("Star Wars");
        let id = row.id;

        let document = transform_film_work(row).unwrap();

        assert_eq!(document.id, id);
        assert_eq!(document.title, "Star Wars");
        assert_eq!(document.imdb_rating, None);
        assert_eq!(document.description, None);
        assert!(document.genre.is_empty());
        assert!(document.director.is_empty());
        assert!(document.actors_names.is_empty());
        assert!(document.writers_names.is_empty());
        assert!(document.actors.is_empty());
        assert!(document.writers.is_empty());
        assert!(document.directors.is_empty());
        assert!(document.genres.is_empty());
    }

    #[test]
    fn aggregates_are_carried_over() {
        let actor = PersonRef {
            id: Uuid::new_v4(),
            name: "Mark Hamill".to_string(),
        };
        let sci_fi = GenreRef {
            id: Uuid::new_v4(),
            name: "Sci-Fi".to_string(),
        };
        let row = FilmWorkRow {
            rating: Some(8.6),
            description: Some("A long time ago".to_string()),
            genre: Some(Json(vec!["Sci-Fi".to_string()])),
            actors_names: Some(Json(vec!["Mark Hamill".to_string()])),
            actors: Some(Json(vec![actor.clone()])),
            genres: Some(Json(vec![sci_fi.clone()])),
            ..titled_row("Star Wars")
        };

        let document = transform_film_work(row).unwrap();

        assert_eq!(document.imdb_rating, Some(8.6));
        assert_eq!(document.genre, vec!["Sci-Fi".to_string()]);
        assert_eq!(document.actors_names, vec!["Mark Hamill".to_string()]);
        assert_eq!(
            document.actors,
            vec![NamedEntity {
                id: actor.id,
                name: actor.name
            }]
        );
        assert_eq!(document.genres[0].id, sci_fi.id);
    }

    #[test]
    fn missing_title_is_rejected() {
        let err = transform_film_work(FilmWorkRow::new(Uuid::new_v4())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn ratings_on_any_scale_pass_through() {
        for rating in [45.0, 10.5, -1.0] {
            let row = FilmWorkRow {
                rating: Some(rating),
                ..titled_row("Alien")
            };

            let document = transform_film_work(row).unwrap();
            assert_eq!(document.imdb_rating, Some(rating));
        }
    }

    #[test]
    fn blank_title_without_rating_passes_through() {
        let document = transform_film_work(titled_row("")).unwrap();

        assert_eq!(document.title, "");
        assert_eq!(document.imdb_rating, None);
    }

    #[test]
    fn chunk_fails_on_first_invalid_row() {
        let rows = vec![titled_row("Alien"), FilmWorkRow::new(Uuid::new_v4())];

        assert!(transform_film_works(rows).is_err());
    }
}
