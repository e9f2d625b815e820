//! Conversion of source rows into index documents.

mod film_work;
mod genre;

pub use film_work::{transform_film_work, transform_film_works};
pub use genre::{transform_genre, transform_genres};
