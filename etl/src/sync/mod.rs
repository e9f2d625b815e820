//! Building blocks of a synchronization cycle: which film works changed, how their rows are
//! read in chunks and how documents reach the index.

mod extractor;
mod loader;
mod resolver;

pub use extractor::{extract_film_works, extract_genres};
pub use loader::IndexLoader;
pub use resolver::resolve;
