//! Index definitions for the movies and genres indices.

mod schema;

pub use schema::*;
