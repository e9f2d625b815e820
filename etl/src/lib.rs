//! Incremental indexing of the film catalogue into a search cluster.
//!
//! A [`pipeline::Pipeline`] periodically resolves which film works changed in the source
//! database since the last committed cycle, either directly or through one of their people or
//! genres, and upserts their denormalized documents into the movies index chunk by chunk.
//! Progress is persisted after every chunk so an interrupted cycle resumes where it stopped.
//! Genres are resynced in full after every cycle.

pub mod concurrency;
pub mod conversions;
pub mod destination;
pub mod error;
pub mod index;
mod macros;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod state;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
