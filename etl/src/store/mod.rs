//! Persistence of the indexer progress.

pub mod state;
