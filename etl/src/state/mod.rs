//! Typed view over the persisted indexer progress.

mod progress;

pub use progress::*;
