//! Coordination primitives used by the indexing loop.

pub mod shutdown;
