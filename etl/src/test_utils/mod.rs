//! Helpers shared by unit and integration tests.
//!
//! The in-memory collaborators live next to their traits ([`crate::source::memory`],
//! [`crate::destination::memory`], [`crate::store::state::memory`]). This module adds row
//! fixtures, a pipeline configuration tuned for tests and a destination wrapper injecting
//! failures. [`database`] and [`redis`] reach the local servers used by the adapter tests.

pub mod database;
pub mod faulty_destination;
pub mod fixtures;
pub mod redis;
