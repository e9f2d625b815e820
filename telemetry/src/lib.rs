//! Tracing setup shared by the indexer binary and the test suites.

pub mod tracing;
