//! Search index sinks.
//!
//! [`Destination`] is the seam between the pipeline and the search cluster. The
//! [`elasticsearch::ElasticsearchDestination`] talks to a real cluster over HTTP while
//! [`memory::MemoryDestination`] keeps documents in process for tests.

mod base;
pub mod elasticsearch;
pub mod memory;

pub use base::{BulkItemResult, BulkResponse, Destination, IndexCreation, IndexedDocument};
