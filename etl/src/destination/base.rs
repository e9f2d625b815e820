use std::future::Future;

use serde_json::Value;
use uuid::Uuid;

use crate::error::EtlResult;
use crate::index::IndexSchema;

/// A serialized document addressed by its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: Uuid,
    pub source: Value,
}

/// Result of an index creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    Created,
    /// Another writer created the index between the existence check and the request.
    AlreadyExists,
}

/// Outcome of a single item of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    pub id: Uuid,
    /// HTTP-like status reported for the item.
    pub status: u16,
    /// Reason reported by the sink when the item failed.
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.error.is_none()
    }

    /// Returns `true` for failures expected to succeed when retried later.
    pub fn is_transient_failure(&self) -> bool {
        self.status == 429 || (500..600).contains(&self.status)
    }
}

/// Per-item outcome of a bulk request, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items.iter().filter(|item| !item.is_success())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Sink receiving indexed documents.
///
/// Writes are keyed by document identifier, so replaying a bulk request leaves the index in
/// the same state.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Returns `true` if `index` exists.
    fn index_exists(&self, index: &str) -> impl Future<Output = EtlResult<bool>> + Send;

    /// Creates the index described by `schema`.
    ///
    /// Must never alter an existing index. When the index already exists the call reports
    /// [`IndexCreation::AlreadyExists`] instead of failing.
    fn create_index(
        &self,
        schema: &IndexSchema,
    ) -> impl Future<Output = EtlResult<IndexCreation>> + Send;

    /// Creates or replaces every document of `documents` in `index` with a single request.
    ///
    /// Item level failures are reported in the returned [`BulkResponse`], only failures of the
    /// request as a whole are returned as errors.
    fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<IndexedDocument>,
    ) -> impl Future<Output = EtlResult<BulkResponse>> + Send;
}
