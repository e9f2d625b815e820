use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::destination::{
    BulkItemResult, BulkResponse, Destination, IndexCreation, IndexedDocument,
};
use crate::error::EtlResult;
use crate::index::IndexSchema;

/// Status reported for every item of an injected failure.
const THROTTLED_STATUS: u16 = 429;

#[derive(Debug, Default)]
struct Inner {
    bulk_calls: usize,
    failing_calls: BTreeSet<usize>,
}

/// Wraps a [`Destination`] and rejects chosen bulk requests as throttled.
///
/// A rejected request does not reach the wrapped destination, every item of it is reported
/// with status 429.
#[derive(Debug, Clone)]
pub struct FaultyDestination<D> {
    wrapped: D,
    inner: Arc<Mutex<Inner>>,
}

impl<D> FaultyDestination<D> {
    pub fn wrap(wrapped: D) -> Self {
        Self {
            wrapped,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn wrapped(&self) -> &D {
        &self.wrapped
    }

    /// Throttles the `call`-th bulk request, counted from one across every index.
    pub async fn throttle_bulk_call(&self, call: usize) {
        self.inner.lock().await.failing_calls.insert(call);
    }

    pub async fn bulk_calls(&self) -> usize {
        self.inner.lock().await.bulk_calls
    }
}

impl<D> Destination for FaultyDestination<D>
where
    D: Destination + Sync,
{
    fn name() -> &'static str {
        "faulty"
    }

    async fn index_exists(&self, index: &str) -> EtlResult<bool> {
        self.wrapped.index_exists(index).await
    }

    async fn create_index(&self, schema: &IndexSchema) -> EtlResult<IndexCreation> {
        self.wrapped.create_index(schema).await
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<IndexedDocument>,
    ) -> EtlResult<BulkResponse> {
        let should_fail = {
            let mut inner = self.inner.lock().await;
            inner.bulk_calls += 1;
            let call = inner.bulk_calls;
            inner.failing_calls.remove(&call)
        };

        if should_fail {
            let items = documents
                .into_iter()
                .map(|document| BulkItemResult {
                    id: document.id,
                    status: THROTTLED_STATUS,
                    error: Some("es_rejected_execution_exception: rejected execution".to_string()),
                })
                .collect();
            return Ok(BulkResponse { items });
        }

        self.wrapped.bulk_upsert(index, documents).await
    }
}
