use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::destination::{
    BulkItemResult, BulkResponse, Destination, IndexCreation, IndexedDocument,
};
use crate::error::EtlResult;
use crate::index::IndexSchema;

#[derive(Debug)]
struct MemoryIndex {
    schema: IndexSchema,
    documents: BTreeMap<Uuid, Value>,
}

#[derive(Debug, Default)]
struct Inner {
    indices: HashMap<String, MemoryIndex>,
    index_exists_calls: usize,
    create_index_calls: usize,
    bulk_requests: Vec<(String, Vec<Uuid>)>,
}

/// In-memory destination for tests and local runs.
///
/// Honors strict mappings the way the search cluster does: a document carrying a top-level
/// field absent from the mapping is rejected with status 400, and writes to an index that was
/// never created are rejected with status 404.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the documents stored in `index`, keyed by id.
    pub async fn documents(&self, index: &str) -> BTreeMap<Uuid, Value> {
        let inner = self.inner.lock().await;
        inner
            .indices
            .get(index)
            .map(|index| index.documents.clone())
            .unwrap_or_default()
    }

    pub async fn schema(&self, index: &str) -> Option<IndexSchema> {
        let inner = self.inner.lock().await;
        inner.indices.get(index).map(|index| index.schema.clone())
    }

    /// Returns the bulk requests that targeted `index`.
    pub async fn bulk_requests_for(&self, index: &str) -> Vec<Vec<Uuid>> {
        let inner = self.inner.lock().await;
        inner
            .bulk_requests
            .iter()
            .filter(|(name, _)| name == index)
            .map(|(_, ids)| ids.clone())
            .collect()
    }

    pub async fn create_index_calls(&self) -> usize {
        self.inner.lock().await.create_index_calls
    }

    /// Total number of calls of any kind.
    pub async fn total_calls(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.index_exists_calls + inner.create_index_calls + inner.bulk_requests.len()
    }
}

/// Returns the first top-level field of `source` that `schema` does not map.
fn unmapped_field<'a>(schema: &IndexSchema, source: &'a Value) -> Option<&'a str> {
    if !schema.is_strict() {
        return None;
    }

    let mapped = schema.mapped_fields();
    source
        .as_object()?
        .keys()
        .map(String::as_str)
        .find(|field| !mapped.contains(field))
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn index_exists(&self, index: &str) -> EtlResult<bool> {
        let mut inner = self.inner.lock().await;
        inner.index_exists_calls += 1;

        Ok(inner.indices.contains_key(index))
    }

    async fn create_index(&self, schema: &IndexSchema) -> EtlResult<IndexCreation> {
        let mut inner = self.inner.lock().await;
        inner.create_index_calls += 1;

        if inner.indices.contains_key(&schema.name) {
            return Ok(IndexCreation::AlreadyExists);
        }

        info!(index = %schema.name, "creating in-memory index");
        inner.indices.insert(
            schema.name.clone(),
            MemoryIndex {
                schema: schema.clone(),
                documents: BTreeMap::new(),
            },
        );

        Ok(IndexCreation::Created)
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<IndexedDocument>,
    ) -> EtlResult<BulkResponse> {
        let mut inner = self.inner.lock().await;
        inner.bulk_requests.push((
            index.to_string(),
            documents.iter().map(|document| document.id).collect(),
        ));

        let Some(target) = inner.indices.get_mut(index) else {
            let items = documents
                .into_iter()
                .map(|document| BulkItemResult {
                    id: document.id,
                    status: 404,
                    error: Some(format!("index_not_found_exception: no such index [{index}]")),
                })
                .collect();
            return Ok(BulkResponse { items });
        };

        let mut items = Vec::with_capacity(documents.len());
        for document in documents {
            if let Some(field) = unmapped_field(&target.schema, &document.source) {
                items.push(BulkItemResult {
                    id: document.id,
                    status: 400,
                    error: Some(format!(
                        "strict_dynamic_mapping_exception: mapping set to strict, dynamic introduction of [{field}] is not allowed"
                    )),
                });
                continue;
            }

            let status = if target.documents.insert(document.id, document.source).is_some() {
                200
            } else {
                201
            };
            items.push(BulkItemResult {
                id: document.id,
                status,
                error: None,
            });
        }

        Ok(BulkResponse { items })
    }
}
