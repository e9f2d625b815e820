
use tracing::{debug, info};
use uuid::Uuid;

use crate::destination::{BulkResponse, Destination, IndexCreation, IndexedDocument};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::index::IndexSchema;
use crate::types::IndexDocument;

/// Maximum number of failed items described in the error detail of a failed chunk.
const MAX_REPORTED_FAILURES: usize = 10;

/// Writes document chunks to a [`Destination`].
#[derive(Debug, Clone)]
pub struct IndexLoader<D> {
    destination: D,
}

impl<D> IndexLoader<D>
where
    D: Destination,
{
    pub fn new(destination: D) -> Self {
        Self { destination }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    /// Creates the index of `schema` unless it exists. Never alters an existing index.
    pub async fn ensure_schema(&self, schema: &IndexSchema) -> EtlResult<()> {
        if self.destination.index_exists(&schema.name).await? {
            debug!(index = %schema.name, "index already exists");
            return Ok(());
        }

        match self.destination.create_index(schema).await? {
            IndexCreation::Created => {
                info!(index = %schema.name, destination = D::name(), "created index");
            }
            IndexCreation::AlreadyExists => {
                debug!(index = %schema.name, "index was created concurrently");
            }
        }

        Ok(())
    }

    /// Upserts `documents` into `index` with one bulk request and returns the ids written.
    ///
    /// The chunk fails as a whole when any item fails: with [`ErrorKind::DestinationThrottled`]
    /// if every failure is transient, with [`ErrorKind::DestinationDocumentRejected`]
    /// otherwise.
    pub async fn load<T>(&self, index: &str, documents: &[T]) -> EtlResult<Vec<Uuid>>
    where
        T: IndexDocument,
    {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let documents = documents
            .iter()
            .map(|document| -> EtlResult<IndexedDocument> {
                Ok(IndexedDocument {
                    id: document.document_id(),
                    source: serde_json::to_value(document)?,
                })
            })
            .collect::<EtlResult<Vec<_>>>()?;
        let submitted = documents.len();

        let response = self.destination.bulk_upsert(index, documents).await?;
        if response.has_failures() {
            return Err(chunk_failure(index, submitted, &response));
        }

        debug!(index, loaded = response.items.len(), "loaded chunk");

        Ok(response.items.into_iter().map(|item| item.id).collect())
    }
}

fn chunk_failure(index: &str, submitted: usize, response: &BulkResponse) -> EtlError {
    let failures: Vec<_> = response.failures().collect();
    let all_transient = failures.iter().all(|item| item.is_transient_failure());

    let mut detail = format!(
        "{} of {submitted} documents failed in index `{index}`",
        failures.len()
    );
    for item in failures.iter().take(MAX_REPORTED_FAILURES) {
        detail.push_str(&format!(
            "\n{} (status {}): {}",
            item.id,
            item.status,
            item.error.as_deref().unwrap_or("unknown error")
        ));
    }

    if all_transient {
        etl_error!(
            ErrorKind::DestinationThrottled,
            "Search index rejected documents temporarily",
            detail = detail
        )
    } else {
        etl_error!(
            ErrorKind::DestinationDocumentRejected,
            "Search index rejected documents",
            detail = detail
        )
    }
}
