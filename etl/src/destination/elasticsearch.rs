use std::collections::HashMap;

use indexer_config::shared::ElasticsearchConfig;
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::destination::{
    BulkItemResult, BulkResponse, Destination, IndexCreation, IndexedDocument,
};
use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::index::IndexSchema;

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Error type returned when creating an index that is already there.
const INDEX_ALREADY_EXISTS_ERROR: &str = "resource_already_exists_exception";

/// [`Destination`] writing to an Elasticsearch cluster through its REST API.
#[derive(Debug, Clone)]
pub struct ElasticsearchDestination {
    client: Client,
    base_url: String,
}

impl ElasticsearchDestination {
    pub fn new(config: &ElasticsearchConfig) -> EtlResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| {
                etl_error!(
                    ErrorKind::ConfigError,
                    "Failed to build the search index HTTP client",
                    err.to_string(),
                    source: err
                )
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn index_url(&self, index: &str) -> String {
        format!("{}/{}", self.base_url, index)
    }
}

impl Destination for ElasticsearchDestination {
    fn name() -> &'static str {
        "elasticsearch"
    }

    async fn index_exists(&self, index: &str) -> EtlResult<bool> {
        let response = self.client.head(self.index_url(index)).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(status_error(
                status,
                "Search index existence check failed",
                format!("index `{index}`"),
            )),
        }
    }

    async fn create_index(&self, schema: &IndexSchema) -> EtlResult<IndexCreation> {
        let response = self
            .client
            .put(self.index_url(&schema.name))
            .json(&schema.to_create_body())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(index = %schema.name, "created search index");
            return Ok(IndexCreation::Created);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && is_index_already_exists(&body) {
            debug!(index = %schema.name, "search index was created concurrently");
            return Ok(IndexCreation::AlreadyExists);
        }

        Err(status_error(
            status,
            "Search index creation failed",
            format!("index `{}`: {body}", schema.name),
        ))
    }

    async fn bulk_upsert(
        &self,
        index: &str,
        documents: Vec<IndexedDocument>,
    ) -> EtlResult<BulkResponse> {
        if documents.is_empty() {
            return Ok(BulkResponse::default());
        }

        let body = build_bulk_body(index, &documents)?;
        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(
                status,
                "Bulk request was rejected",
                format!("index `{index}`: {body}"),
            ));
        }

        let raw: RawBulkResponse = response.json().await?;
        let response = parse_bulk_response(raw)?;

        debug!(
            index,
            documents = documents.len(),
            failures = response.failures().count(),
            "bulk request completed"
        );

        Ok(response)
    }
}

/// Serializes `documents` as newline delimited `index` actions, one action and source line
/// per document, terminated by a newline.
fn build_bulk_body(index: &str, documents: &[IndexedDocument]) -> EtlResult<String> {
    let mut body = String::new();

    for document in documents {
        let action = serde_json::json!({ "index": { "_index": index, "_id": document.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&document.source)?);
        body.push('\n');
    }

    Ok(body)
}

#[derive(Debug, Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, RawBulkItem>>,
}

#[derive(Debug, Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_id")]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// Flattens the action-keyed items of a bulk response.
fn parse_bulk_response(raw: RawBulkResponse) -> EtlResult<BulkResponse> {
    let mut items = Vec::with_capacity(raw.items.len());

    for item in raw.items {
        for (_, result) in item {
            let id = Uuid::parse_str(&result.id).map_err(|err| {
                etl_error!(
                    ErrorKind::DeserializationError,
                    "Bulk response contains an invalid document id",
                    result.id.clone(),
                    source: err
                )
            })?;

            items.push(BulkItemResult {
                id,
                status: result.status,
                error: result.error.as_ref().map(describe_item_error),
            });
        }
    }

    Ok(BulkResponse { items })
}

fn describe_item_error(error: &Value) -> String {
    let error_type = error.get("type").and_then(Value::as_str);
    let reason = error.get("reason").and_then(Value::as_str);

    match (error_type, reason) {
        (Some(error_type), Some(reason)) => format!("{error_type}: {reason}"),
        (Some(error_type), None) => error_type.to_string(),
        _ => error.to_string(),
    }
}

/// Returns `true` if the error body reports that the index already exists.
fn is_index_already_exists(body: &str) -> bool {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("type"))
                .and_then(Value::as_str)
                .map(|error_type| error_type == INDEX_ALREADY_EXISTS_ERROR)
        })
        .unwrap_or(false)
}

fn status_error(status: StatusCode, description: &'static str, detail: String) -> EtlError {
    let kind = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ErrorKind::DestinationThrottled
    } else {
        ErrorKind::DestinationQueryFailed
    };

    etl_error!(kind, description, format!("status {status}, {detail}"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn bulk_body_is_newline_delimited_and_terminated() {
        let id = Uuid::new_v4();
        let documents = vec![IndexedDocument {
            id,
            source: json!({ "id": id, "name": "Comedy" }),
        }];

        let body = build_bulk_body("genres", &documents).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert!(body.ends_with('\n'));
        assert_eq!(lines.len(), 2);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "genres");
        assert_eq!(action["index"]["_id"], id.to_string());
    }

    #[test]
    fn bulk_response_items_are_flattened() {
        let ok_id = Uuid::new_v4();
        let rejected_id = Uuid::new_v4();
        let raw: RawBulkResponse = serde_json::from_value(json!({
            "took": 3,
            "errors": true,
            "items": [
                { "index": { "_index": "movies", "_id": ok_id, "status": 201 } },
                { "index": {
                    "_index": "movies",
                    "_id": rejected_id,
                    "status": 400,
                    "error": {
                        "type": "strict_dynamic_mapping_exception",
                        "reason": "mapping set to strict, dynamic introduction of [rating] is not allowed"
                    }
                } }
            ]
        }))
        .unwrap();

        let response = parse_bulk_response(raw).unwrap();
        let failures: Vec<&BulkItemResult> = response.failures().collect();

        assert_eq!(response.items.len(), 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, rejected_id);
        assert!(!failures[0].is_transient_failure());
        assert!(
            failures[0]
                .error
                .as_deref()
                .unwrap()
                .starts_with("strict_dynamic_mapping_exception")
        );
    }

    #[test]
    fn invalid_document_id_in_response_is_an_error() {
        let raw: RawBulkResponse = serde_json::from_value(json!({
            "items": [{ "index": { "_id": "not-a-uuid", "status": 201 } }]
        }))
        .unwrap();

        let err = parse_bulk_response(raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeserializationError);
    }

    #[test]
    fn already_exists_error_is_recognized() {
        let body = json!({
            "error": { "type": "resource_already_exists_exception", "reason": "index [movies] already exists" },
            "status": 400
        })
        .to_string();

        assert!(is_index_already_exists(&body));
        assert!(!is_index_already_exists("{}"));
        assert!(!is_index_already_exists("not json"));
    }

    #[test]
    fn throttling_statuses_map_to_throttled_kind() {
        let err = status_error(
            StatusCode::TOO_MANY_REQUESTS,
            "Bulk request was rejected",
            String::new(),
        );
        assert_eq!(err.kind(), ErrorKind::DestinationThrottled);

        let err = status_error(
            StatusCode::BAD_REQUEST,
            "Bulk request was rejected",
            String::new(),
        );
        assert_eq!(err.kind(), ErrorKind::DestinationQueryFailed);
    }
}
