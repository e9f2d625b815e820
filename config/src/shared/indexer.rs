use serde::Deserialize;

use crate::load::Config;
use crate::shared::{
    ElasticsearchConfig, PgConnectionConfig, PipelineConfig, StateStoreConfig, ValidationError,
};

/// Complete configuration of the indexer process.
///
/// Every section has defaults, so an empty configuration describes a local setup with
/// Postgres, Elasticsearch and an in-memory progress store on their standard ports.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IndexerConfig {
    /// Database the film catalogue is read from.
    #[serde(default)]
    pub source: PgConnectionConfig,
    /// Search cluster the documents are written to.
    #[serde(default)]
    pub sink: ElasticsearchConfig,
    #[serde(default)]
    pub state_store: StateStoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.sink.validate()?;
        self.state_store.validate()?;
        self.pipeline.validate()
    }
}

impl Config for IndexerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        IndexerConfig::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_deserializes_to_defaults() {
        let config: IndexerConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.source.port, 5432);
        assert_eq!(config.sink.url, "http://localhost:9200");
        assert_eq!(config.pipeline.sleep_ms, 60_000);
        assert_eq!(config.pipeline.batch.max_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nested_sections_are_partially_overridable() {
        let config: IndexerConfig = serde_json::from_str(
            r#"{"pipeline": {"batch": {"max_size": 2}, "retry": {"max_delay_ms": 500}}}"#,
        )
        .unwrap();

        assert_eq!(config.pipeline.batch.max_size, 2);
        assert_eq!(config.pipeline.retry.max_delay_ms, 500);
        assert_eq!(config.pipeline.retry.initial_delay_ms, 100);
    }
}
