use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Connection and index naming settings for the Elasticsearch sink.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ElasticsearchConfig {
    /// Base url of the cluster, for example `http://localhost:9200`.
    #[serde(default = "default_url")]
    pub url: String,
    /// Index receiving film work documents.
    #[serde(default = "default_movies_index")]
    pub movies_index: String,
    /// Index receiving genre documents.
    #[serde(default = "default_genres_index")]
    pub genres_index: String,
    /// Timeout applied to every HTTP request sent to the cluster.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ElasticsearchConfig {
    pub const DEFAULT_URL: &'static str = "http://localhost:9200";

    pub const DEFAULT_MOVIES_INDEX: &'static str = "movies";

    pub const DEFAULT_GENRES_INDEX: &'static str = "genres";

    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::InvalidFieldValue {
                field: "sink.url",
                constraint: "must start with `http://` or `https://`",
            });
        }

        if self.movies_index.trim().is_empty() {
            return Err(ValidationError::EmptyField("sink.movies_index"));
        }

        if self.genres_index.trim().is_empty() {
            return Err(ValidationError::EmptyField("sink.genres_index"));
        }

        if self.movies_index == self.genres_index {
            return Err(ValidationError::InvalidFieldValue {
                field: "sink.genres_index",
                constraint: "must differ from `movies_index`",
            });
        }

        if self.request_timeout_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "sink.request_timeout_ms",
                constraint: "must be greater than 0",
            });
        }

        Ok(())
    }
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            movies_index: default_movies_index(),
            genres_index: default_genres_index(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

fn default_url() -> String {
    ElasticsearchConfig::DEFAULT_URL.to_string()
}

fn default_movies_index() -> String {
    ElasticsearchConfig::DEFAULT_MOVIES_INDEX.to_string()
}

fn default_genres_index() -> String {
    ElasticsearchConfig::DEFAULT_GENRES_INDEX.to_string()
}

fn default_request_timeout_ms() -> u64 {
    ElasticsearchConfig::DEFAULT_REQUEST_TIMEOUT_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_url_without_scheme() {
        let config = ElasticsearchConfig {
            url: "localhost:9200".to_string(),
            ..ElasticsearchConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_shared_index_name() {
        let config = ElasticsearchConfig {
            genres_index: "movies".to_string(),
            ..ElasticsearchConfig::default()
        };

        assert!(config.validate().is_err());
    }
}
