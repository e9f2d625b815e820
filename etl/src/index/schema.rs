use indexer_config::shared::ElasticsearchConfig;
use serde_json::{Value, json};

/// Name of the analyzer shared by every full text field.
pub const RU_EN_ANALYZER: &str = "ru_en";

/// Settings and mappings used to create an index when it does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSchema {
    pub name: String,
    pub settings: Value,
    pub mappings: Value,
}

impl IndexSchema {
    /// Schema of the index holding film work documents.
    pub fn movies(name: impl Into<String>) -> Self {
        let named_entity = json!({
            "type": "nested",
            "dynamic": "strict",
            "properties": {
                "id": { "type": "keyword" },
                "name": { "type": "text", "analyzer": RU_EN_ANALYZER }
            }
        });

        Self {
            name: name.into(),
            settings: analysis_settings(),
            mappings: json!({
                "dynamic": "strict",
                "properties": {
                    "id": { "type": "keyword" },
                    "imdb_rating": { "type": "float" },
                    "genre": { "type": "keyword" },
                    "title": text_with_raw_keyword(),
                    "description": text(),
                    "director": text(),
                    "actors_names": text(),
                    "writers_names": text(),
                    "actors": named_entity.clone(),
                    "writers": named_entity.clone(),
                    "directors": named_entity.clone(),
                    "genres": named_entity
                }
            }),
        }
    }

    /// Schema of the index holding genre documents.
    pub fn genres(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: analysis_settings(),
            mappings: json!({
                "dynamic": "strict",
                "properties": {
                    "id": { "type": "keyword" },
                    "name": text_with_raw_keyword(),
                    "description": text()
                }
            }),
        }
    }

    /// Returns the top-level field names declared by the mapping.
    pub fn mapped_fields(&self) -> Vec<&str> {
        self.mappings
            .get("properties")
            .and_then(Value::as_object)
            .map(|properties| properties.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Returns `true` when unmapped fields are rejected instead of added to the mapping.
    pub fn is_strict(&self) -> bool {
        self.mappings.get("dynamic").and_then(Value::as_str) == Some("strict")
    }

    /// Body of the index creation request.
    pub fn to_create_body(&self) -> Value {
        json!({
            "settings": self.settings,
            "mappings": self.mappings
        })
    }
}

/// The two indices written by the indexer.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSet {
    pub movies: IndexSchema,
    pub genres: IndexSchema,
}

impl IndexSet {
    pub fn new(movies_index: impl Into<String>, genres_index: impl Into<String>) -> Self {
        Self {
            movies: IndexSchema::movies(movies_index),
            genres: IndexSchema::genres(genres_index),
        }
    }
}

impl From<&ElasticsearchConfig> for IndexSet {
    fn from(config: &ElasticsearchConfig) -> Self {
        Self::new(config.movies_index.clone(), config.genres_index.clone())
    }
}

fn text() -> Value {
    json!({ "type": "text", "analyzer": RU_EN_ANALYZER })
}

fn text_with_raw_keyword() -> Value {
    json!({
        "type": "text",
        "analyzer": RU_EN_ANALYZER,
        "fields": {
            "raw": { "type": "keyword" }
        }
    })
}

/// Refresh interval and the bilingual analyzer used by every index.
fn analysis_settings() -> Value {
    json!({
        "refresh_interval": "1s",
        "analysis": {
            "filter": {
                "english_stop": { "type": "stop", "stopwords": "_english_" },
                "english_stemmer": { "type": "stemmer", "language": "english" },
                "english_possessive_stemmer": {
                    "type": "stemmer",
                    "language": "possessive_english"
                },
                "russian_stop": { "type": "stop", "stopwords": "_russian_" },
                "russian_stemmer": { "type": "stemmer", "language": "russian" }
            },
            "analyzer": {
                RU_EN_ANALYZER: {
                    "tokenizer": "standard",
                    "filter": [
                        "lowercase",
                        "english_stop",
                        "english_stemmer",
                        "english_possessive_stemmer",
                        "russian_stop",
                        "russian_stemmer"
                    ]
                }
            }
        }
    })
}
