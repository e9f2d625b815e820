use std::{
    borrow::Cow,
    fmt, io,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;
use crate::shared::ValidationError;

/// Directory containing configuration files relative to the working directory.
const CONFIGURATION_DIR: &str = "configuration";

/// Supported extensions for base and environment configuration files, in lookup order.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Prefix for environment variable configuration overrides.
const ENV_PREFIX: &str = "APP";

const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested configuration keys in environment variables.
const ENV_SEPARATOR: &str = "__";

/// Trait implemented by top-level configuration structures loaded through [`load_config`].
pub trait Config {
    /// Checks cross-field constraints that serde cannot express.
    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Debug, Clone, Copy)]
enum ConfigFileKind {
    Base,
    Environment(Environment),
}

impl ConfigFileKind {
    fn stem(&self) -> Cow<'static, str> {
        match self {
            ConfigFileKind::Base => Cow::Borrowed("base"),
            ConfigFileKind::Environment(env) => Cow::Borrowed(env.as_str()),
        }
    }
}

impl fmt::Display for ConfigFileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFileKind::Base => f.write_str("base configuration"),
            ConfigFileKind::Environment(env) => write!(f, "{env} environment configuration"),
        }
    }
}

/// Errors that can occur while loading configuration files and overrides.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    /// A configuration file existed but could not be parsed.
    #[error("failed to load {kind_description} from `{path}`: {source}")]
    ConfigurationFileLoad {
        kind_description: String,
        path: PathBuf,
        source: config::ConfigError,
    },

    #[error("failed to build configuration: {0}")]
    Builder(#[source] config::ConfigError),

    /// The merged sources could not be deserialized into the target structure.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] config::ConfigError),

    /// Failed to determine the runtime environment (`APP_ENVIRONMENT`).
    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Loads hierarchical configuration from files and environment variables.
///
/// Sources are layered in this order, later ones overriding earlier ones:
///
/// 1. `configuration/base.(yaml|yml|json)`
/// 2. `configuration/{environment}.(yaml|yml|json)`
/// 3. `APP_`-prefixed environment variables, nested keys separated by `__`
///    (`APP_SOURCE__HOST`, `APP_PIPELINE__BATCH__MAX_SIZE`).
///
/// Every file is optional, so a deployment configured purely through environment variables
/// (or not configured at all) falls back to the defaults of the target structure. The loaded
/// value is validated before it is returned.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let base_path = std::env::current_dir().map_err(LoadConfigError::CurrentDir)?;
    let environment = Environment::load()?;

    load_config_from(&base_path.join(CONFIGURATION_DIR), environment)
}

/// Same as [`load_config`] but reads files from `directory` for the given `environment`.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let mut builder = config::Config::builder();

    for kind in [ConfigFileKind::Base, ConfigFileKind::Environment(environment)] {
        let Some(path) = find_configuration_file(directory, kind) else {
            continue;
        };

        builder = builder.add_source(config::File::from(path.clone()));
        builder
            .build_cloned()
            .map_err(|source| LoadConfigError::ConfigurationFileLoad {
                kind_description: kind.to_string(),
                path,
                source,
            })?;
    }

    let environment_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true);

    let settings = builder
        .add_source(environment_source)
        .build()
        .map_err(LoadConfigError::Builder)?;

    let config = settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)?;
    config.validate()?;

    Ok(config)
}

/// Returns the first existing file for `kind`, trying every supported extension.
fn find_configuration_file(directory: &Path, kind: ConfigFileKind) -> Option<PathBuf> {
    let stem = kind.stem();

    CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|extension| directory.join(format!("{stem}.{extension}")))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::shared::{IndexerConfig, StateStoreConfig};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "indexer-config-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_directory_yields_defaults() {
        let dir = std::env::temp_dir().join("indexer-config-does-not-exist");
        let config: IndexerConfig = load_config_from(&dir, Environment::Dev).unwrap();

        assert_eq!(config.pipeline.batch.max_size, 50);
        assert_eq!(config.sink.movies_index, "movies");
        assert!(matches!(config.state_store, StateStoreConfig::Memory));
    }

    #[test]
    fn environment_file_overrides_base_file() {
        let dir = scratch_dir("overlay");
        fs::write(
            dir.join("base.yaml"),
            "source:\n  host: db.internal\n  name: movies_db\npipeline:\n  sleep_ms: 1000\n",
        )
        .unwrap();
        fs::write(
            dir.join("prod.json"),
            r#"{"pipeline": {"sleep_ms": 5000}, "state_store": {"redis": {"host": "cache"}}}"#,
        )
        .unwrap();

        let config: IndexerConfig = load_config_from(&dir, Environment::Prod).unwrap();

        assert_eq!(config.source.host, "db.internal");
        assert_eq!(config.source.name, "movies_db");
        assert_eq!(config.pipeline.sleep_ms, 5000);
        match config.state_store {
            StateStoreConfig::Redis { host, port, .. } => {
                assert_eq!(host, "cache");
                assert_eq!(port, 6379);
            }
            other => panic!("expected redis state store, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_values_are_rejected_after_loading() {
        let dir = scratch_dir("invalid");
        fs::write(dir.join("base.yaml"), "pipeline:\n  batch:\n    max_size: 0\n").unwrap();

        let err = load_config_from::<IndexerConfig>(&dir, Environment::Dev).unwrap_err();
        assert!(matches!(err, LoadConfigError::Validation(_)));

        let _ = fs::remove_dir_all(&dir);
    }
}
