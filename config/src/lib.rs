//! Configuration for the film catalogue indexer.
//!
//! Holds the typed configuration structures shared by every crate of the workspace and the
//! hierarchical loader that builds them from configuration files and environment variables.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
