//! Film catalogue indexer binary.
//!
//! Loads the configuration, initializes tracing and runs the indexing loop until the process
//! receives SIGINT or SIGTERM.

use std::process::ExitCode;

use indexer_config::shared::IndexerConfig;
use indexer_config::{Environment, load_config};
use telemetry::tracing::init_tracing;
use tracing::error;

use crate::core::start_indexer_with_config;
use crate::error::IndexerResult;

mod core;
mod error;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", err.render_report());
            ExitCode::FAILURE
        }
    }
}

fn run() -> IndexerResult<()> {
    let environment = Environment::load()?;
    let config = load_config::<IndexerConfig>()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"), environment)?;

    // We start the runtime.
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_indexer_with_config(config));

    if let Err(err) = &result {
        error!(category = err.category(), "{err}");
    }

    result
}
