use std::error::Error;

use etl::error::EtlError;
use indexer_config::LoadConfigError;
use telemetry::tracing::TracingError;
use thiserror::Error;

pub type IndexerResult<T> = Result<T, IndexerError>;

/// Error type of the indexer binary.
///
/// Wraps [`EtlError`] for pipeline failures and adds the start-up failures.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Etl(#[from] EtlError),

    #[error("configuration error: {0}")]
    Config(#[from] LoadConfigError),

    #[error("tracing error: {0}")]
    Tracing(#[from] TracingError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexerError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            IndexerError::Etl(_) => "indexing error",
            IndexerError::Config(_) => "configuration error",
            IndexerError::Tracing(_) => "tracing error",
            IndexerError::Io(_) => "i/o error",
        }
    }

    /// Returns a user-oriented report for terminal output.
    ///
    /// Backtraces of pipeline errors are part of their display when `RUST_BACKTRACE` is set.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("indexer failed\n");
        out.push_str(&format!("category: {}\n", self.category()));
        out.push_str(&format!("error: {self}\n"));

        let mut source = Error::source(self);
        let mut idx = 1usize;
        while let Some(err) = source {
            out.push_str(&format!("cause {idx}: {err}\n"));
            source = err.source();
            idx += 1;
        }

        out
    }
}
