use std::sync::Once;

use indexer_config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt};

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the log bridge: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the global subscriber: {0}")]
    GlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Flushes buffered log lines when dropped.
///
/// Must be kept alive for the whole lifetime of the process, otherwise log lines written
/// shortly before exit can be lost.
#[must_use = "dropping the flusher stops the background log writer"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber for the process named `app_name`.
///
/// Lines are written to stdout through a non-blocking writer. [`Environment::Prod`] emits one
/// JSON object per line, [`Environment::Dev`] emits human readable lines. The filter is read
/// from `RUST_LOG` and defaults to `info`. Records emitted through the `log` facade by
/// dependencies are forwarded to the same subscriber.
pub fn init_tracing(app_name: &str, environment: Environment) -> Result<LogFlusher, TracingError> {
    tracing_log::LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let fmt_layer = if environment.is_prod() {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer().with_target(true).with_writer(writer).boxed()
    };

    let subscriber = Registry::default().with(fmt_layer).with(env_filter());
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!(app = app_name, environment = %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a subscriber writing through the test harness capture, once per test binary.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let _ = fmt()
            .with_env_filter(env_filter())
            .with_test_writer()
            .try_init();
    });
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
