use etl::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use etl::destination::Destination;
use etl::destination::elasticsearch::ElasticsearchDestination;
use etl::index::IndexSet;
use etl::pipeline::Pipeline;
use etl::retry::RetryPolicy;
use etl::source::Source;
use etl::source::postgres::PgSource;
use etl::store::state::StateStore;
use etl::store::state::memory::MemoryStateStore;
use etl::store::state::redis::{RedisStateStore, RedisStateStoreConfig};
use indexer_config::shared::{
    ElasticsearchConfig, IndexerConfig, PgConnectionConfig, PipelineConfig, StateStoreConfig,
};
use secrecy::ExposeSecret;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::error::IndexerResult;

/// Starts the indexer with the provided configuration.
///
/// Builds the source and the search index client, connects the progress store selected by
/// the configuration and runs the indexing loop until a shutdown signal is received.
pub async fn start_indexer_with_config(config: IndexerConfig) -> IndexerResult<()> {
    info!("starting indexer service");

    log_config(&config);

    let IndexerConfig {
        source,
        sink,
        state_store,
        pipeline,
    } = config;

    let indices = IndexSet::from(&sink);
    let source = PgSource::new(&source);
    let destination = ElasticsearchDestination::new(&sink)?;

    // Each state store gets its own pipeline type, static dispatch is preferred over boxing
    // the store.
    match state_store {
        StateStoreConfig::Memory => {
            warn!("using the memory state store, progress is lost when the process exits");
            let state_store = MemoryStateStore::new();

            let pipeline = Pipeline::new(pipeline, indices, source, state_store, destination);
            start_pipeline(pipeline).await?;
        }
        StateStoreConfig::Redis {
            host,
            port,
            username,
            password,
            key,
        } => {
            let redis_config = RedisStateStoreConfig {
                host,
                port,
                username,
                password: password.map(|password| password.expose_secret().to_owned()),
                key,
            };

            // Redis may still be starting next to the indexer, so the first connection is
            // retried like any other transient failure.
            let retry_policy = RetryPolicy::from(&pipeline.retry);
            let state_store = retry_policy
                .run(|| RedisStateStore::connect(redis_config.clone()))
                .await?;

            let pipeline = Pipeline::new(pipeline, indices, source, state_store, destination);
            start_pipeline(pipeline).await?;
        }
    }

    info!("indexer service stopped");

    Ok(())
}

fn log_config(config: &IndexerConfig) {
    log_source_config(&config.source);
    log_sink_config(&config.sink);
    log_state_store_config(&config.state_store);
    log_pipeline_config(&config.pipeline);
}

fn log_source_config(config: &PgConnectionConfig) {
    debug!(
        host = %config.host,
        port = config.port,
        dbname = %config.name,
        username = %config.username,
        require_tls = config.require_tls,
        "using source config"
    );
}

fn log_sink_config(config: &ElasticsearchConfig) {
    debug!(
        url = %config.url,
        movies_index = %config.movies_index,
        genres_index = %config.genres_index,
        request_timeout_ms = config.request_timeout_ms,
        "using elasticsearch sink config"
    );
}

fn log_state_store_config(config: &StateStoreConfig) {
    match config {
        StateStoreConfig::Memory => {
            debug!("using memory state store config");
        }
        StateStoreConfig::Redis {
            host,
            port,
            username,
            password: _,
            key,
        } => {
            debug!(
                host,
                port,
                username = username.as_deref(),
                key,
                "using redis state store config"
            );
        }
    }
}

fn log_pipeline_config(config: &PipelineConfig) {
    debug!(
        batch_max_size = config.batch.max_size,
        sleep_ms = config.sleep_ms,
        retry_initial_delay_ms = config.retry.initial_delay_ms,
        retry_backoff_factor = config.retry.backoff_factor,
        retry_max_delay_ms = config.retry.max_delay_ms,
        stale_running_flag_ms = config.stale_running_flag_ms,
        "using pipeline config"
    );
}

/// Runs `pipeline` until SIGINT or SIGTERM is received or a cycle fails permanently.
#[tracing::instrument(skip(pipeline))]
async fn start_pipeline<Src, St, D>(pipeline: Pipeline<Src, St, D>) -> IndexerResult<()>
where
    Src: Source + Sync,
    St: StateStore + Sync,
    D: Destination + Sync,
{
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let shutdown_handle = tokio::spawn(forward_shutdown_signals(shutdown_tx));

    let result = pipeline.run(shutdown_rx).await;

    // The signal task is still waiting when the loop stopped on an error.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    Ok(())
}

/// Waits for SIGINT or SIGTERM and requests the pipeline to stop.
///
/// The current cycle is interrupted and its running flag released. Chunks loaded so far stay
/// recorded, so the next start resumes from them.
async fn forward_shutdown_signals(shutdown_tx: ShutdownTx) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(err) => {
            warn!(error = %err, "failed to register the sigterm handler");
            None
        }
    };

    let sigterm_received = async {
        match sigterm.as_mut() {
            Some(sigterm) => {
                sigterm.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("sigint (ctrl+c) received, shutting down indexer");
        }
        _ = sigterm_received => {
            info!("sigterm received, shutting down indexer");
        }
    }

    shutdown_tx.shutdown();
}
