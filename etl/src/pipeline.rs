use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use indexer_config::shared::PipelineConfig;
use tracing::{debug, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::conversions::{transform_film_works, transform_genres};
use crate::destination::Destination;
use crate::error::EtlResult;
use crate::index::IndexSet;
use crate::retry::RetryPolicy;
use crate::source::Source;
use crate::state::{ProgressState, RunningFlagAcquisition};
use crate::store::state::StateStore;
use crate::sync::{IndexLoader, extract_film_works, extract_genres, resolve};

/// Result of a single indexing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle holds the running flag, nothing was read or written.
    Skipped,
    /// The cycle committed its watermark. Counts are documents written by this run.
    Completed { film_works: usize, genres: usize },
}

/// Incremental synchronization of the film catalogue into the search index.
///
/// A cycle resolves the film works changed since the stored watermark, streams them in chunks
/// through transformation and loading, records each loaded chunk in the progress store and
/// finally moves the watermark to the instant the cycle started. Genres are then resynced in
/// full.
#[derive(Debug)]
pub struct Pipeline<Src, St, D> {
    config: PipelineConfig,
    indices: IndexSet,
    source: Src,
    progress: ProgressState<St>,
    loader: IndexLoader<D>,
    retry_policy: RetryPolicy,
    /// Whether the running flag currently stored was set by this pipeline.
    holds_running_flag: AtomicBool,
}

impl<Src, St, D> Pipeline<Src, St, D>
where
    Src: Source + Sync,
    St: StateStore + Sync,
    D: Destination + Sync,
{
    pub fn new(
        config: PipelineConfig,
        indices: IndexSet,
        source: Src,
        state_store: St,
        destination: D,
    ) -> Self {
        let retry_policy = RetryPolicy::from(&config.retry);

        Self {
            config,
            indices,
            source,
            progress: ProgressState::new(state_store),
            loader: IndexLoader::new(destination),
            retry_policy,
            holds_running_flag: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &Src {
        &self.source
    }

    pub fn progress(&self) -> &ProgressState<St> {
        &self.progress
    }

    pub fn destination(&self) -> &D {
        self.loader.destination()
    }

    /// Runs one cycle without retrying.
    ///
    /// On failure the running flag is released (best effort) and the error is returned. Chunks
    /// loaded before the failure stay recorded so the next attempt skips them.
    pub async fn run_cycle(&self) -> EtlResult<CycleOutcome> {
        // The watermark of this cycle is captured before resolving, so that changes made while
        // the cycle runs are picked up by the next one.
        let started_at = Utc::now();

        // A flag this pipeline failed to release earlier would otherwise look like a cycle
        // run by someone else.
        if self.holds_running_flag.load(Ordering::SeqCst) {
            self.progress.release_running().await?;
            self.holds_running_flag.store(false, Ordering::SeqCst);
        }

        match self
            .progress
            .try_acquire_running(self.config.stale_running_flag())
            .await?
        {
            RunningFlagAcquisition::Held { since } => {
                info!(running_since = ?since, "another indexing cycle is running, skipping");
                return Ok(CycleOutcome::Skipped);
            }
            RunningFlagAcquisition::TakenOver { .. } | RunningFlagAcquisition::Acquired => {
                self.holds_running_flag.store(true, Ordering::SeqCst);
            }
        }

        info!(%started_at, "starting indexing cycle");

        let film_works = match self.sync_film_works(started_at).await {
            Ok(film_works) => film_works,
            Err(err) => {
                self.release_running_flag().await;
                return Err(err);
            }
        };

        let genres = self.sync_genres().await?;

        info!(film_works, genres, "indexing cycle completed");

        Ok(CycleOutcome::Completed { film_works, genres })
    }

    /// Runs one cycle, re-running it after transient failures.
    pub async fn run_cycle_with_retry(&self) -> EtlResult<CycleOutcome> {
        self.retry_policy.run(|| self.run_cycle()).await
    }

    /// Runs cycles separated by the configured pause until `shutdown` fires.
    ///
    /// A cycle interrupted by shutdown releases the running flag it holds. Errors that are
    /// not retried end the loop.
    pub async fn run(&self, mut shutdown: ShutdownRx) -> EtlResult<()> {
        info!(
            sleep_ms = self.config.sleep_ms,
            chunk_size = self.config.batch.max_size,
            movies_index = %self.indices.movies.name,
            genres_index = %self.indices.genres.name,
            "starting indexing loop"
        );

        while !shutdown.is_shutdown() {
            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    info!("shutdown requested while a cycle was running");
                    self.release_running_flag().await;
                    break;
                }
                outcome = self.run_cycle_with_retry() => {
                    outcome?;
                }
            }

            tokio::select! {
                biased;

                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.config.sleep()) => {}
            }
        }

        info!("indexing loop stopped");

        Ok(())
    }

    /// Loads every pending film work and commits the cycle. Returns the number of documents
    /// written.
    async fn sync_film_works(&self, started_at: DateTime<Utc>) -> EtlResult<usize> {
        let cycle_start = self.progress.begin_cycle(started_at).await?;
        let since = self.progress.watermark().await?;
        let completed = self.progress.completed_ids().await?;
        if !completed.is_empty() {
            info!(
                completed = completed.len(),
                "resuming an interrupted cycle"
            );
        }

        let pending = resolve(&self.source, since, &completed).await?;
        info!(?since, pending = pending.len(), "resolved film works to index");

        let movies = &self.indices.movies;
        let mut chunks = extract_film_works(&self.source, pending, self.config.batch.max_size);
        let mut schema_ensured = false;
        let mut loaded = 0;

        while let Some(rows) = chunks.try_next().await? {
            let documents = transform_film_works(rows)?;

            if !schema_ensured {
                self.loader.ensure_schema(movies).await?;
                schema_ensured = true;
            }

            let ids = self.loader.load(&movies.name, &documents).await?;
            loaded += ids.len();

            let completed = self.progress.record_completed(ids).await?;
            debug!(loaded, completed = completed.len(), "recorded loaded chunk");
        }

        let watermark = self.progress.commit_cycle(cycle_start).await?;
        self.holds_running_flag.store(false, Ordering::SeqCst);
        info!(%watermark, loaded, "film works committed");

        Ok(loaded)
    }

    /// Resyncs every genre. Returns the number of documents written.
    async fn sync_genres(&self) -> EtlResult<usize> {
        let genres = &self.indices.genres;
        let mut chunks = extract_genres(&self.source, self.config.batch.max_size);
        let mut schema_ensured = false;
        let mut loaded = 0;

        while let Some(rows) = chunks.try_next().await? {
            let documents = transform_genres(rows)?;

            if !schema_ensured {
                self.loader.ensure_schema(genres).await?;
                schema_ensured = true;
            }

            loaded += self.loader.load(&genres.name, &documents).await?.len();
        }

        info!(loaded, "genres synchronized");

        Ok(loaded)
    }

    async fn release_running_flag(&self) {
        if !self.holds_running_flag.load(Ordering::SeqCst) {
            return;
        }

        match self.progress.release_running().await {
            Ok(()) => self.holds_running_flag.store(false, Ordering::SeqCst),
            Err(err) => warn!(error = %err, "failed to release the running flag"),
        }
    }
}
