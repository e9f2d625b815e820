use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::EtlResult;
use crate::store::state::StateStore;

/// Start instant of the last fully committed cycle, RFC 3339.
pub const LAST_START_TIME_KEY: &str = "last_start_time";

/// Film work ids loaded by the cycle in progress.
pub const COMPLETED_IDS_KEY: &str = "completed_ids";

/// Whether a cycle is in progress.
pub const IS_RUNNING_KEY: &str = "is_running";

/// Instant at which the running flag was last acquired.
pub const RUNNING_SINCE_KEY: &str = "running_since";

/// Start instant of the cycle in progress, kept so that a resumed cycle commits the watermark
/// of the attempt that loaded the first chunks.
pub const CYCLE_STARTED_AT_KEY: &str = "cycle_started_at";

/// Result of trying to acquire the running flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningFlagAcquisition {
    Acquired,
    /// The flag was set by a cycle that has not finished for longer than the stale threshold.
    TakenOver { since: Option<DateTime<Utc>> },
    /// Another cycle holds the flag.
    Held { since: Option<DateTime<Utc>> },
}

/// Typed accessors over a [`StateStore`].
///
/// Every accessor reads the whole state, and every mutation performs a read-modify-write of
/// the whole state.
#[derive(Debug, Clone)]
pub struct ProgressState<S> {
    store: S,
}

impl<S> ProgressState<S>
where
    S: StateStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the value stored under `key`, or `None` when the key is absent or `null`.
    pub async fn get_state<T>(&self, key: &str) -> EtlResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let mut state = self.store.retrieve_state().await?;

        match state.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Stores `value` under `key`, keeping every other key untouched.
    pub async fn set_state<T>(&self, key: &str, value: T) -> EtlResult<()>
    where
        T: Serialize,
    {
        self.set_states(vec![(key, serde_json::to_value(value)?)])
            .await
    }

    /// Stores several values with a single write.
    pub async fn set_states(&self, values: Vec<(&str, Value)>) -> EtlResult<()> {
        let mut state = self.store.retrieve_state().await?;
        for (key, value) in values {
            state.insert(key.to_string(), value);
        }

        self.store.save_state(state).await
    }

    pub async fn watermark(&self) -> EtlResult<Option<DateTime<Utc>>> {
        self.get_state(LAST_START_TIME_KEY).await
    }

    pub async fn completed_ids(&self) -> EtlResult<BTreeSet<Uuid>> {
        Ok(self
            .get_state::<BTreeSet<Uuid>>(COMPLETED_IDS_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Adds `ids` to the persisted completed set and returns the resulting set.
    pub async fn record_completed(
        &self,
        ids: impl IntoIterator<Item = Uuid>,
    ) -> EtlResult<BTreeSet<Uuid>> {
        let mut completed = self.completed_ids().await?;
        completed.extend(ids);
        self.set_state(COMPLETED_IDS_KEY, &completed).await?;

        Ok(completed)
    }

    pub async fn is_running(&self) -> EtlResult<bool> {
        Ok(self.get_state(IS_RUNNING_KEY).await?.unwrap_or(false))
    }

    /// Sets the running flag unless a cycle started less than `stale_after` ago holds it.
    ///
    /// A flag without acquisition instant, left by an older deployment, is considered stale.
    pub async fn try_acquire_running(
        &self,
        stale_after: Duration,
    ) -> EtlResult<RunningFlagAcquisition> {
        let now = Utc::now();
        let since = self.get_state::<DateTime<Utc>>(RUNNING_SINCE_KEY).await?;

        let acquisition = if !self.is_running().await? {
            RunningFlagAcquisition::Acquired
        } else if is_stale(since, now, stale_after) {
            warn!(
                running_since = ?since,
                stale_after_ms = stale_after.as_millis() as u64,
                "taking over a running flag that was never released"
            );
            RunningFlagAcquisition::TakenOver { since }
        } else {
            return Ok(RunningFlagAcquisition::Held { since });
        };

        self.set_states(vec![
            (IS_RUNNING_KEY, Value::Bool(true)),
            (RUNNING_SINCE_KEY, serde_json::to_value(now)?),
        ])
        .await?;
        debug!(%now, "running flag acquired");

        Ok(acquisition)
    }

    pub async fn release_running(&self) -> EtlResult<()> {
        self.set_states(vec![
            (IS_RUNNING_KEY, Value::Bool(false)),
            (RUNNING_SINCE_KEY, Value::Null),
        ])
        .await
    }

    /// Returns the instant the watermark moves to when the cycle in progress commits.
    ///
    /// A cycle resuming with a non-empty completed set keeps the start of the interrupted
    /// attempt, so that changes made to already loaded film works while it ran are picked up
    /// by the next cycle.
    pub async fn begin_cycle(&self, started_at: DateTime<Utc>) -> EtlResult<DateTime<Utc>> {
        let previous = self
            .get_state::<DateTime<Utc>>(CYCLE_STARTED_AT_KEY)
            .await?;
        let resuming = !self.completed_ids().await?.is_empty();

        if let Some(previous) = previous.filter(|_| resuming) {
            return Ok(previous.min(started_at));
        }

        self.set_state(CYCLE_STARTED_AT_KEY, started_at).await?;

        Ok(started_at)
    }

    /// Completes a cycle with a single write: the watermark moves to `started_at` (never
    /// backward), the completed set is emptied and the running flag is released.
    pub async fn commit_cycle(&self, started_at: DateTime<Utc>) -> EtlResult<DateTime<Utc>> {
        let watermark = match self.watermark().await? {
            Some(current) if current >= started_at => current,
            _ => started_at,
        };

        self.set_states(vec![
            (LAST_START_TIME_KEY, serde_json::to_value(watermark)?),
            (COMPLETED_IDS_KEY, Value::Array(Vec::new())),
            (CYCLE_STARTED_AT_KEY, Value::Null),
            (IS_RUNNING_KEY, Value::Bool(false)),
            (RUNNING_SINCE_KEY, Value::Null),
        ])
        .await?;

        Ok(watermark)
    }
}

fn is_stale(since: Option<DateTime<Utc>>, now: DateTime<Utc>, stale_after: Duration) -> bool {
    let Some(since) = since else {
        return true;
    };

    match chrono::Duration::from_std(stale_after) {
        Ok(stale_after) => now - since >= stale_after,
        Err(_) => false,
    }
}
