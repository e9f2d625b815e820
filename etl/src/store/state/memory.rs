use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::store::state::{StateMap, StateStore};

#[derive(Debug, Default)]
struct Inner {
    state: StateMap,
    /// Every saved state, oldest first.
    history: Vec<StateMap>,
    unavailable: bool,
}

/// Process local [`StateStore`], progress is lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `state`, as if a previous run had saved it.
    pub fn with_state(state: StateMap) -> Self {
        let inner = Inner {
            state,
            ..Inner::default()
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Returns every state saved so far, oldest first.
    pub async fn history(&self) -> Vec<StateMap> {
        self.inner.lock().await.history.clone()
    }

    /// Makes every following call fail as if the store was unreachable.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().await.unavailable = unavailable;
    }
}

impl StateStore for MemoryStateStore {
    async fn retrieve_state(&self) -> EtlResult<StateMap> {
        let inner = self.inner.lock().await;
        if inner.unavailable {
            bail!(
                ErrorKind::StateStoreConnectionFailed,
                "State store connection failed",
                "memory state store is unavailable"
            );
        }

        Ok(inner.state.clone())
    }

    async fn save_state(&self, state: StateMap) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.unavailable {
            bail!(
                ErrorKind::StateStoreConnectionFailed,
                "State store connection failed",
                "memory state store is unavailable"
            );
        }

        inner.history.push(state.clone());
        inner.state = state;

        Ok(())
    }
}
