use std::future::Future;

use serde_json::{Map, Value};

use crate::error::EtlResult;

/// Named state values persisted as a single JSON object.
pub type StateMap = Map<String, Value>;

/// Durable holder of the indexer progress.
///
/// The whole state is read and written as one value. There is no transactional guarantee
/// between a read and the following write, so concurrent writers can lose updates; the
/// running flag kept in the state prevents that in practice.
pub trait StateStore {
    /// Returns the last saved state, or an empty map when nothing was saved yet.
    fn retrieve_state(&self) -> impl Future<Output = EtlResult<StateMap>> + Send;

    /// Replaces the saved state with `state`.
    fn save_state(&self, state: StateMap) -> impl Future<Output = EtlResult<()>> + Send;
}
