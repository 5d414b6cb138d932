//! The seam between the engine and the backing store.

use crate::planner::ChangeSet;
use anyhow::Result;
use async_trait::async_trait;

/// Backing store for structural changes.
///
/// `submit_moves` must apply the whole batch or report failure; the caller
/// rolls back every local change on any error.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn submit_moves(&self, changes: &ChangeSet) -> Result<()>;
}
