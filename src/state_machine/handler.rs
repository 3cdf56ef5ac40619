use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::state::{Next, State};
use crate::error::HandlerError;
use crate::store::JobStore;

/// Logic bound to a state of the machine.
#[async_trait]
pub trait StateHandler: Send + Sync {
    /// Does the state's work and proposes what comes next.
    async fn enter(&self) -> Result<Next, HandlerError>;

    /// Cleans up when the machine leaves the state.
    async fn exit(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Persists a status on the job record when its state is entered.
///
/// `Running` continues into the graph; every other status ends the run.
pub struct StatusUpdater {
    job_id: i64,
    status: State,
    store: Arc<dyn JobStore>,
}

impl StatusUpdater {
    pub fn new(job_id: i64, status: State, store: Arc<dyn JobStore>) -> Self {
        Self {
            job_id,
            status,
            store,
        }
    }
}

#[async_trait]
impl StateHandler for StatusUpdater {
    async fn enter(&self) -> Result<Next, HandlerError> {
        self.store
            .update_job_status(self.job_id, self.status)
            .await?;
        debug!(job_id = self.job_id, status = %self.status, "job status updated");
        if self.status == State::Running {
            Ok(Next::Continue)
        } else {
            Ok(Next::Done)
        }
    }
}
