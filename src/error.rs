use thiserror::Error;

use crate::registry::RegistryError;
use crate::state_machine::State;

/// Failure of the data layer holding job, policy and target records.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Failure while decrypting a stored credential.
#[derive(Debug, Error)]
#[error("Failed to decrypt password: {0}")]
pub struct DecryptError(pub String);

/// Failure inside a state handler's `enter` or `exit`.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Protocol(String),
}

/// Reasons a run ends up being forced into `Error`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Job id: {job_id}, transition from {from} to {to} does not exist")]
    Transition { job_id: i64, from: State, to: State },

    #[error("Job id: {job_id}, unable to continue from {state}: {candidates} possible next states")]
    Undecidable {
        job_id: i64,
        state: State,
        candidates: usize,
    },

    #[error("Job id: {job_id}, handler for {state} failed: {source}")]
    Handler {
        job_id: i64,
        state: State,
        #[source]
        source: HandlerError,
    },
}

/// Failure to bind a machine to a job before any run starts.
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("The job doesn't exist, job id: {0}")]
    JobNotFound(i64),

    #[error("The policy doesn't exist, policy id: {0}")]
    PolicyNotFound(i64),

    #[error("The target doesn't exist, target id: {0}")]
    TargetNotFound(i64),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Failure to hand a job to the worker pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Job queue is full, job {0} was not scheduled")]
    QueueFull(i64),

    #[error("Worker pool is shut down, job {0} was not scheduled")]
    Closed(i64),
}

/// Failure to turn a replication request into scheduled jobs.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Policy not found, id: {0}")]
    PolicyNotFound(i64),

    #[error("Project not found, id: {0}")]
    ProjectNotFound(i64),

    #[error("Failed to get repository list of project {project}: {source}")]
    RepositoryList {
        project: String,
        #[source]
        source: RegistryError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display() {
        let err = EngineError::Transition {
            job_id: 7,
            from: State::Check,
            to: State::Delete,
        };
        assert_eq!(
            err.to_string(),
            "Job id: 7, transition from check to delete does not exist"
        );

        let err = EngineError::Undecidable {
            job_id: 7,
            state: State::PullManifest,
            candidates: 2,
        };
        assert_eq!(
            err.to_string(),
            "Job id: 7, unable to continue from pull_manifest: 2 possible next states"
        );
    }

    #[test]
    fn handler_error_keeps_source() {
        let err = EngineError::Handler {
            job_id: 1,
            state: State::Running,
            source: HandlerError::Store(StoreError::JobNotFound(1)),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Store error: Job not found: 1");
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EngineError>();
        assert_send_sync::<ResetError>();
        assert_send_sync::<ScheduleError>();
    }
}
