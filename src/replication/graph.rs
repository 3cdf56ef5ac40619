use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::JobParams;
use super::delete::Deleter;
use super::session::Session;
use super::transfer::{BlobTransfer, Checker, ManifestPuller, ManifestPusher};
use crate::error::ResetError;
use crate::joblog::JobLog;
use crate::services::Services;
use crate::state_machine::{FORCED_STATES, State, StateHandler, StateMachine, StatusUpdater};

/// What a replication job does to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Transfer,
    Delete,
}

impl FromStr for Operation {
    type Err = ResetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(Operation::Transfer),
            "delete" => Ok(Operation::Delete),
            other => Err(ResetError::UnsupportedOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Transfer => write!(f, "transfer"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Registers the states and handlers of a job on a freshly bound machine.
///
/// Status states are always registered. The operation graph is only added
/// when the job has a target, i.e. when its policy is enabled.
pub fn build_graph(
    sm: &mut StateMachine,
    params: &JobParams,
    services: &Services,
) -> Result<(), ResetError> {
    let job_id = params.job_id;
    let status = |state: State| -> Arc<dyn StateHandler> {
        Arc::new(StatusUpdater::new(job_id, state, Arc::clone(&services.store)))
    };

    sm.add_transition(State::Pending, State::Running, status(State::Running));
    for forced in FORCED_STATES {
        sm.set_handler(forced, status(forced));
    }

    let Some(target) = &params.target else {
        return Ok(());
    };
    let log = JobLog::open(services.log_dir.as_deref(), job_id);

    match params.operation.parse::<Operation>()? {
        Operation::Transfer => {
            let source = services
                .connector
                .connect(&params.source_url, services.source_credential.clone())?;
            let target = services
                .connector
                .connect(&target.url, target.credential.clone())?;
            let session = Arc::new(Session::new(
                params.repository.clone(),
                params.tags.clone(),
                source,
                target,
                log,
            ));
            let puller: Arc<dyn StateHandler> = Arc::new(ManifestPuller::new(Arc::clone(&session)));

            sm.add_transition(
                State::Running,
                State::Check,
                Arc::new(Checker::new(Arc::clone(&session))),
            );
            sm.add_transition(State::Check, State::PullManifest, Arc::clone(&puller));
            sm.add_transition(
                State::PullManifest,
                State::TransferBlob,
                Arc::new(BlobTransfer::new(Arc::clone(&session))),
            );
            sm.add_transition(State::PullManifest, State::Finished, status(State::Finished));
            sm.add_transition(
                State::TransferBlob,
                State::PushManifest,
                Arc::new(ManifestPusher::new(session)),
            );
            sm.add_transition(State::PushManifest, State::PullManifest, puller);
        }
        Operation::Delete => {
            let target = services
                .connector
                .connect(&target.url, target.credential.clone())?;
            let deleter = Deleter::new(params.repository.clone(), params.tags.clone(), target, log);

            sm.add_transition(State::Running, State::Delete, Arc::new(deleter));
            sm.add_transition(State::Delete, State::Finished, status(State::Finished));
        }
    }
    Ok(())
}
