//! Replication jobs: loading a job into a [`StateMachine`] and the graph of
//! handlers that copies or deletes a repository's tags on a target.

mod delete;
mod graph;
mod session;
mod transfer;

pub use delete::Deleter;
pub use graph::{Operation, build_graph};
pub use session::{PulledManifest, Session};
pub use transfer::{BlobTransfer, Checker, ManifestPuller, ManifestPusher};

use tracing::info;

use crate::error::ResetError;
use crate::registry::Credential;
use crate::services::Services;
use crate::state_machine::StateMachine;

/// Remote registry a job writes to, with its decrypted credential.
#[derive(Debug, Clone)]
pub struct TargetEndpoint {
    pub url: String,
    pub credential: Option<Credential>,
}

/// Everything loaded for a job when a machine is reset to it.
#[derive(Debug, Clone)]
pub struct JobParams {
    pub job_id: i64,
    pub repository: String,
    pub tags: Vec<String>,
    pub operation: String,
    pub enabled: bool,
    pub source_url: String,
    /// `None` when the policy is disabled; the target is never looked up.
    pub target: Option<TargetEndpoint>,
}

impl StateMachine {
    /// Binds the machine to `job_id`, loads the job's records and builds
    /// the graph for its operation.
    ///
    /// With a disabled policy only the status states are registered; the
    /// caller is expected to route the job straight to `Canceled`.
    pub async fn reset(&mut self, job_id: i64, services: &Services) -> Result<JobParams, ResetError> {
        self.bind(job_id);

        let store = &services.store;
        let job = store
            .get_job(job_id)
            .await?
            .ok_or(ResetError::JobNotFound(job_id))?;
        let policy = store
            .get_policy(job.policy_id)
            .await?
            .ok_or(ResetError::PolicyNotFound(job.policy_id))?;

        let mut params = JobParams {
            job_id,
            repository: job.repository,
            tags: job.tags,
            operation: job.operation,
            enabled: policy.enabled,
            source_url: services.source_url.clone(),
            target: None,
        };

        if policy.enabled {
            let target = store
                .get_target(policy.target_id)
                .await?
                .ok_or(ResetError::TargetNotFound(policy.target_id))?;
            let password = if target.password.is_empty() {
                String::new()
            } else {
                services.decryptor.decrypt(&target.password)?
            };
            let credential = if target.username.is_empty() && password.is_empty() {
                None
            } else {
                Some(Credential::Basic {
                    username: target.username,
                    password,
                })
            };
            params.target = Some(TargetEndpoint {
                url: target.url,
                credential,
            });
        }

        build_graph(self, &params, services)?;
        info!(
            job_id,
            repository = %params.repository,
            operation = %params.operation,
            enabled = params.enabled,
            "state machine reset"
        );
        Ok(params)
    }
}
