//! Job, policy, project and target records and the data layer that holds them.
//!
//! [`JobStore`] is the seam to whatever persists these records. The crate
//! ships [`MemoryStore`], which the CLI fills from a TOML seed file.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::state_machine::State;

/// A replication job: copy or delete tags of one repository on a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepJob {
    pub id: i64,
    pub policy_id: i64,
    pub repository: String,
    /// `transfer` or `delete`, as submitted.
    pub operation: String,
    /// Tags to process. Empty means every tag of the repository.
    pub tags: Vec<String>,
    pub status: State,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a job record about to be inserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub policy_id: i64,
    pub repository: String,
    pub operation: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A replication request as submitted by a user. Without a repository it
/// stands for every repository of the policy's project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub policy_id: i64,
    #[serde(default)]
    pub repository: Option<String>,
    // Ignored when `repository` is absent: those jobs always transfer.
    #[serde(default = "default_operation")]
    pub operation: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

// Operation used when a request names none.
fn default_operation() -> String {
    "transfer".to_string()
}

/// A project groups repositories under a common `<name>/` prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepProject {
    pub id: i64,
    pub name: String,
}

/// Binds a project to a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepPolicy {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub project_id: i64,
    pub target_id: i64,
    pub enabled: bool,
}

/// A remote registry. `password` is stored encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepTarget {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn add_job(&self, job: NewJob) -> Result<i64, StoreError>;

    async fn get_job(&self, id: i64) -> Result<Option<RepJob>, StoreError>;

    async fn get_policy(&self, id: i64) -> Result<Option<RepPolicy>, StoreError>;

    async fn get_target(&self, id: i64) -> Result<Option<RepTarget>, StoreError>;

    async fn get_project(&self, id: i64) -> Result<Option<RepProject>, StoreError>;

    async fn update_job_status(&self, id: i64, status: State) -> Result<(), StoreError>;

    /// Jobs of the policy that have not reached a terminal status.
    async fn jobs_to_stop(&self, policy_id: i64) -> Result<Vec<RepJob>, StoreError>;
}

/// Initial contents for a [`MemoryStore`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub targets: Vec<RepTarget>,
    #[serde(default)]
    pub policies: Vec<RepPolicy>,
    #[serde(default)]
    pub projects: Vec<RepProject>,
    #[serde(default)]
    pub jobs: Vec<JobRequest>,
}

impl Seed {
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[derive(Debug, Default)]
struct Tables {
    next_job_id: i64,
    jobs: HashMap<i64, RepJob>,
    policies: HashMap<i64, RepPolicy>,
    projects: HashMap<i64, RepProject>,
    targets: HashMap<i64, RepTarget>,
    status_log: Vec<(i64, State)>,
}

/// In-process store. Every status update is also appended to a log that
/// can be inspected with [`MemoryStore::status_log`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from the seed's targets, policies and projects. The
    /// seed's job requests are handed back for submission, in seed order.
    pub fn from_seed(seed: Seed) -> (Self, Vec<JobRequest>) {
        let store = Self::new();
        {
            let mut tables = store.lock();
            for target in seed.targets {
                tables.targets.insert(target.id, target);
            }
            for policy in seed.policies {
                tables.policies.insert(policy.id, policy);
            }
            for project in seed.projects {
                tables.projects.insert(project.id, project);
            }
        }
        (store, seed.jobs)
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_policy(&self, policy: RepPolicy) {
        self.lock().policies.insert(policy.id, policy);
    }

    pub fn insert_target(&self, target: RepTarget) {
        self.lock().targets.insert(target.id, target);
    }

    pub fn insert_project(&self, project: RepProject) {
        self.lock().projects.insert(project.id, project);
    }

    pub fn jobs(&self) -> Vec<RepJob> {
        let mut jobs: Vec<RepJob> = self.lock().jobs.values().cloned().collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// Statuses written for `job_id`, oldest first.
    pub fn status_log(&self, job_id: i64) -> Vec<State> {
        self.lock()
            .status_log
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

impl Tables {
    fn insert_job(&mut self, job: NewJob) -> i64 {
        self.next_job_id += 1;
        let id = self.next_job_id;
        let now = Utc::now();
        self.jobs.insert(
            id,
            RepJob {
                id,
                policy_id: job.policy_id,
                repository: job.repository,
                operation: job.operation,
                tags: job.tags,
                status: State::Pending,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn add_job(&self, job: NewJob) -> Result<i64, StoreError> {
        Ok(self.lock().insert_job(job))
    }

    async fn get_job(&self, id: i64) -> Result<Option<RepJob>, StoreError> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn get_policy(&self, id: i64) -> Result<Option<RepPolicy>, StoreError> {
        Ok(self.lock().policies.get(&id).cloned())
    }

    async fn get_target(&self, id: i64) -> Result<Option<RepTarget>, StoreError> {
        Ok(self.lock().targets.get(&id).cloned())
    }

    async fn get_project(&self, id: i64) -> Result<Option<RepProject>, StoreError> {
        Ok(self.lock().projects.get(&id).cloned())
    }

    async fn update_job_status(&self, id: i64, status: State) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let job = tables.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        job.status = status;
        job.updated_at = Utc::now();
        tables.status_log.push((id, status));
        Ok(())
    }

    async fn jobs_to_stop(&self, policy_id: i64) -> Result<Vec<RepJob>, StoreError> {
        let mut jobs: Vec<RepJob> = self
            .lock()
            .jobs
            .values()
            .filter(|job| job.policy_id == policy_id && !job.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }
}
