//! Fixed pool of workers, each reusing one [`StateMachine`] across jobs.
//!
//! Job ids reach the workers through a bounded queue. [`Scheduler::schedule`]
//! reports a full queue instead of blocking; [`WorkerPool::submit`] waits for
//! room. Stop requests are broadcast to every machine; each one ignores ids
//! it is not bound to.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{ResetError, ScheduleError, StoreError, SubmitError};
use crate::registry::RegistryError;
use crate::replication::Operation;
use crate::services::Services;
use crate::state_machine::{State, StateMachine, StopSignal};
use crate::store::NewJob;

type Queue = Arc<Mutex<mpsc::Receiver<i64>>>;

/// Enqueues jobs for the pool. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    sender: Arc<StdMutex<Option<mpsc::Sender<i64>>>>,
}

impl Scheduler {
    /// Queues `job_id` without waiting.
    pub fn schedule(&self, job_id: i64) -> Result<(), ScheduleError> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(ScheduleError::Closed(job_id));
        };
        sender.try_send(job_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(id) => ScheduleError::QueueFull(id),
            mpsc::error::TrySendError::Closed(id) => ScheduleError::Closed(id),
        })?;
        debug!(job_id, "job scheduled");
        Ok(())
    }

    /// Queues `job_id`, waiting while the queue is full.
    pub async fn enqueue(&self, job_id: i64) -> Result<(), ScheduleError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            return Err(ScheduleError::Closed(job_id));
        };
        sender
            .send(job_id)
            .await
            .map_err(|e| ScheduleError::Closed(e.0))?;
        debug!(job_id, "job scheduled");
        Ok(())
    }

    fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

pub struct WorkerPool {
    scheduler: Scheduler,
    signals: Vec<Arc<StopSignal>>,
    workers: Vec<JoinHandle<()>>,
    services: Arc<Services>,
}

impl WorkerPool {
    /// Spawns `workers` workers on the current tokio runtime. At least one
    /// worker is started; the workers own the receiving end of the queue.
    pub fn start(workers: usize, queue_capacity: usize, services: Arc<Services>) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let queue: Queue = Arc::new(Mutex::new(receiver));

        let mut signals = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let machine = StateMachine::new();
            signals.push(machine.stop_signal());
            handles.push(tokio::spawn(run_worker(
                index,
                machine,
                Arc::clone(&queue),
                Arc::clone(&services),
            )));
        }
        info!(workers, queue_capacity, "worker pool started");

        Self {
            scheduler: Scheduler {
                sender: Arc::new(StdMutex::new(Some(sender))),
            },
            signals,
            workers: handles,
            services,
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    pub fn schedule(&self, job_id: i64) -> Result<(), ScheduleError> {
        self.scheduler.schedule(job_id)
    }

    /// Creates and schedules the jobs of a replication request and returns
    /// their ids.
    ///
    /// With a repository, one job carries `operation` and `tags`. Without
    /// one, every repository of the policy's project in the source registry
    /// gets a `transfer` job for all of its tags.
    pub async fn submit(
        &self,
        policy_id: i64,
        repository: Option<&str>,
        operation: Operation,
        tags: Vec<String>,
    ) -> Result<Vec<i64>, SubmitError> {
        let store = &self.services.store;
        let policy = store
            .get_policy(policy_id)
            .await?
            .ok_or(SubmitError::PolicyNotFound(policy_id))?;

        let jobs: Vec<NewJob> = match repository {
            Some(repository) => vec![NewJob {
                policy_id,
                repository: repository.to_string(),
                operation: operation.to_string(),
                tags,
            }],
            None => self
                .project_repositories(policy.project_id)
                .await?
                .into_iter()
                .map(|repository| NewJob {
                    policy_id,
                    repository,
                    operation: Operation::Transfer.to_string(),
                    tags: Vec::new(),
                })
                .collect(),
        };

        let mut ids = Vec::with_capacity(jobs.len());
        for job in jobs {
            debug!(policy_id, repository = %job.repository, "creating job");
            let id = store.add_job(job).await?;
            self.scheduler.enqueue(id).await?;
            ids.push(id);
        }
        info!(policy_id, jobs = ?ids, "replication request submitted");
        Ok(ids)
    }

    /// Repositories of the project, as listed by the source registry.
    async fn project_repositories(&self, project_id: i64) -> Result<Vec<String>, SubmitError> {
        let services = &self.services;
        let project = services
            .store
            .get_project(project_id)
            .await?
            .ok_or(SubmitError::ProjectNotFound(project_id))?;
        let listing_failed = |source: RegistryError| SubmitError::RepositoryList {
            project: project.name.clone(),
            source,
        };

        let source = services
            .connector
            .connect(&services.source_url, services.source_credential.clone())
            .map_err(listing_failed)?;
        let prefix = format!("{}/", project.name);
        let repositories: Vec<String> = source
            .list_repositories()
            .await
            .map_err(listing_failed)?
            .into_iter()
            .filter(|repository| repository.starts_with(&prefix))
            .collect();
        debug!(project = %project.name, ?repositories, "repository list");
        Ok(repositories)
    }

    /// Asks every machine to stop any of `job_ids` it is running. Returns
    /// immediately; matching jobs reach `Stopped` at their next state boundary.
    pub fn stop_jobs(&self, job_ids: &[i64]) {
        for &job_id in job_ids {
            for signal in &self.signals {
                signal.request_stop(job_id);
            }
        }
    }

    /// Stops the policy's jobs that have not finished yet. Returns their ids.
    ///
    /// Jobs still waiting in the queue are not bound to a machine, so the
    /// request does not reach them.
    pub async fn stop_policy(&self, policy_id: i64) -> Result<Vec<i64>, StoreError> {
        let ids: Vec<i64> = self
            .services
            .store
            .jobs_to_stop(policy_id)
            .await?
            .into_iter()
            .map(|job| job.id)
            .collect();
        info!(policy_id, jobs = ?ids, "stopping jobs of policy");
        self.stop_jobs(&ids);
        Ok(ids)
    }

    /// Stops accepting jobs, lets the workers drain the queue and waits for
    /// them to exit.
    pub async fn shutdown(self) {
        self.scheduler.close();
        for (index, handle) in self.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!(worker = index, error = %e, "worker task failed");
            }
        }
        info!("worker pool stopped");
    }
}

async fn run_worker(index: usize, mut machine: StateMachine, queue: Queue, services: Arc<Services>) {
    debug!(worker = index, "worker started");
    loop {
        let job_id = {
            let mut queue = queue.lock().await;
            queue.recv().await
        };
        let Some(job_id) = job_id else {
            break;
        };
        run_job(index, &mut machine, job_id, &services).await;
    }
    debug!(worker = index, "worker exiting, queue closed");
}

async fn run_job(worker: usize, machine: &mut StateMachine, job_id: i64, services: &Services) {
    info!(worker, job_id, "worker picked up job");

    let end = match machine.reset(job_id, services).await {
        Ok(params) if !params.enabled => {
            info!(worker, job_id, "policy disabled, canceling job");
            machine.start(State::Canceled).await
        }
        Ok(_) => machine.start(State::Running).await,
        Err(err) => {
            error!(worker, job_id, error = %err, "failed to reset state machine");
            if !matches!(err, ResetError::JobNotFound(_)) {
                if let Err(e) = services.store.update_job_status(job_id, State::Error).await {
                    warn!(worker, job_id, error = %e, "failed to mark job as error");
                }
            }
            return;
        }
    };
    info!(worker, job_id, state = %end, "worker finished job");
}
