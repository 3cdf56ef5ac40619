use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::state::State;

#[derive(Debug, Default)]
struct Binding {
    job_id: Option<i64>,
    desired: Option<State>,
}

/// The only piece of a machine shared across tasks: which job it is bound
/// to, and a pending stop request for that job.
///
/// The owning worker rebinds it on every reset; anyone holding a clone of
/// the `Arc` may request a stop. Requests for a job the machine is no
/// longer bound to are dropped.
#[derive(Debug, Default)]
pub struct StopSignal {
    inner: Mutex<Binding>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Binding> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds to `job_id` and discards any desired state left by the last job.
    pub fn bind(&self, job_id: i64) {
        let mut binding = self.lock();
        binding.job_id = Some(job_id);
        binding.desired = None;
    }

    pub fn bound_job(&self) -> Option<i64> {
        self.lock().job_id
    }

    /// Requests that the bound job moves to `Stopped` at its next state
    /// boundary. Returns whether the request matched the bound job.
    pub fn request_stop(&self, job_id: i64) -> bool {
        let mut binding = self.lock();
        if binding.job_id == Some(job_id) {
            binding.desired = Some(State::Stopped);
            debug!(job_id, "desired state set to stopped");
            true
        } else {
            debug!(
                job_id,
                bound = ?binding.job_id,
                "machine has switched to another job, stop request ignored"
            );
            false
        }
    }

    /// Reads and clears the desired state in one step.
    pub fn take_desired(&self) -> Option<State> {
        self.lock().desired.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_for_bound_job_is_recorded_once() {
        let signal = StopSignal::new();
        signal.bind(5);

        assert!(signal.request_stop(5));
        assert_eq!(signal.take_desired(), Some(State::Stopped));
        assert_eq!(signal.take_desired(), None);
    }

    #[test]
    fn stop_for_other_job_is_ignored() {
        let signal = StopSignal::new();
        signal.bind(5);

        assert!(!signal.request_stop(4));
        assert_eq!(signal.take_desired(), None);
    }

    #[test]
    fn unbound_signal_ignores_stops() {
        let signal = StopSignal::new();
        assert!(!signal.request_stop(1));
        assert_eq!(signal.bound_job(), None);
    }

    #[test]
    fn rebinding_clears_stale_request() {
        let signal = StopSignal::new();
        signal.bind(1);
        signal.request_stop(1);

        signal.bind(2);
        assert_eq!(signal.bound_job(), Some(2));
        assert_eq!(signal.take_desired(), None);
    }
}
