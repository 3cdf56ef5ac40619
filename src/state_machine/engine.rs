use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::handler::StateHandler;
use super::signal::StopSignal;
use super::state::{Next, State};
use super::table::TransitionTable;
use crate::error::EngineError;

/// Interprets a transition table for one job at a time.
///
/// A machine is owned by a single worker and reused across jobs. Only the
/// [`StopSignal`] is shared with other tasks; the table, handlers and
/// current state are touched by the owner alone.
pub struct StateMachine {
    job_id: i64,
    current: State,
    previous: State,
    table: TransitionTable,
    handlers: HashMap<State, Arc<dyn StateHandler>>,
    signal: Arc<StopSignal>,
    history: Vec<State>,
    // Whether the exit handler of `current` has already been called.
    exited: bool,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            job_id: 0,
            current: State::Pending,
            previous: State::Pending,
            table: TransitionTable::new(),
            handlers: HashMap::new(),
            signal: Arc::new(StopSignal::new()),
            history: Vec::new(),
            exited: false,
        }
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn current(&self) -> State {
        self.current
    }

    pub fn previous(&self) -> State {
        self.previous
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// States entered since the last bind, starting with the state the
    /// machine was bound in.
    pub fn history(&self) -> &[State] {
        &self.history
    }

    /// Handle through which other tasks can stop the bound job.
    pub fn stop_signal(&self) -> Arc<StopSignal> {
        Arc::clone(&self.signal)
    }

    /// Binds the machine to a new job and clears everything left by the
    /// previous one. The machine starts over in `Pending`.
    pub fn bind(&mut self, job_id: i64) {
        self.signal.bind(job_id);
        self.job_id = job_id;
        self.current = State::Pending;
        self.previous = State::Pending;
        self.table.clear();
        self.handlers.clear();
        self.history.clear();
        self.history.push(State::Pending);
        self.exited = false;
    }

    /// Allows `from → to` and binds `handler` to `to`.
    pub fn add_transition(&mut self, from: State, to: State, handler: Arc<dyn StateHandler>) {
        self.table.add(from, to);
        self.handlers.insert(to, handler);
    }

    pub fn remove_transition(&mut self, from: State, to: State) {
        self.table.remove(from, to);
    }

    /// Binds a handler without adding any edge. Used for forced states.
    pub fn set_handler(&mut self, state: State, handler: Arc<dyn StateHandler>) {
        self.handlers.insert(state, handler);
    }

    /// Requests a stop of `job_id` if this machine is still bound to it.
    pub fn stop(&self, job_id: i64) {
        debug!(job_id, "trying to stop the job");
        self.signal.request_stop(job_id);
    }

    /// Moves from the current state to `target` and returns what the
    /// target's handler proposes next.
    ///
    /// Fails without touching any state or handler when `target` is neither
    /// a listed successor nor a forced state.
    pub async fn enter_state(&mut self, target: State) -> Result<Next, EngineError> {
        let job_id = self.job_id;
        debug!(job_id, from = %self.current, to = %target, "transiting");

        if !self.table.allows(self.current, target) && !target.is_forced() {
            return Err(EngineError::Transition {
                job_id,
                from: self.current,
                to: target,
            });
        }

        self.exit_current().await?;
        self.enter_target(target).await
    }

    async fn exit_current(&mut self) -> Result<(), EngineError> {
        let state = self.current;
        self.exited = true;
        match self.handlers.get(&state).cloned() {
            Some(handler) => handler.exit().await.map_err(|source| EngineError::Handler {
                job_id: self.job_id,
                state,
                source,
            }),
            None => {
                debug!(job_id = self.job_id, state = %state, "no handler found, skip exit");
                Ok(())
            }
        }
    }

    async fn enter_target(&mut self, target: State) -> Result<Next, EngineError> {
        let job_id = self.job_id;
        let next = match self.handlers.get(&target).cloned() {
            Some(handler) => handler
                .enter()
                .await
                .map_err(|source| EngineError::Handler {
                    job_id,
                    state: target,
                    source,
                })?,
            None => {
                debug!(job_id, state = %target, "no handler found, skip enter");
                Next::Continue
            }
        };

        self.previous = self.current;
        self.current = target;
        self.exited = false;
        self.history.push(target);
        debug!(job_id, state = %target, next = %next, "transition succeeded");
        Ok(next)
    }

    /// Forced entry into `Error` after a failed run. The current state is
    /// exited at most once; a failing exit here does not keep the machine
    /// out of `Error`.
    async fn enter_error(&mut self) -> Result<Next, EngineError> {
        if !self.exited
            && let Err(err) = self.exit_current().await
        {
            warn!(job_id = self.job_id, error = %err, "exit failed while entering error state");
        }
        self.enter_target(State::Error).await
    }

    /// Drives the machine from `initial` until a handler reports `Done` or
    /// something fails. Failures force one attempt to enter `Error`, so a
    /// failing `enter` or `exit` both end the run there.
    ///
    /// Returns the state the machine ended in.
    pub async fn start(&mut self, initial: State) -> State {
        let mut step = self.enter_state(initial).await;

        let failure = loop {
            let proposed = match step {
                Ok(Next::Done) => break None,
                Ok(next) => next,
                Err(err) => break Some(err),
            };
            let target = match self.resolve(proposed) {
                Ok(target) => target,
                Err(err) => break Some(err),
            };
            step = self.enter_state(target).await;
        };

        if let Some(err) = failure {
            warn!(job_id = self.job_id, error = %err, "entering error state");
            if let Err(err) = self.enter_error().await {
                error!(job_id = self.job_id, error = %err, "failed to enter error state");
            }
        }
        self.current
    }

    /// Picks the state to enter after a handler proposed `proposed`.
    ///
    /// A pending stop request wins over the handler. `Continue` needs the
    /// current state to have exactly one successor.
    fn resolve(&self, proposed: Next) -> Result<State, EngineError> {
        if let Some(desired) = self.signal.take_desired() {
            debug!(
                job_id = self.job_id,
                desired = %desired,
                ignored = %proposed,
                "desired state overrides handler"
            );
            return Ok(desired);
        }

        match proposed {
            Next::Goto(state) => Ok(state),
            Next::Continue => match self.table.sole_successor(self.current) {
                Some(state) => {
                    debug!(job_id = self.job_id, state = %state, "continue to sole successor");
                    Ok(state)
                }
                None => Err(EngineError::Undecidable {
                    job_id: self.job_id,
                    state: self.current,
                    candidates: self.table.successor_count(self.current),
                }),
            },
            // The run loop exits on `Done` before resolving.
            Next::Done => Ok(self.current),
        }
    }
}
