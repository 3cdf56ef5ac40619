mod engine;
mod handler;
mod signal;
mod state;
mod table;

pub use engine::StateMachine;
pub use handler::{StateHandler, StatusUpdater};
pub use signal::StopSignal;
pub use state::{FORCED_STATES, Next, State};
pub use table::TransitionTable;
