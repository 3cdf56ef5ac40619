use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every state a replication job can be in.
///
/// The status-bearing subset (`Pending`, `Running`, `Finished`, `Error`,
/// `Stopped`, `Canceled`) is what gets persisted on the job record; the
/// replication steps in between only exist inside a running machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Pending,
    Running,
    Check,
    PullManifest,
    TransferBlob,
    PushManifest,
    Delete,
    Finished,
    Error,
    Stopped,
    Canceled,
}

/// States reachable from any state, whether or not the table lists them.
pub const FORCED_STATES: [State; 3] = [State::Error, State::Stopped, State::Canceled];

impl State {
    pub const ALL: [State; 11] = [
        State::Pending,
        State::Running,
        State::Check,
        State::PullManifest,
        State::TransferBlob,
        State::PushManifest,
        State::Delete,
        State::Finished,
        State::Error,
        State::Stopped,
        State::Canceled,
    ];

    pub fn is_forced(self) -> bool {
        FORCED_STATES.contains(&self)
    }

    /// Whether a job in this state will never run again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            State::Finished | State::Error | State::Stopped | State::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Running => "running",
            State::Check => "check",
            State::PullManifest => "pull_manifest",
            State::TransferBlob => "transfer_blob",
            State::PushManifest => "push_manifest",
            State::Delete => "delete",
            State::Finished => "finished",
            State::Error => "error",
            State::Stopped => "stopped",
            State::Canceled => "canceled",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        State::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| format!("unknown state: {s}"))
    }
}

/// What a handler wants the machine to do after entering its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Move to this state.
    Goto(State),
    /// Move to the only successor listed in the table.
    Continue,
    /// Stop driving the machine; the job has reached its end.
    Done,
}

impl fmt::Display for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Next::Goto(state) => write!(f, "{state}"),
            Next::Continue => write!(f, "_continue"),
            Next::Done => write!(f, "<done>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_states_are_error_stopped_canceled() {
        let forced: Vec<State> = State::ALL.into_iter().filter(|s| s.is_forced()).collect();
        assert_eq!(forced, vec![State::Error, State::Stopped, State::Canceled]);
    }

    #[test]
    fn terminal_states() {
        assert!(State::Finished.is_terminal());
        assert!(State::Error.is_terminal());
        assert!(State::Stopped.is_terminal());
        assert!(State::Canceled.is_terminal());
        assert!(!State::Running.is_terminal());
        assert!(!State::PullManifest.is_terminal());
    }

    #[test]
    fn display_and_parse_agree() {
        for state in State::ALL {
            assert_eq!(state.to_string().parse::<State>().unwrap(), state);
        }
        assert!("_continue".parse::<State>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&State::PullManifest).unwrap();
        assert_eq!(json, r#""pull_manifest""#);
        let state: State = serde_json::from_str(r#""transfer_blob""#).unwrap();
        assert_eq!(state, State::TransferBlob);
    }
}
