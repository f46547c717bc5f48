use crate::task::execution::ReturnMode;
use serde::{Deserialize, Serialize};

/// Guards for `complete`, `succeed` and `complete_as`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompleteOptions {
    /// Allow a TimedOut task to be completed
    #[serde(default)]
    pub override_timed_out: bool,
}

impl CompleteOptions {
    pub fn override_timed_out() -> Self {
        Self {
            override_timed_out: true,
        }
    }
}

/// Guards for `timeout` and `timeout_as`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimeoutOptions {
    /// Allow a Completed task to be timed out
    #[serde(default)]
    pub override_completed: bool,
    /// Apply the timeout even if the task never started
    #[serde(default)]
    pub override_unstarted: bool,
    /// Undo the attempt counted by the timed-out run
    #[serde(default)]
    pub reverse_attempt: bool,
}

/// Options for creating a single task tree
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Overrides the factory's return mode for adapters generated for this tree
    pub return_mode: Option<ReturnMode>,
}

impl CreateOptions {
    pub fn with_return_mode(return_mode: ReturnMode) -> Self {
        Self {
            return_mode: Some(return_mode),
        }
    }
}

/// Options for [`crate::task::TaskFactory::reincarnate_tasks`]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReincarnateOptions {
    /// Restart the current attempt counter at zero, keeping `total_attempts`
    #[serde(default)]
    pub revert_attempts: bool,
}
