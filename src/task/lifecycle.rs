//! State transitions of a [`Task`].
//!
//! Every public mutator is a silent no-op on a frozen task. On a master it is
//! applied to the master and then to each transitive slave, and each member
//! evaluates the guards against its own state, so branches that already
//! reached an incompatible state are left as they are.

use crate::task::state::{StateKind, TaskState};
use crate::task::tree::{Task, TaskData};
use crate::task::types::{CompleteOptions, TimeoutOptions};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

impl Task {
    /// Begin a new attempt at `at`.
    ///
    /// Applies to Unstarted, Failed and TimedOut tasks. Calling it again on a
    /// Started task keeps the original `began`.
    pub fn start(&self, at: DateTime<Utc>) {
        self.fan_out(|task| task.start_local(at));
    }

    /// Send every incomplete task in this sub-tree back to Unstarted.
    ///
    /// Attempt counters are left alone.
    pub fn reset(&self) {
        self.fan_out(|task| {
            for node in task.all_tasks() {
                node.reset_local();
            }
        });
    }

    pub fn complete(&self, result: Value, options: CompleteOptions) {
        self.complete_as("Completed", result, options);
    }

    pub fn succeed(&self, result: Value, options: CompleteOptions) {
        self.complete_as("Succeeded", result, options);
    }

    pub fn complete_as(&self, name: &str, result: Value, options: CompleteOptions) {
        let state = TaskState::completed_as(name);
        let now = Utc::now();
        self.fan_out(|task| task.complete_local(&state, &result, options, now));
    }

    pub fn fail(&self, error: impl std::fmt::Display) {
        self.fail_as("Failed", error);
    }

    /// Record a failure. A later failure replaces an earlier success; the
    /// first of several failures is kept.
    pub fn fail_as(&self, name: &str, error: impl std::fmt::Display) {
        let state = TaskState::failed_as(name, error);
        let now = Utc::now();
        self.fan_out(|task| task.fail_local(&state, now));
    }

    pub fn timeout(&self, error: Option<String>, options: TimeoutOptions) {
        self.timeout_as("TimedOut", error, options);
    }

    pub fn timeout_as(&self, name: &str, error: Option<String>, options: TimeoutOptions) {
        let state = TaskState::timed_out_as(name, error);
        let now = Utc::now();
        self.fan_out(|task| task.timeout_local(&state, options, now));
    }

    pub fn reject(&self, reason: &str, error: Option<String>, recurse: bool) -> usize {
        self.reject_as("Rejected", reason, error, recurse)
    }

    pub fn discard(&self, reason: &str, error: Option<String>, recurse: bool) -> usize {
        self.reject_as("Discarded", reason, error, recurse)
    }

    pub fn abandon(&self, reason: &str, error: Option<String>, recurse: bool) -> usize {
        self.reject_as("Abandoned", reason, error, recurse)
    }

    /// Move this task, and with `recurse` its incomplete sub-tasks first, to
    /// a Rejected-kind state. Returns how many tasks actually changed,
    /// slaves included.
    pub fn reject_as(&self, name: &str, reason: &str, error: Option<String>, recurse: bool) -> usize {
        let state = TaskState::rejected_as(name, reason, error);
        let now = Utc::now();
        let mut rejected = 0;
        self.fan_out(|task| rejected += task.reject_tree(&state, recurse, now));
        rejected
    }

    /// Latch this task and its sub-tree against any further state change
    pub fn freeze(&self) {
        self.fan_out(|task| {
            for node in task.all_tasks() {
                node.write().frozen = true;
            }
        });
    }

    pub fn increment_attempts(&self) {
        self.fan_out(|task| {
            let mut data = task.write();
            data.attempts = data.attempts.saturating_add(1);
            data.total_attempts = data.total_attempts.saturating_add(1);
        });
    }

    /// Undo the most recent [`Task::increment_attempts`]
    pub fn decrement_attempts(&self) {
        self.fan_out(|task| decrement(&mut task.write()));
    }

    /// Restart the current attempt counter at zero, keeping `total_attempts`
    pub fn revert_attempts(&self) {
        self.fan_out(|task| task.write().attempts = 0);
    }

    /// Complete after a successful execution, unless something else already
    /// decided this task's fate.
    pub fn complete_task_if_necessary(&self, result: Value) -> bool {
        let kind = self.kind();
        if self.is_frozen() || !(kind.is_started() || kind.is_unstarted()) {
            debug!("Task '{}' is already {}, not completing it", self.path(), kind);
            return false;
        }
        self.complete(result, CompleteOptions::default());
        self.completed()
    }

    /// Fail after an unsuccessful execution, unless a failure, timeout or
    /// rejection is already recorded.
    pub fn fail_task_if_necessary(&self, error: impl std::fmt::Display) -> bool {
        let kind = self.kind();
        if self.is_frozen() || matches!(kind, StateKind::Rejected | StateKind::Failed | StateKind::TimedOut) {
            debug!("Task '{}' is already {}, not failing it with: {}", self.path(), kind, error);
            return false;
        }
        self.fail(error);
        self.failed()
    }

    fn fan_out<F>(&self, mut apply: F)
    where
        F: FnMut(&Task),
    {
        if self.is_frozen() {
            debug!("Task '{}' is frozen, ignoring state change", self.path());
            return;
        }
        for member in self.group() {
            if member.is_frozen() {
                continue;
            }
            apply(&member);
        }
    }

    fn start_local(&self, at: DateTime<Utc>) {
        let mut data = self.write();
        match data.state.kind() {
            StateKind::Unstarted | StateKind::Failed | StateKind::TimedOut => {
                data.state = TaskState::started();
                data.attempts = data.attempts.saturating_add(1);
                data.total_attempts = data.total_attempts.saturating_add(1);
                data.began = Some(at);
                data.ended = None;
                data.took = None;
                data.result = None;
                debug!("Started task '{}' (attempt {})", self.name(), data.attempts);
            }
            kind => debug!("Task '{}' is already {}, not starting it", self.name(), kind),
        }
    }

    fn reset_local(&self) {
        let mut data = self.write();
        if data.frozen {
            return;
        }
        if data.state.is_incomplete() && !data.state.is_unstarted() {
            debug!("Reset task '{}' from {}", self.name(), data.state);
            data.state = TaskState::UNSTARTED;
        }
    }

    fn complete_local(
        &self,
        state: &TaskState,
        result: &Value,
        options: CompleteOptions,
        now: DateTime<Utc>,
    ) {
        let mut data = self.write();
        match data.state.kind() {
            StateKind::Rejected => {
                warn!("Task '{}' is rejected, ignoring completion as {}", self.name(), state.name());
                return;
            }
            StateKind::TimedOut if !options.override_timed_out => {
                debug!("Task '{}' timed out, ignoring completion as {}", self.name(), state.name());
                return;
            }
            _ => {}
        }
        data.state = state.clone();
        data.result = Some(result.clone());
        finish(&mut data, now);
        debug!("Task '{}' is now {}", self.name(), data.state);
    }

    fn fail_local(&self, state: &TaskState, now: DateTime<Utc>) {
        let mut data = self.write();
        match data.state.kind() {
            StateKind::Rejected => {
                warn!("Task '{}' is rejected, ignoring failure: {}", self.name(), state);
            }
            StateKind::Failed | StateKind::TimedOut => {
                debug!("Task '{}' is already {}, keeping it", self.name(), data.state);
            }
            _ => {
                data.state = state.clone();
                data.result = None;
                finish(&mut data, now);
                debug!("Task '{}' is now {}", self.name(), data.state);
            }
        }
    }

    fn timeout_local(&self, state: &TaskState, options: TimeoutOptions, now: DateTime<Utc>) {
        let mut data = self.write();
        let skip = match data.state.kind() {
            StateKind::Rejected => {
                warn!("Task '{}' is rejected, ignoring timeout", self.name());
                true
            }
            StateKind::TimedOut => true,
            StateKind::Completed => !options.override_completed,
            StateKind::Unstarted => !options.override_unstarted,
            StateKind::Started | StateKind::Failed => false,
        };
        if skip {
            debug!("Task '{}' stays {} instead of timing out", self.name(), data.state);
            return;
        }
        data.state = state.clone();
        data.result = None;
        finish(&mut data, now);
        if options.reverse_attempt {
            decrement(&mut data);
        }
        debug!("Task '{}' is now {}", self.name(), data.state);
    }

    fn reject_tree(&self, state: &TaskState, recurse: bool, now: DateTime<Utc>) -> usize {
        let mut rejected = 0;
        if recurse {
            for child in self.sub_tasks() {
                if !child.is_frozen() {
                    rejected += child.reject_tree(state, recurse, now);
                }
            }
        }

        let mut data = self.write();
        if data.state.is_incomplete() {
            data.state = state.clone();
            data.result = None;
            finish(&mut data, now);
            debug!("Task '{}' is now {}", self.name(), data.state);
            rejected += 1;
        }
        rejected
    }
}

fn finish(data: &mut TaskData, now: DateTime<Utc>) {
    data.ended = Some(now);
    data.took = data
        .began
        .map(|began| u64::try_from((now - began).num_milliseconds()).unwrap_or(0));
}

fn decrement(data: &mut TaskData) {
    data.attempts = data.attempts.saturating_sub(1);
    data.total_attempts = data.total_attempts.saturating_sub(1);
}
