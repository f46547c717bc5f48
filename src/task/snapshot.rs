use crate::task::error::FactoryError;
use crate::task::state::{LegacyStateFlags, StateLike, TaskState};
use crate::task::tree::Task;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Persisted, JSON-shaped form of a task tree.
///
/// Current snapshots carry `state`; older ones carry the `completed`,
/// `timedOut` and `rejected` flags plus `error` and `reason`. Both are
/// accepted, and `state` wins when present. Slave tasks are never part of a
/// snapshot.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskLike {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateLike>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timed_out: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, alias = "total")]
    pub total_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub began: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub took: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_tasks: Vec<TaskLike>,
    /// Whether the task's definition had an execute function
    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TaskLike {
    pub fn from_json(json: &str) -> Result<Self, FactoryError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self, FactoryError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Parse either a single snapshot or an array of snapshots
    pub fn parse_many(json: &str) -> Result<Vec<Self>, FactoryError> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(Self::from_value)
                .collect(),
            single => Ok(vec![Self::from_value(single)?]),
        }
    }

    /// Decode the state, from `state` or else from the legacy flags
    pub fn task_state(&self) -> TaskState {
        if let Some(state) = &self.state {
            return TaskState::from_like(state);
        }
        TaskState::from_legacy(&LegacyStateFlags {
            completed: self.completed.unwrap_or(false),
            timed_out: self.timed_out.unwrap_or(false),
            rejected: self.rejected.unwrap_or(false),
            error: self.error.clone(),
            reason: self.reason.clone(),
        })
    }

    pub fn sub_task(&self, name: &str) -> Option<&TaskLike> {
        let name = name.trim();
        self.sub_tasks.iter().find(|like| like.name.trim() == name)
    }
}

impl Task {
    pub fn to_like(&self) -> TaskLike {
        let data = self.read();
        TaskLike {
            name: self.name().to_string(),
            state: Some(data.state.to_like()),
            attempts: data.attempts,
            total_attempts: data.total_attempts,
            began: data.began,
            took: data.took,
            ended: data.ended,
            sub_tasks: self.sub_tasks().iter().map(Task::to_like).collect(),
            executable: self.is_executable(),
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_like())
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_like())
    }

    /// Overwrite state, counters and timestamps of this tree with those of
    /// `like`, matching sub-tasks by name. Applies to this tree only, never
    /// to slaves.
    pub(crate) fn copy_from_like(&self, like: &TaskLike) {
        {
            let mut data = self.write();
            data.state = like.task_state();
            data.attempts = like.attempts;
            data.total_attempts = like.total_attempts.max(like.attempts);
            data.began = like.began;
            data.took = like.took;
            data.ended = like.ended;
        }

        for sub_like in &like.sub_tasks {
            match self.sub_task(&sub_like.name) {
                Some(child) => child.copy_from_like(sub_like),
                None => debug!(
                    "Ignoring snapshot of sub-task '{}' with no counterpart under '{}'",
                    sub_like.name,
                    self.path()
                ),
            }
        }
    }
}
