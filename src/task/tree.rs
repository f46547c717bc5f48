use crate::task::definition::{DescribeItemFn, TaskDef, walk_to_root};
use crate::task::error::FactoryError;
use crate::task::execution::{DoneFlattenOptions, DoneFuture, Outcome, ReturnMode};
use crate::task::state::{StateKind, TaskState};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{
    Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};
use tracing::{debug, warn};

/// Runtime instance of a [`TaskDef`] tree.
///
/// `Task` is a cheap handle: clones share the same node. The node's sub-tasks
/// mirror its definition's children at construction time and never change
/// afterwards. A task that was given slave tasks is a master; every mutator
/// called on a master is applied to the master and then to each of its
/// slaves, transitively.
#[derive(Clone)]
pub struct Task(Arc<TaskInner>);

/// Non-owning reference to a task, used by futures that outlive a call
#[derive(Clone)]
pub(crate) struct WeakTask(Weak<TaskInner>);

struct TaskInner {
    name: String,
    definition: TaskDef,
    parent: Weak<TaskInner>,
    children: Vec<Task>,
    data: RwLock<TaskData>,
    slaves: OnceLock<Vec<Task>>,
    settings: ExecutionSettings,
}

/// How adapters generated for a task tree behave
#[derive(Clone, Default)]
pub(crate) struct ExecutionSettings {
    pub return_mode: ReturnMode,
    pub done: DoneFlattenOptions,
    pub describe_item: Option<DescribeItemFn>,
}

#[derive(Clone, Default)]
pub(crate) struct TaskData {
    pub state: TaskState,
    pub attempts: u32,
    pub total_attempts: u32,
    pub began: Option<DateTime<Utc>>,
    pub took: Option<u64>,
    pub ended: Option<DateTime<Utc>>,
    pub frozen: bool,
    pub result: Option<Value>,
    pub outcome: Option<Outcome>,
    pub done: Option<DoneFuture>,
}

impl Task {
    pub(crate) fn build(def: &TaskDef, settings: &ExecutionSettings) -> Task {
        Self::build_node(def, Weak::new(), settings)
    }

    fn build_node(def: &TaskDef, parent: Weak<TaskInner>, settings: &ExecutionSettings) -> Task {
        Task(Arc::new_cyclic(|me| TaskInner {
            name: def.name().to_string(),
            definition: def.clone(),
            parent,
            children: def
                .sub_task_defs()
                .iter()
                .map(|child| Self::build_node(child, me.clone(), settings))
                .collect(),
            data: RwLock::new(TaskData::default()),
            slaves: OnceLock::new(),
            settings: settings.clone(),
        }))
    }

    /// Build a master tree over `slaves`, which must already be bound to `def`.
    ///
    /// Each sub-task of the master becomes the master of the slaves'
    /// same-named sub-tasks.
    pub(crate) fn build_master(def: &TaskDef, slaves: Vec<Task>, settings: &ExecutionSettings) -> Task {
        Self::build_master_node(def, slaves, Weak::new(), settings)
    }

    fn build_master_node(
        def: &TaskDef,
        slaves: Vec<Task>,
        parent: Weak<TaskInner>,
        settings: &ExecutionSettings,
    ) -> Task {
        let data = seed_from_slaves(&slaves);
        Task(Arc::new_cyclic(|me| {
            let children = def
                .sub_task_defs()
                .iter()
                .map(|child_def| {
                    let child_slaves: Vec<Task> = slaves
                        .iter()
                        .filter_map(|slave| slave.sub_task(child_def.name()))
                        .collect();
                    Self::build_master_node(child_def, child_slaves, me.clone(), settings)
                })
                .collect();
            TaskInner {
                name: def.name().to_string(),
                definition: def.clone(),
                parent,
                children,
                data: RwLock::new(data),
                slaves: OnceLock::from(slaves),
                settings: settings.clone(),
            }
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn definition(&self) -> &TaskDef {
        &self.0.definition
    }

    /// Slash-separated names from the root task down to this one
    pub fn path(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}/{}", parent.path(), self.name()),
            None => self.name().to_string(),
        }
    }

    pub fn parent(&self) -> Option<Task> {
        self.0.parent.upgrade().map(Task)
    }

    pub fn sub_tasks(&self) -> &[Task] {
        &self.0.children
    }

    pub fn sub_task(&self, name: &str) -> Option<Task> {
        let name = name.trim();
        self.0
            .children
            .iter()
            .find(|child| child.name() == name)
            .cloned()
    }

    pub fn root(&self) -> Task {
        walk_to_root(self.clone(), Task::parent).unwrap_or_else(|| self.clone())
    }

    /// This task and all of its descendants, pre-order
    pub fn all_tasks(&self) -> Vec<Task> {
        let mut tasks = vec![self.clone()];
        for child in self.sub_tasks() {
            tasks.extend(child.all_tasks());
        }
        tasks
    }

    /// Find a descendant by a slash-separated path of sub-task names
    pub fn find(&self, path: &str) -> Option<Task> {
        path.split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .try_fold(self.clone(), |task, segment| task.sub_task(segment))
    }

    pub fn is_executable(&self) -> bool {
        self.0.definition.is_executable()
    }

    pub fn is_unusable(&self) -> bool {
        self.0.definition.is_unusable()
    }

    pub fn is_master(&self) -> bool {
        self.0.slaves.get().is_some()
    }

    pub fn slave_tasks(&self) -> Vec<Task> {
        self.0.slaves.get().cloned().unwrap_or_default()
    }

    /// Turn this task into a master of `slaves`. Allowed once per task.
    ///
    /// Sub-tasks that are not masters yet are paired with the slaves'
    /// same-named sub-tasks as well.
    pub fn set_slave_tasks(&self, slaves: Vec<Task>) -> Result<(), FactoryError> {
        if self.is_master() {
            return Err(FactoryError::SlavesAlreadySet {
                task: self.path(),
            });
        }
        for slave in &slaves {
            if !slave.definition().ptr_eq(self.definition()) {
                return Err(FactoryError::SlaveDefinitionMismatch {
                    master: self.path(),
                    slave: slave.path(),
                });
            }
            if slave.ptr_eq(self) || slave.group().iter().any(|member| member.ptr_eq(self)) {
                return Err(FactoryError::SlaveCycle { task: self.path() });
            }
        }

        for child in self.sub_tasks() {
            if child.is_master() {
                continue;
            }
            let child_slaves = slaves
                .iter()
                .filter_map(|slave| slave.sub_task(child.name()))
                .collect();
            if let Err(error) = child.set_slave_tasks(child_slaves) {
                warn!("Could not pair sub-task '{}' with its slaves: {}", child.path(), error);
            }
        }

        debug!("Task '{}' is now master of {} slave(s)", self.path(), slaves.len());
        self.0
            .slaves
            .set(slaves)
            .map_err(|_| FactoryError::SlavesAlreadySet { task: self.path() })
    }

    /// This task followed by every transitive slave, each exactly once
    pub(crate) fn group(&self) -> Vec<Task> {
        let mut seen = HashSet::new();
        let mut members = Vec::new();
        let mut pending = vec![self.clone()];
        while let Some(task) = pending.pop() {
            if !seen.insert(task.clone()) {
                continue;
            }
            if let Some(slaves) = task.0.slaves.get() {
                pending.extend(slaves.iter().rev().cloned());
            }
            members.push(task);
        }
        members
    }

    pub fn state(&self) -> TaskState {
        self.read().state.clone()
    }

    pub fn kind(&self) -> StateKind {
        self.read().state.kind()
    }

    pub fn attempts(&self) -> u32 {
        self.read().attempts
    }

    pub fn total_attempts(&self) -> u32 {
        self.read().total_attempts
    }

    pub fn began(&self) -> Option<DateTime<Utc>> {
        self.read().began
    }

    /// Milliseconds between `began` and `ended`
    pub fn took(&self) -> Option<u64> {
        self.read().took
    }

    pub fn ended(&self) -> Option<DateTime<Utc>> {
        self.read().ended
    }

    pub fn result(&self) -> Option<Value> {
        self.read().result.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.read().state.error().map(str::to_string)
    }

    pub fn reason(&self) -> Option<String> {
        self.read().state.reason().map(str::to_string)
    }

    /// Outcome of the most recent execution, if any
    pub fn outcome(&self) -> Option<Outcome> {
        self.read().outcome.clone()
    }

    /// Composite future of the most recent execution, if any
    pub fn done_future(&self) -> Option<DoneFuture> {
        self.read().done.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.read().frozen
    }

    pub fn unstarted(&self) -> bool {
        self.kind().is_unstarted()
    }

    pub fn started(&self) -> bool {
        self.kind().is_started()
    }

    pub fn completed(&self) -> bool {
        self.kind().is_completed()
    }

    pub fn failed(&self) -> bool {
        self.kind().is_failed()
    }

    pub fn timed_out(&self) -> bool {
        self.kind().is_timed_out()
    }

    pub fn rejected(&self) -> bool {
        self.kind().is_rejected()
    }

    pub fn incomplete(&self) -> bool {
        self.kind().is_incomplete()
    }

    pub fn finalised(&self) -> bool {
        self.kind().is_finalised()
    }

    /// Finalised, and so is every sub-task at any depth
    pub fn is_fully_finalised(&self) -> bool {
        self.finalised() && self.sub_tasks().iter().all(Task::is_fully_finalised)
    }

    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn settings(&self) -> &ExecutionSettings {
        &self.0.settings
    }

    pub(crate) fn downgrade(&self) -> WeakTask {
        WeakTask(Arc::downgrade(&self.0))
    }

    pub(crate) fn attach_execution(&self, outcome: Outcome, done: DoneFuture) {
        let mut data = self.write();
        data.outcome = Some(outcome);
        data.done = Some(done);
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, TaskData> {
        self.0.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, TaskData> {
        self.0.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WeakTask {
    pub(crate) fn upgrade(&self) -> Option<Task> {
        self.0.upgrade().map(Task)
    }
}

/// Initial data of a master: the least advanced state, the smallest attempt
/// counters and the timestamps of the most recently started slave.
fn seed_from_slaves(slaves: &[Task]) -> TaskData {
    let mut data = TaskData::default();
    if slaves.is_empty() {
        return data;
    }

    let snapshots: Vec<TaskData> = slaves.iter().map(|slave| slave.read().clone()).collect();
    data.attempts = snapshots.iter().map(|s| s.attempts).min().unwrap_or(0);
    data.total_attempts = snapshots.iter().map(|s| s.total_attempts).min().unwrap_or(0);
    if let Some(latest) = snapshots.iter().max_by_key(|s| s.began) {
        data.began = latest.began;
        data.took = latest.took;
        data.ended = latest.ended;
    }
    if let Some(least) = snapshots.iter().min_by_key(|s| s.state.kind()) {
        data.state = least.state.clone();
    }
    data
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.read();
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("state", &data.state)
            .field("attempts", &data.attempts)
            .field("total_attempts", &data.total_attempts)
            .field("frozen", &data.frozen)
            .field("master", &self.is_master())
            .field("sub_tasks", &self.sub_tasks())
            .finish()
    }
}
