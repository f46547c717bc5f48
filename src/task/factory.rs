use crate::cli::config::FactoryConfig;
use crate::task::definition::{DescribeItemFn, ExecuteFn, TaskDef};
use crate::task::error::FactoryError;
use crate::task::execution::{DoneFlattenOptions, ExecuteAdapter, ReturnMode};
use crate::task::snapshot::TaskLike;
use crate::task::tree::{ExecutionSettings, Task};
use crate::task::types::{CreateOptions, ReincarnateOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Factory-wide settings that are not plain data
#[derive(Clone, Default)]
pub struct FactorySettings {
    /// Fallback item renderer for definitions that have none
    pub describe_item: Option<DescribeItemFn>,
}

/// Factory-wide options, loadable from configuration
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FactoryOptions {
    #[serde(default)]
    pub return_mode: ReturnMode,
    #[serde(default)]
    pub done: DoneFlattenOptions,
}

/// Builds task trees from definitions and snapshots, and wraps execute
/// functions into tracking adapters
#[derive(Clone, Default)]
pub struct TaskFactory {
    settings: FactorySettings,
    options: FactoryOptions,
}

impl TaskFactory {
    pub fn new(settings: FactorySettings, options: FactoryOptions) -> Self {
        Self { settings, options }
    }

    pub fn from_config(config: &FactoryConfig) -> Self {
        Self::new(FactorySettings::default(), config.to_options())
    }

    pub fn options(&self) -> FactoryOptions {
        self.options
    }

    /// Instantiate a fresh, Unstarted task tree mirroring `def`
    pub fn create_task(&self, def: &TaskDef, options: CreateOptions) -> Task {
        let task = Task::build(def, &self.execution_settings(options));
        debug!("Created task '{}'", task.path());
        task
    }

    /// Create a master over `slaves`, each of which must be bound to `def`
    pub fn create_master_task(
        &self,
        def: &TaskDef,
        slaves: Vec<Task>,
        options: CreateOptions,
    ) -> Result<Task, FactoryError> {
        for slave in &slaves {
            if !slave.definition().ptr_eq(def) {
                return Err(FactoryError::SlaveDefinitionMismatch {
                    master: def.name().to_string(),
                    slave: slave.path(),
                });
            }
        }
        let count = slaves.len();
        let master = Task::build_master(def, slaves, &self.execution_settings(options));
        debug!(
            "Created master task '{}' over {} slave(s) in state {}",
            master.path(),
            count,
            master.state()
        );
        Ok(master)
    }

    pub fn generate_execute(&self, task: &Task, execute: ExecuteFn) -> ExecuteAdapter {
        ExecuteAdapter::new(task.clone(), execute)
    }

    /// Rebuild an approximate definition tree from a snapshot.
    ///
    /// Every node is unusable; executable nodes get a placeholder execute
    /// function that always fails with [`crate::task::ExecutionError::Unusable`].
    pub fn reconstruct_task_defs_from_root_task_like(&self, like: &TaskLike) -> TaskDef {
        let root = TaskDef::reconstructed(&like.name, like.executable, None);
        reconstruct_sub_task_defs(&root, like);
        root
    }

    /// Rebuild a task tree, with its state, counters and timestamps, from a snapshot
    pub fn reconstruct_tasks_from_root_task_like(
        &self,
        like: &TaskLike,
        options: CreateOptions,
    ) -> Task {
        let def = self.reconstruct_task_defs_from_root_task_like(like);
        let task = Task::build(&def, &self.execution_settings(options));
        task.copy_from_like(like);
        task
    }

    /// Pair the currently active definitions with prior snapshots.
    ///
    /// Each active definition yields a fresh task that takes over the
    /// matching snapshot's state and is then reset, so interrupted work runs
    /// again while finalised work keeps its outcome. Snapshots with no active
    /// definition come back as unusable tasks, after the active ones.
    pub fn reincarnate_tasks(
        &self,
        active_defs: &[TaskDef],
        prior_snapshots: &[TaskLike],
        options: ReincarnateOptions,
    ) -> Vec<Task> {
        let mut tasks = Vec::with_capacity(active_defs.len() + prior_snapshots.len());
        let mut matched = vec![false; prior_snapshots.len()];

        for def in active_defs {
            let task = self.create_task(def, CreateOptions::default());
            let prior = prior_snapshots
                .iter()
                .enumerate()
                .find(|(index, like)| !matched[*index] && like.name.trim() == def.name());
            if let Some((index, like)) = prior {
                matched[index] = true;
                task.copy_from_like(like);
                if options.revert_attempts {
                    for node in task.all_tasks() {
                        node.revert_attempts();
                    }
                }
            }
            task.reset();
            tasks.push(task);
        }

        let mut unusable = 0;
        for (like, _) in prior_snapshots
            .iter()
            .zip(&matched)
            .filter(|(_, matched)| !**matched)
        {
            warn!(
                "No active definition for prior task '{}', keeping it as unusable history",
                like.name
            );
            tasks.push(self.reconstruct_tasks_from_root_task_like(like, CreateOptions::default()));
            unusable += 1;
        }

        info!(
            "Reincarnated {} task(s): {} active, {} unusable",
            tasks.len(),
            tasks.len() - unusable,
            unusable
        );
        tasks
    }

    fn execution_settings(&self, options: CreateOptions) -> ExecutionSettings {
        ExecutionSettings {
            return_mode: options.return_mode.unwrap_or(self.options.return_mode),
            done: self.options.done,
            describe_item: self.settings.describe_item.clone(),
        }
    }
}

fn reconstruct_sub_task_defs(parent: &TaskDef, like: &TaskLike) {
    for sub_like in &like.sub_tasks {
        if parent.sub_task_def(&sub_like.name).is_some() {
            warn!(
                "Skipping duplicate sub-task '{}' in snapshot of '{}'",
                sub_like.name,
                parent.path()
            );
            continue;
        }
        let child = TaskDef::reconstructed(&sub_like.name, sub_like.executable, Some(parent));
        reconstruct_sub_task_defs(&child, sub_like);
    }
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFactory")
            .field("options", &self.options)
            .field("describe_item", &self.settings.describe_item.is_some())
            .finish()
    }
}
