//! Snapshot file handling for the command line
//!
//! Loads persisted task snapshots, rebuilds placeholder definitions for the
//! roots the user names as still active, and renders task trees as text.

use crate::task::{
    CreateOptions, DefineSettings, DefinitionError, FactoryError, ReincarnateOptions, Task,
    TaskDef, TaskFactory, TaskLike,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SnapshotFileError {
    #[error("Snapshot file '{path}' not found")]
    NotFound { path: PathBuf },

    #[error("IO error reading '{path}': {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Snapshot file '{path}' is invalid: {source}")]
    Invalid { path: PathBuf, source: FactoryError },

    #[error("Could not rebuild definition '{name}': {source}")]
    Definition {
        name: String,
        source: DefinitionError,
    },
}

/// Where each task ends up after a reincarnation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReincarnationReport {
    /// Incomplete tasks that will run again
    pub rerun: Vec<String>,
    /// Finalised tasks whose outcome is kept
    pub kept: Vec<String>,
    /// Roots with no active definition
    pub unusable: Vec<String>,
}

pub struct SnapshotLoader;

impl SnapshotLoader {
    /// Load one snapshot object or an array of them
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<TaskLike>, SnapshotFileError> {
        let path = path.as_ref().to_path_buf();
        debug!("Loading snapshot file: {:?}", path);

        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SnapshotFileError::NotFound { path: path.clone() },
            _ => SnapshotFileError::IoError {
                path: path.clone(),
                source: e,
            },
        })?;

        let snapshots = TaskLike::parse_many(&content)
            .map_err(|source| SnapshotFileError::Invalid { path: path.clone(), source })?;
        debug!("Loaded {} snapshot(s) from {:?}", snapshots.len(), path);
        Ok(snapshots)
    }

    /// Managed definitions for the named roots.
    ///
    /// A root that appears in `snapshots` gets the same sub-task names, so
    /// its history lines up with the new definition.
    pub fn active_defs(
        snapshots: &[TaskLike],
        names: &[String],
    ) -> Result<Vec<TaskDef>, SnapshotFileError> {
        names
            .iter()
            .map(|name| {
                let def = TaskDef::define_managed(name, DefineSettings::default()).map_err(
                    |source| SnapshotFileError::Definition {
                        name: name.clone(),
                        source,
                    },
                )?;
                if let Some(like) = snapshots.iter().find(|like| like.name.trim() == def.name()) {
                    mirror_sub_tasks(&def, like).map_err(|source| {
                        SnapshotFileError::Definition {
                            name: name.clone(),
                            source,
                        }
                    })?;
                }
                Ok(def)
            })
            .collect()
    }

    pub fn reincarnate(
        factory: &TaskFactory,
        snapshots: &[TaskLike],
        names: &[String],
        options: ReincarnateOptions,
    ) -> Result<(Vec<Task>, ReincarnationReport), SnapshotFileError> {
        let defs = Self::active_defs(snapshots, names)?;
        let tasks = factory.reincarnate_tasks(&defs, snapshots, options);

        let mut report = ReincarnationReport::default();
        for task in &tasks {
            if task.is_unusable() {
                report.unusable.push(task.path());
                continue;
            }
            for node in task.all_tasks() {
                if node.finalised() {
                    report.kept.push(node.path());
                } else {
                    report.rerun.push(node.path());
                }
            }
        }
        Ok((tasks, report))
    }

    pub fn rebuild(factory: &TaskFactory, snapshots: &[TaskLike]) -> Vec<Task> {
        snapshots
            .iter()
            .map(|like| factory.reconstruct_tasks_from_root_task_like(like, CreateOptions::default()))
            .collect()
    }
}

fn mirror_sub_tasks(def: &TaskDef, like: &TaskLike) -> Result<(), DefinitionError> {
    for sub_like in &like.sub_tasks {
        if def.sub_task_def(&sub_like.name).is_some() {
            continue;
        }
        let child = def.define_sub_task(&sub_like.name, None, DefineSettings::default())?;
        mirror_sub_tasks(&child, sub_like)?;
    }
    Ok(())
}

/// One line per task: indented name, state, attempts and timestamps
pub fn render_tree(task: &Task) -> Vec<String> {
    let mut lines = Vec::new();
    render_node(task, 0, &mut lines);
    lines
}

fn render_node(task: &Task, depth: usize, lines: &mut Vec<String>) {
    let mut line = format!(
        "{}{} [{}] attempts {}/{}",
        "  ".repeat(depth),
        task.name(),
        task.state(),
        task.attempts(),
        task.total_attempts()
    );
    if let Some(began) = task.began() {
        line.push_str(&format!(" began {}", began.to_rfc3339()));
    }
    if let Some(took) = task.took() {
        line.push_str(&format!(" took {}ms", took));
    }
    lines.push(line);

    for child in task.sub_tasks() {
        render_node(child, depth + 1, lines);
    }
}
