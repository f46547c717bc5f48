//! # Task Lifecycle
//!
//! Tracks the lifecycle of hierarchical, retryable and resumable tasks.
//! A task is an instance of a named definition tree. It moves through a
//! small state taxonomy, counts its attempts and can be executed redundantly
//! through master/slave ensembles. Task trees serialize to plain JSON and can
//! be rebuilt from it after a restart.
//!
//! ## Architecture Overview
//!
//! - **[`task`]**: States, definitions, the task state machine, the execution
//!   adapter, snapshots and the factory tying them together
//! - **[`cli`]**: Configuration discovery and the `tasklife` command line
//! - **[`env`]**: Path and naming constants
//!
//! ## Quick Start
//!
//! ```rust
//! use task_lifecycle::task::{
//!     CreateOptions, DefineSettings, Produced, TaskDef, TaskFactory, execute_fn,
//! };
//! use serde_json::{Value, json};
//!
//! let def = TaskDef::define_task(
//!     "greet",
//!     Some(execute_fn(|_task, _item| Ok(Produced::value("hello")))),
//!     DefineSettings::default(),
//! )
//! .unwrap();
//!
//! let factory = TaskFactory::default();
//! let task = factory.create_task(&def, CreateOptions::default());
//! task.execute(&Value::Null);
//!
//! assert!(task.completed());
//! assert_eq!(task.result(), Some(json!("hello")));
//! assert_eq!(task.attempts(), 1);
//! ```

/// Task state tracking.
///
/// Definitions, runtime tasks and their transitions, master/slave
/// propagation, the execution adapter, and snapshot reincarnation.
pub mod task;

/// Environment constants and path utilities.
pub mod env;

// CLI module for command-line interface
pub mod cli;

// Re-export main task types
pub use task::{
    ExecuteAdapter, Outcome, Produced, ReturnMode, StateKind, Task, TaskDef, TaskFactory,
    TaskLike, TaskState,
};

// Re-export configuration types
pub use cli::{ConfigDiscovery, FactoryConfig};
