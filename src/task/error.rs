use std::sync::Arc;
use thiserror::Error;

/// Mistakes made while building a definition tree. These are caller
/// programming errors and are reported synchronously, never recovered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("task definition name must not be blank (got {0:?})")]
    InvalidName(String),

    #[error("task definition '{parent}' already has a sub-task named '{name}'")]
    DuplicateName { parent: String, name: String },

    #[error("task definition '{proposed}' cannot be attached under '{parent}': it is the same node, an ancestor or an existing descendant")]
    NotDistinct { parent: String, proposed: String },

    #[error("task definition '{child}' was not defined under '{parent}'")]
    NotChildOf { parent: String, child: String },

    #[error("task definition '{name}' has a cyclic parent chain")]
    CyclicParentChain { name: String },
}

/// Errors surfaced by an execution adapter.
///
/// `Frozen`, `Finalised`, `NotExecutable` and `Unusable` signal misuse by
/// the caller; `Failed` carries whatever the caller's execute function
/// returned as an error or rejected one of its futures with.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    #[error("task '{task}' is frozen and cannot be executed")]
    Frozen { task: String },

    #[error("task '{task}' is already fully finalised and cannot be executed again")]
    Finalised { task: String },

    #[error("task '{task}' is a managed task and has no execute function")]
    NotExecutable { task: String },

    #[error("task '{task}' was reconstructed from a snapshot and its original execute function is unavailable")]
    Unusable { task: String },

    #[error("{0}")]
    Failed(Arc<anyhow::Error>),
}

impl ExecutionError {
    /// True for the errors that signal caller misuse rather than business failure
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::Frozen { .. }
                | ExecutionError::Finalised { .. }
                | ExecutionError::NotExecutable { .. }
        )
    }

    /// Short stable label for logs
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecutionError::Frozen { .. } => "frozen",
            ExecutionError::Finalised { .. } => "finalised",
            ExecutionError::NotExecutable { .. } => "not_executable",
            ExecutionError::Unusable { .. } => "unusable",
            ExecutionError::Failed(_) => "failed",
        }
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<ExecutionError>() {
            Ok(execution_error) => execution_error,
            Err(error) => ExecutionError::Failed(Arc::new(error)),
        }
    }
}

/// Errors raised while assembling task trees
#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("slave task '{slave}' is not bound to the definition of master task '{master}'")]
    SlaveDefinitionMismatch { master: String, slave: String },

    #[error("task '{task}' already has slave tasks")]
    SlavesAlreadySet { task: String },

    #[error("making these tasks slaves of '{task}' would create a propagation cycle")]
    SlaveCycle { task: String },

    #[error("invalid task snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}
