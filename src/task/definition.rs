use crate::task::error::{DefinitionError, ExecutionError};
use crate::task::execution::Produced;
use crate::task::tree::Task;
use anyhow::Result as AnyResult;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::debug;

/// Caller-supplied business logic of an executable task.
///
/// It receives the task it runs on behalf of and the work item it was
/// invoked with (`Value::Null` when there is none).
pub type ExecuteFn = Arc<dyn Fn(&Task, &Value) -> AnyResult<Produced> + Send + Sync>;

/// Renders a work item for log messages
pub type DescribeItemFn = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Wrap a closure as an [`ExecuteFn`]
pub fn execute_fn<F>(f: F) -> ExecuteFn
where
    F: Fn(&Task, &Value) -> AnyResult<Produced> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Optional settings recognised when defining a task
#[derive(Clone, Default)]
pub struct DefineSettings {
    /// Create the sub-definition without appending it to its parent's children
    pub skip_add_to_parent: bool,
    pub describe_item: Option<DescribeItemFn>,
}

impl DefineSettings {
    pub fn skip_add_to_parent() -> Self {
        Self {
            skip_add_to_parent: true,
            ..Default::default()
        }
    }

    pub fn with_describe_item<F>(mut self, describe: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.describe_item = Some(Arc::new(describe));
        self
    }
}

/// Immutable, named node of a task definition tree.
///
/// A node is either executable (it holds an [`ExecuteFn`]) or managed (it
/// is driven externally). `TaskDef` is a cheap handle; two handles are equal
/// only if they refer to the very same node.
#[derive(Clone)]
pub struct TaskDef(Arc<TaskDefNode>);

struct TaskDefNode {
    name: String,
    execute: Option<ExecuteFn>,
    describe_item: Option<DescribeItemFn>,
    unusable: bool,
    parent: Weak<TaskDefNode>,
    children: RwLock<Vec<TaskDef>>,
}

impl TaskDef {
    /// Define a root task
    pub fn define_task(
        name: &str,
        execute: Option<ExecuteFn>,
        settings: DefineSettings,
    ) -> Result<Self, DefinitionError> {
        let name = validate_name(name)?;
        debug!("Defined root task '{}'", name);
        Ok(Self::new_node(
            name,
            execute,
            settings.describe_item,
            false,
            Weak::new(),
        ))
    }

    /// Define a root task with no execute function
    pub fn define_managed(name: &str, settings: DefineSettings) -> Result<Self, DefinitionError> {
        Self::define_task(name, None, settings)
    }

    /// Define a sub-task of this definition.
    ///
    /// The name is trimmed and must be unique among this node's sub-tasks.
    pub fn define_sub_task(
        &self,
        name: &str,
        execute: Option<ExecuteFn>,
        settings: DefineSettings,
    ) -> Result<TaskDef, DefinitionError> {
        let name = validate_name(name)?;
        let describe_item = settings
            .describe_item
            .or_else(|| self.0.describe_item.clone());

        let mut children = self.write_children();
        if children.iter().any(|child| child.name() == name) {
            return Err(DefinitionError::DuplicateName {
                parent: self.name().to_string(),
                name,
            });
        }

        let child = Self::new_node(
            name,
            execute,
            describe_item,
            self.0.unusable,
            Arc::downgrade(&self.0),
        );
        if !settings.skip_add_to_parent {
            children.push(child.clone());
        }
        debug!("Defined sub-task '{}'", child.path());
        Ok(child)
    }

    /// Define several managed sub-tasks at once.
    ///
    /// Either every name is accepted or none is: on any blank name, or any
    /// name clashing with an existing sibling or another name in the batch,
    /// this definition is left unchanged.
    pub fn define_sub_tasks(&self, names: &[&str]) -> Result<Vec<TaskDef>, DefinitionError> {
        let mut children = self.write_children();

        let mut proposed: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = validate_name(name)?;
            if children.iter().any(|child| child.name() == name) || proposed.contains(&name) {
                return Err(DefinitionError::DuplicateName {
                    parent: self.name().to_string(),
                    name,
                });
            }
            proposed.push(name);
        }

        let created: Vec<TaskDef> = proposed
            .into_iter()
            .map(|name| {
                Self::new_node(
                    name,
                    None,
                    self.0.describe_item.clone(),
                    self.0.unusable,
                    Arc::downgrade(&self.0),
                )
            })
            .collect();
        children.extend(created.iter().cloned());
        Ok(created)
    }

    /// Attach a sub-definition that was created with `skip_add_to_parent`
    pub fn add_sub_task(&self, child: &TaskDef) -> Result<(), DefinitionError> {
        if child.parent().as_ref() != Some(self) {
            return Err(DefinitionError::NotChildOf {
                parent: self.name().to_string(),
                child: child.name().to_string(),
            });
        }
        ensure_all_task_defs_distinct(self, child)?;

        let mut children = self.write_children();
        if children.iter().any(|existing| existing.name() == child.name()) {
            return Err(DefinitionError::DuplicateName {
                parent: self.name().to_string(),
                name: child.name().to_string(),
            });
        }
        children.push(child.clone());
        Ok(())
    }

    pub(crate) fn reconstructed(name: &str, executable: bool, parent: Option<&TaskDef>) -> Self {
        let execute = executable.then(unusable_execute_fn);
        match parent {
            Some(parent) => {
                let child = Self::new_node(
                    name.trim().to_string(),
                    execute,
                    None,
                    true,
                    Arc::downgrade(&parent.0),
                );
                parent.write_children().push(child.clone());
                child
            }
            None => Self::new_node(name.trim().to_string(), execute, None, true, Weak::new()),
        }
    }

    fn new_node(
        name: String,
        execute: Option<ExecuteFn>,
        describe_item: Option<DescribeItemFn>,
        unusable: bool,
        parent: Weak<TaskDefNode>,
    ) -> Self {
        TaskDef(Arc::new(TaskDefNode {
            name,
            execute,
            describe_item,
            unusable,
            parent,
            children: RwLock::new(Vec::new()),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Slash-separated names from the root down to this node
    pub fn path(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}/{}", parent.path(), self.name()),
            None => self.name().to_string(),
        }
    }

    pub fn parent(&self) -> Option<TaskDef> {
        self.0.parent.upgrade().map(TaskDef)
    }

    pub fn sub_task_defs(&self) -> Vec<TaskDef> {
        self.0
            .children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sub_task_def(&self, name: &str) -> Option<TaskDef> {
        let name = name.trim();
        self.sub_task_defs()
            .into_iter()
            .find(|child| child.name() == name)
    }

    pub fn is_executable(&self) -> bool {
        self.0.execute.is_some()
    }

    pub fn is_managed(&self) -> bool {
        self.0.execute.is_none()
    }

    /// True for definitions rebuilt from a snapshot, whose callbacks are placeholders
    pub fn is_unusable(&self) -> bool {
        self.0.unusable
    }

    pub fn execute_fn(&self) -> Option<ExecuteFn> {
        self.0.execute.clone()
    }

    pub fn describe_item(&self) -> Option<DescribeItemFn> {
        self.0.describe_item.clone()
    }

    /// Root of this definition's tree
    pub fn root(&self) -> TaskDef {
        get_root_task_def(self).unwrap_or_else(|| self.clone())
    }

    pub fn ptr_eq(&self, other: &TaskDef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// True if `other` is this node or any node below it
    pub fn contains(&self, other: &TaskDef) -> bool {
        self.ptr_eq(other)
            || self
                .sub_task_defs()
                .iter()
                .any(|child| child.contains(other))
    }

    fn write_children(&self) -> std::sync::RwLockWriteGuard<'_, Vec<TaskDef>> {
        self.0
            .children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for TaskDef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for TaskDef {}

impl Hash for TaskDef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

impl fmt::Debug for TaskDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDef")
            .field("name", &self.name())
            .field("executable", &self.is_executable())
            .field("unusable", &self.is_unusable())
            .field("sub_tasks", &self.sub_task_defs())
            .finish()
    }
}

fn validate_name(name: &str) -> Result<String, DefinitionError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DefinitionError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

fn unusable_execute_fn() -> ExecuteFn {
    execute_fn(|task: &Task, _item: &Value| {
        Err(anyhow::Error::new(ExecutionError::Unusable {
            task: task.name().to_string(),
        }))
    })
}

/// Walk parent links from `start` to the top of its chain.
///
/// Every visited node is remembered, so the walk terminates on any input
/// and returns `None` as soon as a node would be visited twice.
pub fn walk_to_root<T, F>(start: T, parent_of: F) -> Option<T>
where
    T: Clone + Eq + Hash,
    F: Fn(&T) -> Option<T>,
{
    let mut visited = HashSet::new();
    let mut current = start;
    loop {
        if !visited.insert(current.clone()) {
            return None;
        }
        match parent_of(&current) {
            Some(parent) => current = parent,
            None => return Some(current),
        }
    }
}

/// Root of the definition tree containing `def`, or `None` on a cyclic parent chain
pub fn get_root_task_def(def: &TaskDef) -> Option<TaskDef> {
    walk_to_root(def.clone(), TaskDef::parent)
}

/// Refuse to attach `proposed` under `parent` when it is the same node,
/// one of `parent`'s ancestors, or already somewhere below `parent`.
pub fn ensure_all_task_defs_distinct(
    parent: &TaskDef,
    proposed: &TaskDef,
) -> Result<(), DefinitionError> {
    let not_distinct = || DefinitionError::NotDistinct {
        parent: parent.name().to_string(),
        proposed: proposed.name().to_string(),
    };

    if parent.ptr_eq(proposed) || parent.contains(proposed) {
        return Err(not_distinct());
    }

    let mut visited = HashSet::new();
    let mut ancestor = parent.parent();
    while let Some(node) = ancestor {
        if !visited.insert(node.clone()) {
            return Err(DefinitionError::CyclicParentChain {
                name: parent.name().to_string(),
            });
        }
        if node.ptr_eq(proposed) {
            return Err(not_distinct());
        }
        ancestor = node.parent();
    }
    Ok(())
}
