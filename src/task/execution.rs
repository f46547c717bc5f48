use crate::task::definition::{DescribeItemFn, ExecuteFn};
use crate::task::error::ExecutionError;
use crate::task::tree::Task;
use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt, Shared, join_all};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// A value that will be available later; cloneable so that the caller and
/// the done composite can both observe it.
pub type PendingValue = Shared<BoxFuture<'static, Result<Value, ExecutionError>>>;

/// Settles once every value produced by one execution has settled
pub type DoneFuture = Shared<BoxFuture<'static, Result<Vec<Value>, ExecutionError>>>;

/// What an execute function hands back when it does not fail outright
#[derive(Clone)]
pub enum Produced {
    Value(Value),
    Pending(PendingValue),
    All(Vec<Produced>),
}

impl Produced {
    pub fn value(value: impl Into<Value>) -> Self {
        Produced::Value(value.into())
    }

    /// Wrap a future; its error becomes [`ExecutionError::Failed`] unless it
    /// already is an `ExecutionError`
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Produced::Pending(
            future
                .map(|result| result.map_err(ExecutionError::from))
                .boxed()
                .shared(),
        )
    }

    pub fn all(items: impl IntoIterator<Item = Produced>) -> Self {
        Produced::All(items.into_iter().collect())
    }

    /// True once nothing in here is left to wait for
    pub fn is_settled(&self) -> bool {
        match self {
            Produced::Value(_) => true,
            Produced::Pending(pending) => pending.peek().is_some(),
            Produced::All(items) => items.iter().all(Produced::is_settled),
        }
    }

    /// Resolve to a single value; `All` resolves to an array and fails
    /// with the first failing element in list order.
    pub fn settle(self) -> BoxFuture<'static, Result<Value, ExecutionError>> {
        match self {
            Produced::Value(value) => future::ready(Ok(value)).boxed(),
            Produced::Pending(pending) => pending.boxed(),
            Produced::All(items) => join_all(items.into_iter().map(Produced::settle))
                .map(|results| {
                    results
                        .into_iter()
                        .collect::<Result<Vec<_>, _>>()
                        .map(Value::Array)
                })
                .boxed(),
        }
    }

    fn into_elements(self, flatten_nested: bool) -> Vec<Produced> {
        match self {
            Produced::All(items) if flatten_nested => {
                let mut flat = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Produced::All(_) => flat.extend(item.into_elements(true)),
                        other => flat.push(other),
                    }
                }
                flat
            }
            Produced::All(items) => items,
            single => vec![single],
        }
    }
}

impl From<Value> for Produced {
    fn from(value: Value) -> Self {
        Produced::Value(value)
    }
}

impl fmt::Debug for Produced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Produced::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Produced::Pending(pending) => match pending.peek() {
                Some(settled) => f.debug_tuple("Pending").field(settled).finish(),
                None => f.write_str("Pending(..)"),
            },
            Produced::All(items) => f.debug_tuple("All").field(items).finish(),
        }
    }
}

/// Synchronous result of invoking an execute function
#[derive(Clone, Debug)]
pub enum Outcome {
    Success(Produced),
    Failure(ExecutionError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match self {
            Outcome::Failure(error) => Some(error),
            Outcome::Success(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Produced, ExecutionError> {
        match self {
            Outcome::Success(produced) => Ok(produced),
            Outcome::Failure(error) => Err(error),
        }
    }

    fn is_settled(&self) -> bool {
        match self {
            Outcome::Success(produced) => produced.is_settled(),
            Outcome::Failure(_) => true,
        }
    }
}

impl From<Result<Produced, ExecutionError>> for Outcome {
    fn from(result: Result<Produced, ExecutionError>) -> Self {
        match result {
            Ok(produced) => Outcome::Success(produced),
            Err(error) => Outcome::Failure(error),
        }
    }
}

/// How an adapter reports back to its caller
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReturnMode {
    /// Hand back exactly what the execute function returned, or its error
    #[default]
    Normal,
    /// Always hand back an [`Outcome`]
    SuccessOrFailure,
    /// Always hand back a future, even for synchronous results
    Promise,
}

impl fmt::Display for ReturnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReturnMode::Normal => write!(f, "normal"),
            ReturnMode::SuccessOrFailure => write!(f, "success_or_failure"),
            ReturnMode::Promise => write!(f, "promise"),
        }
    }
}

/// Shape of the done composite's element list
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DoneFlattenOptions {
    /// Lift the elements of nested `All` lists into the top-level list
    /// instead of resolving each nested list to one array value
    #[serde(default)]
    pub flatten_nested: bool,
}

/// What an adapter call returns, per [`ReturnMode`]
pub enum Returned {
    Normal(Result<Produced, ExecutionError>),
    Outcome(Outcome),
    Future(BoxFuture<'static, Result<Value, ExecutionError>>),
}

impl Returned {
    pub fn into_outcome(self) -> Outcome {
        match self {
            Returned::Normal(result) => result.into(),
            Returned::Outcome(outcome) => outcome,
            Returned::Future(future) => Outcome::Success(Produced::Pending(future.shared())),
        }
    }

    pub fn into_future(self) -> BoxFuture<'static, Result<Value, ExecutionError>> {
        match self.into_outcome() {
            Outcome::Success(produced) => produced.settle(),
            Outcome::Failure(error) => future::ready(Err(error)).boxed(),
        }
    }

    pub fn is_future(&self) -> bool {
        matches!(self, Returned::Future(_))
    }
}

impl fmt::Debug for Returned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Returned::Normal(result) => f.debug_tuple("Normal").field(result).finish(),
            Returned::Outcome(outcome) => f.debug_tuple("Outcome").field(outcome).finish(),
            Returned::Future(_) => f.write_str("Future(..)"),
        }
    }
}

/// Runs an execute function on behalf of a task and tracks the result on it
#[derive(Clone)]
pub struct ExecuteAdapter {
    task: Task,
    execute: ExecuteFn,
    return_mode: ReturnMode,
    done_options: DoneFlattenOptions,
    describe_item: Option<DescribeItemFn>,
}

impl ExecuteAdapter {
    pub(crate) fn new(task: Task, execute: ExecuteFn) -> Self {
        let settings = task.settings().clone();
        let describe_item = task
            .definition()
            .describe_item()
            .or(settings.describe_item);
        Self {
            task,
            execute,
            return_mode: settings.return_mode,
            done_options: settings.done,
            describe_item,
        }
    }

    pub fn with_return_mode(mut self, return_mode: ReturnMode) -> Self {
        self.return_mode = return_mode;
        self
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn return_mode(&self) -> ReturnMode {
        self.return_mode
    }

    /// Run the execute function for `item`.
    ///
    /// The task is started first. Its outcome and done composite are attached
    /// to the task before this returns, and the task is completed or failed
    /// when the composite settles. Results that are already settled are
    /// recorded before this returns.
    pub fn call(&self, item: &Value) -> Returned {
        let task = &self.task;
        if task.is_fully_finalised() {
            return refused(self.return_mode, ExecutionError::Finalised { task: task.path() });
        }
        if task.is_frozen() {
            return refused(self.return_mode, ExecutionError::Frozen { task: task.path() });
        }
        if task.is_unusable() {
            return refused(self.return_mode, ExecutionError::Unusable { task: task.path() });
        }

        task.start(Utc::now());
        debug!("Executing task '{}' for {}", task.path(), self.describe(item));

        let outcome: Outcome = (self.execute)(task, item)
            .map_err(ExecutionError::from)
            .into();
        if let Some(error) = outcome.error().filter(|error| error.is_protocol_error()) {
            warn!(
                "Execute function of '{}' surfaced a {} error: {}",
                task.path(),
                error.as_label(),
                error
            );
        }
        let single = !matches!(outcome, Outcome::Success(Produced::All(_)));
        let done = self.build_done(&outcome, single);
        let settled = outcome.is_settled();

        // Pending values handed out from here also drive the composite
        let outcome = match outcome {
            Outcome::Success(produced) => Outcome::Success(link_to_done(produced, &done)),
            failure => failure,
        };
        task.attach_execution(outcome.clone(), done.clone());
        drive(settled, &done);

        match self.return_mode {
            ReturnMode::Normal => Returned::Normal(outcome.into_result()),
            ReturnMode::SuccessOrFailure => Returned::Outcome(outcome),
            ReturnMode::Promise => match outcome {
                Outcome::Failure(error) => Returned::Future(future::ready(Err(error)).boxed()),
                Outcome::Success(_) => Returned::Future(
                    done.map(move |settled| settled.map(|values| shape(values, single)))
                        .boxed(),
                ),
            },
        }
    }

    fn build_done(&self, outcome: &Outcome, single: bool) -> DoneFuture {
        let elements: Vec<BoxFuture<'static, Result<Value, ExecutionError>>> = match outcome {
            Outcome::Success(produced) => produced
                .clone()
                .into_elements(self.done_options.flatten_nested)
                .into_iter()
                .map(Produced::settle)
                .collect(),
            Outcome::Failure(error) => vec![future::ready(Err(error.clone())).boxed()],
        };

        let task = self.task.downgrade();
        join_all(elements)
            .map(move |results| {
                let settled: Result<Vec<Value>, ExecutionError> = results.into_iter().collect();
                if let Some(task) = task.upgrade() {
                    match &settled {
                        Ok(values) => {
                            task.complete_task_if_necessary(shape(values.clone(), single));
                        }
                        Err(error) => {
                            task.fail_task_if_necessary(error);
                        }
                    }
                }
                settled
            })
            .boxed()
            .shared()
    }

    fn describe(&self, item: &Value) -> String {
        match (&self.describe_item, item) {
            (_, Value::Null) => "no item".to_string(),
            (Some(describe), item) => describe(item),
            (None, item) => item.to_string(),
        }
    }
}

impl fmt::Debug for ExecuteAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteAdapter")
            .field("task", &self.task.path())
            .field("return_mode", &self.return_mode)
            .field("done_options", &self.done_options)
            .finish()
    }
}

impl Task {
    /// Run this task's own execute function through a fresh adapter
    pub fn execute(&self, item: &Value) -> Returned {
        match self.definition().execute_fn() {
            Some(execute) => ExecuteAdapter::new(self.clone(), execute).call(item),
            None => refused(
                self.settings().return_mode,
                ExecutionError::NotExecutable { task: self.path() },
            ),
        }
    }
}

fn refused(return_mode: ReturnMode, error: ExecutionError) -> Returned {
    debug!("Refusing execution ({}): {}", error.as_label(), error);
    match return_mode {
        ReturnMode::Normal => Returned::Normal(Err(error)),
        ReturnMode::SuccessOrFailure => Returned::Outcome(Outcome::Failure(error)),
        ReturnMode::Promise => Returned::Future(future::ready(Err(error)).boxed()),
    }
}

fn shape(values: Vec<Value>, single: bool) -> Value {
    if single {
        values.into_iter().next().unwrap_or(Value::Null)
    } else {
        Value::Array(values)
    }
}

/// Chain every pending element to `done`: once the element's own value is
/// available, the composite is polled so the task records the outcome even
/// when nothing else drives it.
fn link_to_done(produced: Produced, done: &DoneFuture) -> Produced {
    match produced {
        Produced::Value(value) => Produced::Value(value),
        Produced::Pending(pending) => {
            let done = done.clone();
            Produced::Pending(
                async move {
                    let settled = pending.await;
                    let _ = done.now_or_never();
                    settled
                }
                .boxed()
                .shared(),
            )
        }
        Produced::All(items) => Produced::All(
            items
                .into_iter()
                .map(|item| link_to_done(item, done))
                .collect(),
        ),
    }
}

/// Settle the composite now if it can be, otherwise hand it to the current
/// Tokio runtime. Without a runtime it settles when first awaited.
fn drive(settled: bool, done: &DoneFuture) {
    let runtime = Handle::try_current().ok();
    if (runtime.is_some() || settled) && done.clone().now_or_never().is_some() {
        return;
    }
    if let Some(handle) = runtime {
        let done = done.clone();
        handle.spawn(async move {
            let _ = done.await;
        });
    }
}
