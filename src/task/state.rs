use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Abstract progress kind of a task state.
///
/// The declaration order is the "progress" ordering used when a master task
/// has to be seeded from the least advanced of its slaves. It carries no
/// business priority.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StateKind {
    Unstarted,
    Started,
    TimedOut,
    Failed,
    Completed,
    Rejected,
}

impl StateKind {
    /// Name used for a state of this kind when no explicit name is given
    pub fn default_name(&self) -> &'static str {
        match self {
            StateKind::Unstarted => "Unstarted",
            StateKind::Started => "Started",
            StateKind::TimedOut => "TimedOut",
            StateKind::Failed => "Failed",
            StateKind::Completed => "Completed",
            StateKind::Rejected => "Rejected",
        }
    }

    pub fn is_unstarted(&self) -> bool {
        matches!(self, StateKind::Unstarted)
    }

    pub fn is_started(&self) -> bool {
        matches!(self, StateKind::Started)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StateKind::Completed)
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, StateKind::TimedOut)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StateKind::Failed)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, StateKind::Rejected)
    }

    /// Anything that is neither Completed nor Rejected
    pub fn is_incomplete(&self) -> bool {
        !self.is_finalised()
    }

    /// Completed or Rejected
    pub fn is_finalised(&self) -> bool {
        matches!(self, StateKind::Completed | StateKind::Rejected)
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

/// Immutable value describing where a task currently is.
///
/// `error` is always captured as text at construction time so that a state
/// can be serialized at any moment. `reason` is only meaningful for
/// Rejected-kind states.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskState {
    name: Cow<'static, str>,
    kind: StateKind,
    error: Option<String>,
    reason: Option<String>,
}

impl TaskState {
    pub const UNSTARTED: TaskState = TaskState::canonical("Unstarted", StateKind::Unstarted);
    pub const COMPLETED: TaskState = TaskState::canonical("Completed", StateKind::Completed);
    pub const SUCCEEDED: TaskState = TaskState::canonical("Succeeded", StateKind::Completed);

    const fn canonical(name: &'static str, kind: StateKind) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
            error: None,
            reason: None,
        }
    }

    /// Generic constructor; prefer the named constructors below
    pub fn new(
        name: impl Into<String>,
        kind: StateKind,
        error: Option<String>,
        reason: Option<String>,
    ) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            kind,
            error,
            reason,
        }
    }

    pub fn started() -> Self {
        Self::canonical("Started", StateKind::Started)
    }

    pub fn completed_as(name: impl Into<String>) -> Self {
        let name = name.into();
        match name.as_str() {
            "Completed" => Self::COMPLETED,
            "Succeeded" => Self::SUCCEEDED,
            _ => Self::new(name, StateKind::Completed, None, None),
        }
    }

    pub fn failed(error: impl fmt::Display) -> Self {
        Self::failed_as("Failed", error)
    }

    pub fn failed_as(name: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::new(name, StateKind::Failed, Some(error.to_string()), None)
    }

    pub fn timed_out(error: Option<String>) -> Self {
        Self::timed_out_as("TimedOut", error)
    }

    pub fn timed_out_as(name: impl Into<String>, error: Option<String>) -> Self {
        Self::new(name, StateKind::TimedOut, error, None)
    }

    pub fn rejected(reason: impl Into<String>, error: Option<String>) -> Self {
        Self::rejected_as("Rejected", reason, error)
    }

    pub fn discarded(reason: impl Into<String>, error: Option<String>) -> Self {
        Self::rejected_as("Discarded", reason, error)
    }

    pub fn abandoned(reason: impl Into<String>, error: Option<String>) -> Self {
        Self::rejected_as("Abandoned", reason, error)
    }

    pub fn rejected_as(
        name: impl Into<String>,
        reason: impl Into<String>,
        error: Option<String>,
    ) -> Self {
        Self::new(name, StateKind::Rejected, error, Some(reason.into()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// True when this value is one of the shared zero-argument states
    pub fn is_canonical(&self) -> bool {
        *self == Self::UNSTARTED || *self == Self::COMPLETED || *self == Self::SUCCEEDED
    }

    pub fn is_unstarted(&self) -> bool {
        self.kind.is_unstarted()
    }

    pub fn is_started(&self) -> bool {
        self.kind.is_started()
    }

    pub fn is_completed(&self) -> bool {
        self.kind.is_completed()
    }

    pub fn is_timed_out(&self) -> bool {
        self.kind.is_timed_out()
    }

    pub fn is_failed(&self) -> bool {
        self.kind.is_failed()
    }

    pub fn is_rejected(&self) -> bool {
        self.kind.is_rejected()
    }

    pub fn is_incomplete(&self) -> bool {
        self.kind.is_incomplete()
    }

    pub fn is_finalised(&self) -> bool {
        self.kind.is_finalised()
    }

    /// Compact persisted form; the name is dropped when it equals the kind's default
    pub fn to_like(&self) -> StateLike {
        StateLike {
            name: (self.name != self.kind.default_name()).then(|| self.name.to_string()),
            kind: self.kind,
            error: self.error.clone(),
            reason: self.reason.clone(),
        }
    }

    /// Rebuild a state from its compact persisted form
    pub fn from_like(like: &StateLike) -> Self {
        let name = like
            .name
            .as_deref()
            .unwrap_or_else(|| like.kind.default_name());
        Self::resolve(name, like.kind, like.error.clone(), like.reason.clone())
    }

    /// Rebuild a state from the legacy three-flag encoding
    pub fn from_legacy(flags: &LegacyStateFlags) -> Self {
        let error = flags.error.clone();
        let reason = flags.reason.clone();
        let kind = match (flags.completed, flags.timed_out, flags.rejected) {
            (_, false, true) => StateKind::Rejected,
            (true, false, false) => StateKind::Completed,
            (false, true, false) => StateKind::TimedOut,
            (false, false, false) if error.is_some() => StateKind::Failed,
            (false, false, false) => StateKind::Unstarted,
            (completed, _, rejected) => {
                // Contradictory flags: no named state matches, so build a generic one
                let kind = if rejected {
                    StateKind::Rejected
                } else if completed {
                    StateKind::Completed
                } else {
                    StateKind::TimedOut
                };
                return Self::new(kind.default_name(), kind, error, reason);
            }
        };
        Self::resolve(kind.default_name(), kind, error, reason)
    }

    fn resolve(
        name: &str,
        kind: StateKind,
        error: Option<String>,
        reason: Option<String>,
    ) -> Self {
        if error.is_none() && reason.is_none() {
            for canonical in [Self::UNSTARTED, Self::COMPLETED, Self::SUCCEEDED] {
                if canonical.kind == kind && canonical.name == name {
                    return canonical;
                }
            }
        }
        Self::new(name, kind, error, reason)
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::UNSTARTED
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.name != self.kind.default_name() {
            write!(f, " ({})", self.kind)?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " - {}", reason)?;
        }
        if let Some(error) = &self.error {
            write!(f, ": {}", error)?;
        }
        Ok(())
    }
}

/// Persisted form of a [`TaskState`]
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StateLike {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: StateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Legacy encoding used by older snapshots
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStateFlags {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub rejected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
