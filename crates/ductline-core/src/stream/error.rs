//! Error types for stream graph construction and lifecycle operations.

use std::fmt;

use super::duct::DuctId;

/// Errors that can occur while building, compiling or driving a stream graph.
#[derive(Debug, thiserror::Error)]
pub enum StreamGraphError {
    /// An edge could not be inserted, a duct is unknown, or the graph
    /// contains a cycle.
    #[error("graph construction failed: {0}")]
    GraphConstruction(String),

    /// A bound duct has no outgoing edge, an ordinary stage binds straight
    /// into the exit marker, or the logical assembly is structurally invalid.
    #[error("malformed topology: {0}")]
    MalformedTopology(String),

    /// A sentinel showed up where the graph structure makes it impossible.
    #[error("internal consistency violated: {0}")]
    InternalConsistency(String),

    /// A lifecycle action was requested from the wrong state.
    #[error("cannot {action} a pipeline in state {from}")]
    InvalidLifecycleTransition {
        /// State the driver was in.
        from: LifecycleState,
        /// Requested action (bind, prepare, start, cleanup).
        action: &'static str,
    },

    /// A collaborator hook failed.
    #[error("{phase} failed for duct {duct}: {source}")]
    Hook {
        /// The duct whose hook failed.
        duct: DuctId,
        /// Lifecycle phase that was running.
        phase: LifecyclePhase,
        /// The collaborator's error.
        #[source]
        source: HookError,
    },
}

/// Error raised by a collaborator's [`DuctHooks`](super::lifecycle::DuctHooks)
/// implementation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl HookError {
    /// Creates a hook error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a hook error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Lifecycle phase a hook was invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    /// Post-bind initialization (insertion order).
    Initialize,
    /// Resource acquisition (reverse topological order).
    Prepare,
    /// Resource release (forward topological order).
    Cleanup,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "initialize"),
            Self::Prepare => write!(f, "prepare"),
            Self::Cleanup => write!(f, "cleanup"),
        }
    }
}

/// States of a pipeline instance as tracked by the lifecycle driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Freshly instantiated, nothing synthesized yet.
    Unbound,
    /// Topology synthesized and every duct initialized.
    Bound,
    /// Resources acquired, ready to run.
    Prepared,
    /// Handed to the runtime.
    Running,
    /// Resources released; terminal.
    CleanedUp,
    /// A pass failed; the instance must be discarded.
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbound => "Unbound",
            Self::Bound => "Bound",
            Self::Prepared => "Prepared",
            Self::Running => "Running",
            Self::CleanedUp => "CleanedUp",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}
