//! Execution node data structures.
//!
//! A [`Duct`] is one vertex of the executable topology. The variant set is
//! closed: sentinels, stages wrapping a logical step, and the fan-out and
//! window markers synthesized by the compiler.

use std::fmt;

use smallvec::SmallVec;

/// Arena index of a duct inside a [`StreamGraph`](super::graph::StreamGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DuctId(pub u32);

impl DuctId {
    /// Reserved index of the entry sentinel.
    pub const ENTRY: DuctId = DuctId(0);
    /// Reserved index of the exit sentinel.
    pub const EXIT: DuctId = DuctId(1);

    /// Returns true for either sentinel index.
    #[inline]
    #[must_use]
    pub fn is_sentinel(self) -> bool {
        self == Self::ENTRY || self == Self::EXIT
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DuctId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DuctId({})", self.0)
    }
}

/// Opaque identity of a step in the logical assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u32);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepId({})", self.0)
    }
}

/// Capability flags carried by a stage.
///
/// The flags are orthogonal: a stage may be both a grouping boundary and an
/// aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// Grouping boundary; opens a window for the stages that follow.
    pub gate: bool,
    /// Aggregation over the records of one group.
    pub reducing: bool,
    /// Terminal stage; may precede the exit marker. Unless it is also a gate
    /// or reducing stage it routes nowhere.
    pub sink: bool,
}

impl Capabilities {
    /// Ordinary per-record stage.
    pub const NONE: Capabilities = Capabilities {
        gate: false,
        reducing: false,
        sink: false,
    };
    /// Grouping boundary.
    pub const GATE: Capabilities = Capabilities {
        gate: true,
        reducing: false,
        sink: false,
    };
    /// Aggregating stage.
    pub const REDUCING: Capabilities = Capabilities {
        gate: false,
        reducing: true,
        sink: false,
    };
    /// Terminal stage.
    pub const SINK: Capabilities = Capabilities {
        gate: false,
        reducing: false,
        sink: true,
    };

    /// Returns a copy with the gate flag set.
    #[must_use]
    pub fn with_gate(mut self) -> Self {
        self.gate = true;
        self
    }

    /// Returns a copy with the reducing flag set.
    #[must_use]
    pub fn with_reducing(mut self) -> Self {
        self.reducing = true;
        self
    }

    /// Returns a copy with the sink flag set.
    #[must_use]
    pub fn with_sink(mut self) -> Self {
        self.sink = true;
        self
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::with_capacity(3);
        if self.gate {
            flags.push("gate");
        }
        if self.reducing {
            flags.push("reducing");
        }
        if self.sink {
            flags.push("sink");
        }
        if flags.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&flags.join("+"))
        }
    }
}

/// A stage wrapping exactly one logical step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    /// The logical step this stage executes.
    pub step: StepId,
    /// Human-readable step name (e.g., "tokenize", "count").
    pub name: String,
    /// Capability flags.
    pub capabilities: Capabilities,
}

impl Stage {
    /// Creates a stage.
    pub fn new(step: StepId, name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            step,
            name: name.into(),
            capabilities,
        }
    }
}

/// Fan-out targets of a fork. Inline storage covers the common case.
pub type Branches = SmallVec<[DuctId; 4]>;

/// The closed set of execution node variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuctKind {
    /// Head sentinel; only ever a source of edges.
    Entry,
    /// Tail sentinel; only ever a target of edges.
    Exit,
    /// A logical step.
    Stage(Stage),
    /// Fans one upstream result out to every branch.
    Fork {
        /// Downstream ducts, in edge insertion order.
        branches: Branches,
    },
    /// Start of a grouped-records window.
    OpenWindow {
        /// Duct entered once the window is open.
        next: DuctId,
    },
    /// Window start fused with the first aggregation step.
    OpenReducingWindow {
        /// The reducing duct that starts accumulating on window entry.
        next: DuctId,
    },
    /// End of a grouped window.
    CloseWindow {
        /// Duct that resumes ordinary per-record processing.
        next: DuctId,
    },
}

/// One vertex of the executable topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Duct {
    /// Stable arena identity.
    pub id: DuctId,
    /// Variant and payload.
    pub kind: DuctKind,
}

impl Duct {
    /// Returns true for the entry and exit sentinels.
    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, DuctKind::Entry | DuctKind::Exit)
    }

    /// Returns the stage payload, if this duct is a stage.
    #[must_use]
    pub fn stage(&self) -> Option<&Stage> {
        match &self.kind {
            DuctKind::Stage(stage) => Some(stage),
            _ => None,
        }
    }

    /// Returns the capability flags; non-stage ducts have none.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.stage().map_or(Capabilities::NONE, |s| s.capabilities)
    }

    /// Returns true if this is a stage with the gate flag.
    #[must_use]
    pub fn is_gate(&self) -> bool {
        self.capabilities().gate
    }

    /// Returns true if this is a stage with the reducing flag.
    #[must_use]
    pub fn is_reducing(&self) -> bool {
        self.capabilities().reducing
    }

    /// Returns true if this is a stage with the sink flag.
    #[must_use]
    pub fn is_sink(&self) -> bool {
        self.capabilities().sink
    }

    /// Returns true for both plain and reducing window-open markers.
    #[must_use]
    pub fn is_open_window(&self) -> bool {
        matches!(
            self.kind,
            DuctKind::OpenWindow { .. } | DuctKind::OpenReducingWindow { .. }
        )
    }

    /// Returns true for a window-close marker.
    #[must_use]
    pub fn is_close_window(&self) -> bool {
        matches!(self.kind, DuctKind::CloseWindow { .. })
    }

    /// Returns true for a fork.
    #[must_use]
    pub fn is_fork(&self) -> bool {
        matches!(self.kind, DuctKind::Fork { .. })
    }

    /// Targets this duct routes to by construction.
    ///
    /// Markers and forks carry their targets; stages are routed through the
    /// bound successor table instead, so they report nothing here.
    #[must_use]
    pub fn intrinsic_targets(&self) -> &[DuctId] {
        match &self.kind {
            DuctKind::Fork { branches } => branches.as_slice(),
            DuctKind::OpenWindow { next }
            | DuctKind::OpenReducingWindow { next }
            | DuctKind::CloseWindow { next } => std::slice::from_ref(next),
            DuctKind::Entry | DuctKind::Exit | DuctKind::Stage(_) => &[],
        }
    }

    /// Short display label used in logs and DOT dumps.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.kind {
            DuctKind::Entry => "head".to_string(),
            DuctKind::Exit => "tail".to_string(),
            DuctKind::Stage(stage) => stage.name.clone(),
            DuctKind::Fork { branches } => format!("Fork({})", join_ids(branches)),
            DuctKind::OpenWindow { next } => format!("OpenWindow({})", next.0),
            DuctKind::OpenReducingWindow { next } => format!("OpenReducingWindow({})", next.0),
            DuctKind::CloseWindow { next } => format!("CloseWindow({})", next.0),
        }
    }
}

impl fmt::Display for Duct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

fn join_ids(ids: &[DuctId]) -> String {
    ids.iter()
        .map(|id| id.0.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_are_orthogonal() {
        let caps = Capabilities::GATE.with_reducing();
        assert!(caps.gate);
        assert!(caps.reducing);
        assert!(!caps.sink);
        assert_eq!(caps.to_string(), "gate+reducing");
        assert_eq!(Capabilities::NONE.to_string(), "none");
    }

    #[test]
    fn test_open_window_covers_reducing_variant() {
        let plain = Duct {
            id: DuctId(5),
            kind: DuctKind::OpenWindow { next: DuctId(3) },
        };
        let fused = Duct {
            id: DuctId(6),
            kind: DuctKind::OpenReducingWindow { next: DuctId(3) },
        };
        assert!(plain.is_open_window());
        assert!(fused.is_open_window());
        assert!(!fused.is_close_window());
        assert_eq!(fused.intrinsic_targets(), &[DuctId(3)]);
    }

    #[test]
    fn test_stage_reports_no_intrinsic_targets() {
        let duct = Duct {
            id: DuctId(2),
            kind: DuctKind::Stage(Stage::new(StepId(0), "split", Capabilities::NONE)),
        };
        assert!(duct.intrinsic_targets().is_empty());
        assert_eq!(duct.label(), "split");
        assert!(!duct.is_sentinel());
        assert!(DuctId::ENTRY.is_sentinel());
    }
}
