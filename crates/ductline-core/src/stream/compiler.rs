//! Topology compiler.
//!
//! Decides, for each bound stage, which duct the runtime routes to next.
//! Exactly one window marker is inserted at each grouped/aggregating
//! transition and exactly one fork wherever the graph branches. An open
//! window that already sits after a gate is reused rather than wrapped again.
//!
//! ```text
//!  gate ──▶ OpenWindow(next) | OpenReducingWindow(next) | OpenWindow(Fork)
//!  reducing ──▶ next (reducing) | CloseWindow(next) | CloseWindow(Fork)
//!  ordinary ──▶ next | Fork
//!  sink ──▶ (nothing)
//! ```

use super::duct::{Branches, DuctId, DuctKind};
use super::error::StreamGraphError;
use super::graph::StreamGraph;

impl StreamGraph {
    /// Synthesizes the duct the runtime should route to after `current`.
    ///
    /// Returns `None` for the sentinels, plain terminal (sink) stages and
    /// ducts that route by construction (forks and window markers). A sink
    /// that is also a gate or reducing stage still gets its window marker.
    /// New markers and forks are added to the arena, not to the vertex set.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::MalformedTopology` if `current` has no
    /// outgoing edge, or if an ordinary stage would bind straight into the
    /// exit sentinel. Returns `StreamGraphError::InternalConsistency` if the
    /// entry sentinel is found downstream.
    pub fn synthesize_next(&mut self, current: DuctId) -> Result<Option<DuctId>, StreamGraphError> {
        let duct = self.require(current)?;
        if duct.is_sentinel() {
            return Ok(None);
        }

        let fan_out = self.out_degree(current);
        let Some(&next) = self.raw_successors(current).first() else {
            return Err(StreamGraphError::MalformedTopology(format!(
                "ducts must have an outgoing edge: {}",
                duct.label()
            )));
        };
        if next == DuctId::ENTRY {
            return Err(StreamGraphError::InternalConsistency(format!(
                "head may not be next of {}",
                duct.label()
            )));
        }

        let Some(stage) = duct.stage() else {
            return Ok(None);
        };
        let caps = stage.capabilities;

        let next_duct = self.require(next)?;
        let next_is_open_window = next_duct.is_open_window();
        let next_is_reducing = next_duct.is_reducing();

        let synthesized = if caps.gate {
            if next_is_open_window {
                next
            } else if fan_out > 1 {
                let fork = self.create_fork(current)?;
                self.create_marker(DuctKind::OpenWindow { next: fork })
            } else if next_is_reducing {
                self.create_marker(DuctKind::OpenReducingWindow { next })
            } else {
                self.create_marker(DuctKind::OpenWindow { next })
            }
        } else if caps.reducing {
            if next_is_reducing {
                next
            } else if fan_out > 1 {
                let fork = self.create_fork(current)?;
                self.create_marker(DuctKind::CloseWindow { next: fork })
            } else {
                self.create_marker(DuctKind::CloseWindow { next })
            }
        } else if caps.sink {
            // Terminal stages route nowhere; gate and reducing sinks still
            // open or close their window above.
            return Ok(None);
        } else if fan_out > 1 {
            self.create_fork(current)?
        } else if next == DuctId::EXIT {
            return Err(StreamGraphError::MalformedTopology(format!(
                "tail ducts should not bind to next: {}",
                self.label_of(current)
            )));
        } else {
            next
        };

        tracing::debug!(
            current = %self.label_of(current),
            next = %self.label_of(synthesized),
            "synthesized next duct"
        );

        Ok(Some(synthesized))
    }

    /// Binds a duct: synthesizes and caches its next reference.
    ///
    /// Rebinding an already-bound duct is a no-op.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`synthesize_next`](Self::synthesize_next).
    pub fn bind_duct(&mut self, id: DuctId) -> Result<(), StreamGraphError> {
        if self.bound.contains(&id) {
            return Ok(());
        }
        if let Some(next) = self.synthesize_next(id)? {
            self.bound_next.insert(id, next);
        }
        self.bound.insert(id);
        Ok(())
    }

    /// Fork over every non-sentinel successor of `current`.
    fn create_fork(&mut self, current: DuctId) -> Result<DuctId, StreamGraphError> {
        let branches: Branches = self.successors_of(current)?.into_iter().collect();
        Ok(self.push_duct(DuctKind::Fork { branches }))
    }

    fn create_marker(&mut self, kind: DuctKind) -> DuctId {
        self.push_duct(kind)
    }
}
