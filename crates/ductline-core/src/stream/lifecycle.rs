//! Lifecycle driver for a compiled stream graph.
//!
//! [`PipelineDriver`] walks one [`StreamGraph`] through
//! `Unbound → Bound → Prepared → Running → CleanedUp`:
//!
//! - **bind**: binds every vertex in topological order (synthesizing the
//!   executable topology), then initializes every vertex in insertion order.
//! - **prepare**: sinks before sources, so consumers acquire resources before
//!   producers start emitting.
//! - **cleanup**: sources before sinks, so upstream resources are released
//!   while downstream consumers drain.
//!
//! Hooks run strictly one after another. The first failure aborts the pass
//! and leaves the driver in [`LifecycleState::Failed`]; nothing is rolled
//! back and the instance must be discarded.

use super::duct::{Duct, DuctId};
use super::error::{HookError, LifecyclePhase, LifecycleState, StreamGraphError};
use super::graph::StreamGraph;

/// Collaborator-defined lifecycle hooks, invoked once per non-sentinel vertex.
///
/// Every method defaults to a no-op. Hooks may block on external resources;
/// the driver never calls them concurrently.
pub trait DuctHooks {
    /// Called after the whole topology is bound.
    fn initialize(&mut self, _duct: &Duct, _graph: &StreamGraph) -> Result<(), HookError> {
        Ok(())
    }

    /// Called tail-to-head before the pipeline runs.
    fn prepare(&mut self, _duct: &Duct, _graph: &StreamGraph) -> Result<(), HookError> {
        Ok(())
    }

    /// Called head-to-tail when the pipeline is torn down.
    fn cleanup(&mut self, _duct: &Duct, _graph: &StreamGraph) -> Result<(), HookError> {
        Ok(())
    }
}

impl<H: DuctHooks + ?Sized> DuctHooks for &mut H {
    fn initialize(&mut self, duct: &Duct, graph: &StreamGraph) -> Result<(), HookError> {
        (**self).initialize(duct, graph)
    }

    fn prepare(&mut self, duct: &Duct, graph: &StreamGraph) -> Result<(), HookError> {
        (**self).prepare(duct, graph)
    }

    fn cleanup(&mut self, duct: &Duct, graph: &StreamGraph) -> Result<(), HookError> {
        (**self).cleanup(duct, graph)
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl DuctHooks for NoopHooks {}

/// Drives one pipeline instance through its lifecycle.
///
/// Borrows the graph for its whole lifetime; the graph outlives the driver.
pub struct PipelineDriver<'g, H: DuctHooks> {
    graph: &'g mut StreamGraph,
    hooks: H,
    state: LifecycleState,
}

impl<'g, H: DuctHooks> PipelineDriver<'g, H> {
    /// Creates a driver for an unbound graph.
    pub fn new(graph: &'g mut StreamGraph, hooks: H) -> Self {
        Self {
            graph,
            hooks,
            state: LifecycleState::Unbound,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Returns the driven graph.
    #[must_use]
    pub fn graph(&self) -> &StreamGraph {
        &*self.graph
    }

    /// Returns the hooks.
    #[must_use]
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// Consumes the driver, returning the hooks.
    pub fn into_hooks(self) -> H {
        self.hooks
    }

    /// Synthesizes the executable topology and initializes every duct.
    ///
    /// # Errors
    ///
    /// Returns construction errors from binding, `InvalidLifecycleTransition`
    /// unless the driver is `Unbound`, or `Hook` if an initialize hook fails.
    pub fn bind(&mut self) -> Result<(), StreamGraphError> {
        self.expect_state(&[LifecycleState::Unbound], "bind")?;
        let _span = tracing::info_span!("bind").entered();

        if let Err(err) = self.bind_all() {
            return Err(self.fail(err));
        }

        // Initialization only needs every duct to exist; insertion order.
        let ducts: Vec<DuctId> = self.graph.all_ducts().map(|d| d.id).collect();
        self.run_hooks(&ducts, LifecyclePhase::Initialize)?;

        self.state = LifecycleState::Bound;
        tracing::info!(ducts = ducts.len(), "stream graph bound");
        Ok(())
    }

    /// Runs the prepare hooks from the tail back to the head.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` unless the driver is `Bound`, or
    /// `Hook` if a prepare hook fails.
    pub fn prepare(&mut self) -> Result<(), StreamGraphError> {
        self.expect_state(&[LifecycleState::Bound], "prepare")?;
        let _span = tracing::info_span!("prepare").entered();

        let order = match self.graph.reverse_topological_order() {
            Ok(order) => order,
            Err(err) => return Err(self.fail(err)),
        };
        self.run_hooks(&order, LifecyclePhase::Prepare)?;

        self.state = LifecycleState::Prepared;
        tracing::info!(ducts = order.len(), "stream graph prepared");
        Ok(())
    }

    /// Hands the prepared pipeline to the runtime, returning the ducts
    /// attached to the entry sentinel.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` unless the driver is `Prepared`.
    pub fn start(&mut self) -> Result<Vec<DuctId>, StreamGraphError> {
        self.expect_state(&[LifecycleState::Prepared], "start")?;
        self.state = LifecycleState::Running;
        Ok(self.graph.heads())
    }

    /// Runs the cleanup hooks from the head forward to the tail.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` unless the driver is `Prepared`
    /// or `Running`, or `Hook` if a cleanup hook fails.
    pub fn cleanup(&mut self) -> Result<(), StreamGraphError> {
        self.expect_state(
            &[LifecycleState::Prepared, LifecycleState::Running],
            "cleanup",
        )?;
        let _span = tracing::info_span!("cleanup").entered();

        let order = match self.graph.topological_order() {
            Ok(order) => order,
            Err(err) => return Err(self.fail(err)),
        };
        self.run_hooks(&order, LifecyclePhase::Cleanup)?;

        self.state = LifecycleState::CleanedUp;
        tracing::info!(ducts = order.len(), "stream graph cleaned up");
        Ok(())
    }

    /// Returns `(duct, next)` for every bound stage, in topological order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` before `bind` has succeeded.
    pub fn bound_routes(&self) -> Result<Vec<(DuctId, DuctId)>, StreamGraphError> {
        if matches!(self.state, LifecycleState::Unbound | LifecycleState::Failed) {
            return Err(StreamGraphError::InvalidLifecycleTransition {
                from: self.state,
                action: "inspect",
            });
        }
        let order = self.graph.topological_order()?;
        Ok(order
            .into_iter()
            .filter_map(|id| self.graph.next_for(id).map(|next| (id, next)))
            .collect())
    }

    fn bind_all(&mut self) -> Result<(), StreamGraphError> {
        self.graph.validate_outgoing()?;
        let order = self.graph.topological_order()?;
        for id in order {
            self.graph.bind_duct(id)?;
        }
        Ok(())
    }

    fn run_hooks(&mut self, order: &[DuctId], phase: LifecyclePhase) -> Result<(), StreamGraphError> {
        for &id in order {
            let graph: &StreamGraph = &*self.graph;
            let Some(duct) = graph.duct(id) else {
                continue;
            };
            if duct.is_sentinel() {
                continue;
            }
            let result = match phase {
                LifecyclePhase::Initialize => self.hooks.initialize(duct, graph),
                LifecyclePhase::Prepare => self.hooks.prepare(duct, graph),
                LifecyclePhase::Cleanup => self.hooks.cleanup(duct, graph),
            };
            if let Err(source) = result {
                tracing::error!(duct = %duct, %phase, "lifecycle hook failed: {source}");
                self.state = LifecycleState::Failed;
                return Err(StreamGraphError::Hook {
                    duct: id,
                    phase,
                    source,
                });
            }
        }
        Ok(())
    }

    fn expect_state(
        &self,
        allowed: &[LifecycleState],
        action: &'static str,
    ) -> Result<(), StreamGraphError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(StreamGraphError::InvalidLifecycleTransition {
                from: self.state,
                action,
            })
        }
    }

    /// Poisons the instance. Errors raised by the graph itself have already
    /// been dumped; the compiler's do not dump on their own.
    fn fail(&mut self, err: StreamGraphError) -> StreamGraphError {
        self.state = LifecycleState::Failed;
        if matches!(
            err,
            StreamGraphError::MalformedTopology(_) | StreamGraphError::InternalConsistency(_)
        ) {
            tracing::error!("unable to bind stream graph: {err}");
            self.graph.dump_on_error();
        }
        err
    }
}
