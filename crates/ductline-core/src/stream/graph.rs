//! Topology graph over execution ducts.
//!
//! [`StreamGraph`] is an arena of [`Duct`]s addressed by [`DuctId`], with
//! edges stored as index pairs. Index 0 and 1 are the permanent entry and
//! exit sentinels; they give every real duct at least one predecessor and
//! successor so the ordering algorithms need no special cases.

use std::collections::VecDeque;
use std::fmt;

use fxhash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::config::StreamGraphConfig;

use super::duct::{Capabilities, Duct, DuctId, DuctKind, Stage, StepId};
use super::error::StreamGraphError;

/// Unique identifier for an edge in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(pub u32);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

/// A directed control/data link between two ducts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Edge identifier, assigned in insertion order.
    pub id: EdgeId,
    /// Upstream duct.
    pub source: DuctId,
    /// Downstream duct.
    pub target: DuctId,
}

/// Adjacency list; most ducts have one or two neighbors.
type Adjacency = SmallVec<[DuctId; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// The executable topology of one pipeline instance.
///
/// Owns every duct, including the ones synthesized by the compiler. A graph
/// is used by exactly one execution context; concurrent contexts each
/// instantiate their own.
#[derive(Clone)]
pub struct StreamGraph {
    /// Arena of all ducts, indexed by `DuctId`.
    ducts: Vec<Duct>,
    /// Graph vertices in insertion order.
    vertices: Vec<DuctId>,
    /// Vertex -> insertion rank, used for deterministic tie-breaking.
    vertex_rank: FxHashMap<DuctId, usize>,
    /// All edges in insertion order.
    edges: Vec<Edge>,
    /// Downstream neighbors in edge insertion order.
    outgoing: FxHashMap<DuctId, Adjacency>,
    /// Upstream neighbors in edge insertion order.
    incoming: FxHashMap<DuctId, Adjacency>,
    /// Bound "next" reference of each stage, filled in by the compiler.
    pub(crate) bound_next: FxHashMap<DuctId, DuctId>,
    /// Stages that have been bound (terminal stages bind to nothing).
    pub(crate) bound: FxHashSet<DuctId>,
    config: StreamGraphConfig,
}

impl fmt::Debug for StreamGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamGraph")
            .field("duct_count", &self.ducts.len())
            .field("vertex_count", &self.vertices.len())
            .field("edge_count", &self.edges.len())
            .field("bound_count", &self.bound.len())
            .finish_non_exhaustive()
    }
}

impl Default for StreamGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamGraph {
    /// Creates a graph holding only the two sentinels.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StreamGraphConfig::default())
    }

    /// Creates a graph with the given configuration.
    #[must_use]
    pub fn with_config(config: StreamGraphConfig) -> Self {
        let mut graph = Self {
            ducts: Vec::new(),
            vertices: Vec::new(),
            vertex_rank: FxHashMap::default(),
            edges: Vec::new(),
            outgoing: FxHashMap::default(),
            incoming: FxHashMap::default(),
            bound_next: FxHashMap::default(),
            bound: FxHashSet::default(),
            config,
        };
        graph.push_duct(DuctKind::Entry);
        graph.push_duct(DuctKind::Exit);
        graph.insert_vertex(DuctId::ENTRY);
        graph.insert_vertex(DuctId::EXIT);
        graph
    }

    /// Returns the graph configuration.
    #[must_use]
    pub fn config(&self) -> &StreamGraphConfig {
        &self.config
    }

    // ---- Construction ----

    /// Adds a duct to the arena. It becomes a vertex once an edge touches it.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::GraphConstruction` for sentinel kinds (the
    /// two sentinels are permanent) and for markers or forks that reference
    /// unknown ducts.
    pub fn add_duct(&mut self, kind: DuctKind) -> Result<DuctId, StreamGraphError> {
        if matches!(kind, DuctKind::Entry | DuctKind::Exit) {
            return Err(StreamGraphError::GraphConstruction(
                "sentinel ducts are permanent and may not be added".to_string(),
            ));
        }
        let probe = Duct {
            id: DuctId(0),
            kind,
        };
        if let Some(unknown) = probe
            .intrinsic_targets()
            .iter()
            .find(|target| !self.contains(**target))
        {
            return Err(StreamGraphError::GraphConstruction(format!(
                "{} references unknown duct {unknown}",
                probe.label()
            )));
        }
        Ok(self.push_duct(probe.kind))
    }

    /// Adds a stage wrapping a logical step.
    pub fn add_stage(
        &mut self,
        step: StepId,
        name: impl Into<String>,
        capabilities: Capabilities,
    ) -> DuctId {
        self.push_duct(DuctKind::Stage(Stage::new(step, name, capabilities)))
    }

    /// Attaches a duct to the entry sentinel.
    ///
    /// # Errors
    ///
    /// See [`add_path`](Self::add_path).
    pub fn add_head(&mut self, head: DuctId) -> Result<EdgeId, StreamGraphError> {
        self.add_path(None, Some(head))
    }

    /// Attaches a duct to the exit sentinel.
    ///
    /// # Errors
    ///
    /// See [`add_path`](Self::add_path).
    pub fn add_tail(&mut self, tail: DuctId) -> Result<EdgeId, StreamGraphError> {
        self.add_path(Some(tail), None)
    }

    /// Adds a directed edge; `None` stands for the entry (source side) or
    /// exit (target side) sentinel. Both endpoints become vertices.
    ///
    /// Inserting an edge that already exists returns the existing edge.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::GraphConstruction` if both endpoints are
    /// absent, the source is the exit sentinel, the target is the entry
    /// sentinel, the edge would join the two sentinels directly, an endpoint
    /// is unknown, or the edge would close a cycle.
    /// The diagnostic dump is attempted before the error is returned.
    pub fn add_path(
        &mut self,
        source: Option<DuctId>,
        target: Option<DuctId>,
    ) -> Result<EdgeId, StreamGraphError> {
        match self.try_add_path(source, target) {
            Ok(id) => Ok(id),
            Err(err) => {
                tracing::error!("unable to add path: {err}");
                self.dump_on_error();
                Err(err)
            }
        }
    }

    /// Shorthand for `add_path(Some(source), Some(target))`.
    ///
    /// # Errors
    ///
    /// See [`add_path`](Self::add_path).
    pub fn add_edge(&mut self, source: DuctId, target: DuctId) -> Result<EdgeId, StreamGraphError> {
        self.add_path(Some(source), Some(target))
    }

    fn try_add_path(
        &mut self,
        source: Option<DuctId>,
        target: Option<DuctId>,
    ) -> Result<EdgeId, StreamGraphError> {
        if source.is_none() && target.is_none() {
            return Err(StreamGraphError::GraphConstruction(
                "both source and target may not be absent".to_string(),
            ));
        }
        if source == Some(DuctId::EXIT) {
            return Err(StreamGraphError::GraphConstruction(
                "source may not be the tail".to_string(),
            ));
        }
        if target == Some(DuctId::ENTRY) {
            return Err(StreamGraphError::GraphConstruction(
                "target may not be the head".to_string(),
            ));
        }

        let source = source.unwrap_or(DuctId::ENTRY);
        let target = target.unwrap_or(DuctId::EXIT);
        if source == DuctId::ENTRY && target == DuctId::EXIT {
            return Err(StreamGraphError::GraphConstruction(
                "head may not connect directly to the tail".to_string(),
            ));
        }

        for endpoint in [source, target] {
            if !self.contains(endpoint) {
                return Err(StreamGraphError::GraphConstruction(format!(
                    "unknown duct {endpoint}"
                )));
            }
        }

        if let Some(existing) = self
            .edges
            .iter()
            .find(|e| e.source == source && e.target == target)
        {
            return Ok(existing.id);
        }

        if source == target || self.reaches(target, source) {
            return Err(StreamGraphError::GraphConstruction(format!(
                "edge {} -> {} would create a cycle",
                self.label_of(source),
                self.label_of(target)
            )));
        }

        self.insert_vertex(source);
        self.insert_vertex(target);

        #[allow(clippy::cast_possible_truncation)]
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge { id, source, target });
        self.outgoing.entry(source).or_default().push(target);
        self.incoming.entry(target).or_default().push(source);

        Ok(id)
    }

    pub(crate) fn push_duct(&mut self, kind: DuctKind) -> DuctId {
        #[allow(clippy::cast_possible_truncation)]
        let id = DuctId(self.ducts.len() as u32);
        self.ducts.push(Duct { id, kind });
        id
    }

    fn insert_vertex(&mut self, id: DuctId) {
        if !self.vertex_rank.contains_key(&id) {
            self.vertex_rank.insert(id, self.vertices.len());
            self.vertices.push(id);
        }
    }

    /// Depth-first reachability along outgoing edges.
    fn reaches(&self, from: DuctId, to: DuctId) -> bool {
        let mut stack = vec![from];
        let mut seen = FxHashSet::default();
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.raw_successors(current).iter().copied());
            }
        }
        false
    }

    // ---- Accessors ----

    /// Returns true if the id names a duct in the arena.
    #[must_use]
    pub fn contains(&self, id: DuctId) -> bool {
        id.index() < self.ducts.len()
    }

    /// Returns true if the duct is a graph vertex (touched by an edge, or a
    /// sentinel).
    #[must_use]
    pub fn is_vertex(&self, id: DuctId) -> bool {
        self.vertex_rank.contains_key(&id)
    }

    /// Returns a duct by id.
    #[must_use]
    pub fn duct(&self, id: DuctId) -> Option<&Duct> {
        self.ducts.get(id.index())
    }

    /// Looks up a duct that is known to exist.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::GraphConstruction` for an unknown id.
    pub(crate) fn require(&self, id: DuctId) -> Result<&Duct, StreamGraphError> {
        self.duct(id)
            .ok_or_else(|| StreamGraphError::GraphConstruction(format!("unknown duct {id}")))
    }

    /// Finds the stage wrapping the named step.
    #[must_use]
    pub fn find_stage(&self, name: &str) -> Option<DuctId> {
        self.ducts
            .iter()
            .find(|duct| duct.stage().is_some_and(|stage| stage.name == name))
            .map(|duct| duct.id)
    }

    pub(crate) fn label_of(&self, id: DuctId) -> String {
        self.duct(id).map_or_else(|| id.to_string(), Duct::label)
    }

    /// Returns the number of graph vertices, sentinels included.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the number of ducts in the arena, synthesized ones included.
    #[must_use]
    pub fn duct_count(&self) -> usize {
        self.ducts.len()
    }

    /// Returns every graph vertex in insertion order, sentinels included.
    pub fn all_ducts(&self) -> impl Iterator<Item = &Duct> + '_ {
        self.vertices.iter().map(|id| &self.ducts[id.index()])
    }

    /// Returns ducts that exist in the arena but are not graph vertices;
    /// these are the markers and forks created during synthesis.
    pub fn synthesized_ducts(&self) -> impl Iterator<Item = &Duct> + '_ {
        self.ducts
            .iter()
            .filter(move |duct| !self.vertex_rank.contains_key(&duct.id))
    }

    /// Returns every edge in insertion order.
    #[must_use]
    pub fn all_edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns every edge as a `(source, target)` pair.
    #[must_use]
    pub fn all_pairs(&self) -> Vec<(DuctId, DuctId)> {
        self.edges.iter().map(|e| (e.source, e.target)).collect()
    }

    /// Returns the number of outgoing edges from a duct.
    #[inline]
    #[must_use]
    pub fn out_degree(&self, id: DuctId) -> usize {
        self.outgoing.get(&id).map_or(0, |adj| adj.len())
    }

    /// Returns the number of incoming edges to a duct.
    #[inline]
    #[must_use]
    pub fn in_degree(&self, id: DuctId) -> usize {
        self.incoming.get(&id).map_or(0, |adj| adj.len())
    }

    /// Unfiltered downstream neighbors in edge insertion order.
    pub(crate) fn raw_successors(&self, id: DuctId) -> &[DuctId] {
        self.outgoing.get(&id).map(|adj| adj.as_slice()).unwrap_or(&[])
    }

    /// Unfiltered upstream neighbors in edge insertion order.
    pub(crate) fn raw_predecessors(&self, id: DuctId) -> &[DuctId] {
        self.incoming.get(&id).map(|adj| adj.as_slice()).unwrap_or(&[])
    }

    /// Returns the ducts attached to the entry sentinel.
    #[must_use]
    pub fn heads(&self) -> Vec<DuctId> {
        self.raw_successors(DuctId::ENTRY).to_vec()
    }

    /// Returns the ducts attached to the exit sentinel.
    #[must_use]
    pub fn tails(&self) -> Vec<DuctId> {
        self.raw_predecessors(DuctId::EXIT).to_vec()
    }

    /// Returns the downstream neighbors of a duct with the exit sentinel
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::InternalConsistency` if the entry sentinel
    /// appears as a successor.
    pub fn successors_of(&self, id: DuctId) -> Result<Vec<DuctId>, StreamGraphError> {
        let mut successors = Vec::with_capacity(self.out_degree(id));
        for &successor in self.raw_successors(id) {
            if successor == DuctId::ENTRY {
                return Err(StreamGraphError::InternalConsistency(format!(
                    "head may not be next of {}",
                    self.label_of(id)
                )));
            }
            if successor != DuctId::EXIT {
                successors.push(successor);
            }
        }
        Ok(successors)
    }

    /// Returns the upstream neighbors of a duct with the entry sentinel
    /// removed.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::InternalConsistency` if the exit sentinel
    /// appears as a predecessor.
    pub fn predecessors_of(&self, id: DuctId) -> Result<Vec<DuctId>, StreamGraphError> {
        let mut predecessors = Vec::with_capacity(self.in_degree(id));
        for &predecessor in self.raw_predecessors(id) {
            if predecessor == DuctId::EXIT {
                return Err(StreamGraphError::InternalConsistency(format!(
                    "tail may not be previous of {}",
                    self.label_of(id)
                )));
            }
            if predecessor != DuctId::ENTRY {
                predecessors.push(predecessor);
            }
        }
        Ok(predecessors)
    }

    /// Returns the bound next duct of a stage, once bound.
    #[must_use]
    pub fn next_for(&self, id: DuctId) -> Option<DuctId> {
        self.bound_next.get(&id).copied()
    }

    /// Returns true once the duct has been through `bind`.
    #[must_use]
    pub fn is_bound(&self, id: DuctId) -> bool {
        self.bound.contains(&id)
    }

    /// Checks that every non-sentinel vertex has an outgoing edge.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::MalformedTopology` naming the first
    /// offending duct in insertion order.
    pub fn validate_outgoing(&self) -> Result<(), StreamGraphError> {
        for &id in &self.vertices {
            if !id.is_sentinel() && self.out_degree(id) == 0 {
                return Err(StreamGraphError::MalformedTopology(format!(
                    "ducts must have an outgoing edge: {}",
                    self.label_of(id)
                )));
            }
        }
        Ok(())
    }

    // ---- Ordering ----

    /// Returns every vertex in topological order (sources first), sentinels
    /// included. Ties are broken by vertex insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::GraphConstruction` if the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<DuctId>, StreamGraphError> {
        self.ordered(Direction::Forward)
    }

    /// Returns every vertex in topological order of the reversed graph
    /// (sinks first).
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::GraphConstruction` if the graph has a cycle.
    pub fn reverse_topological_order(&self) -> Result<Vec<DuctId>, StreamGraphError> {
        self.ordered(Direction::Reverse)
    }

    fn ordered(&self, direction: Direction) -> Result<Vec<DuctId>, StreamGraphError> {
        let (order, processed) = self.kahn_topo_sort(direction);
        if processed < self.vertices.len() {
            let ordered: FxHashSet<DuctId> = order.iter().copied().collect();
            let culprit = self
                .vertices
                .iter()
                .find(|id| !ordered.contains(id))
                .map_or_else(|| "unknown".to_string(), |id| self.label_of(*id));
            let err = StreamGraphError::GraphConstruction(format!(
                "cycle detected involving duct: {culprit}"
            ));
            match direction {
                Direction::Forward => {
                    tracing::error!("failed creating topological iterator: {err}");
                }
                Direction::Reverse => {
                    tracing::error!("failed creating reversed topological iterator: {err}");
                }
            }
            self.dump_on_error();
            return Err(err);
        }
        Ok(order)
    }

    /// Kahn's algorithm for topological sort.
    ///
    /// Returns `(ordered_ids, count_of_processed_vertices)`.
    fn kahn_topo_sort(&self, direction: Direction) -> (Vec<DuctId>, usize) {
        let (upstream, downstream) = match direction {
            Direction::Forward => (&self.incoming, &self.outgoing),
            Direction::Reverse => (&self.outgoing, &self.incoming),
        };

        let mut in_degree: FxHashMap<DuctId, usize> = self
            .vertices
            .iter()
            .map(|id| (*id, upstream.get(id).map_or(0, |adj| adj.len())))
            .collect();

        // Vertices are already in insertion order.
        let mut queue: VecDeque<DuctId> = self
            .vertices
            .iter()
            .copied()
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.vertices.len());
        let mut processed = 0;

        while let Some(id) = queue.pop_front() {
            order.push(id);
            processed += 1;

            let mut ready: Vec<DuctId> = Vec::new();
            for next in downstream.get(&id).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(next) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        ready.push(*next);
                    }
                }
            }
            ready.sort_by_key(|n| self.vertex_rank[n]);
            queue.extend(ready);
        }

        (order, processed)
    }
}
