//! Logical assembly: the user-authored step graph handed to the compiler.
//!
//! An [`Assembly`] is immutable once built and may be shared (e.g. behind an
//! `Arc`) by any number of execution contexts; each context calls
//! [`Assembly::instantiate`] to get its own [`StreamGraph`].
//!
//! # Example
//!
//! ```rust
//! use ductline_core::config::StreamGraphConfig;
//! use ductline_core::stream::AssemblyBuilder;
//!
//! let assembly = AssemblyBuilder::new()
//!     .source("lines")
//!     .each("tokenize")
//!     .group_by("by_word")
//!     .every("count")
//!     .sink("counts")
//!     .connect("lines", "tokenize")
//!     .connect("tokenize", "by_word")
//!     .connect("by_word", "count")
//!     .connect("count", "counts")
//!     .build()
//!     .unwrap();
//!
//! let graph = assembly.instantiate(StreamGraphConfig::default()).unwrap();
//! assert_eq!(graph.heads().len(), 1);
//! ```

use std::collections::VecDeque;

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::config::StreamGraphConfig;

use super::duct::{Capabilities, StepId};
use super::error::StreamGraphError;
use super::graph::StreamGraph;

/// A declared step of the assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDecl {
    /// Step identity (declaration index).
    pub id: StepId,
    /// Unique step name.
    pub name: String,
    /// Capability flags.
    pub capabilities: Capabilities,
    /// Attached to the entry sentinel.
    pub source: bool,
}

/// Fluent builder for [`Assembly`].
///
/// Errors (duplicate names, unknown steps, cycles) are reported by
/// [`build`](Self::build), not by the individual calls.
#[derive(Debug, Default)]
pub struct AssemblyBuilder {
    steps: Vec<(String, Capabilities, bool)>,
    edges: Vec<(String, String)>,
}

impl AssemblyBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a source step, attached to the entry sentinel.
    #[must_use]
    pub fn source(self, name: &str) -> Self {
        self.source_with(name, Capabilities::NONE)
    }

    /// Adds a source step with explicit capabilities.
    #[must_use]
    pub fn source_with(mut self, name: &str, capabilities: Capabilities) -> Self {
        self.steps.push((name.to_string(), capabilities, true));
        self
    }

    /// Adds an ordinary per-record step.
    #[must_use]
    pub fn each(self, name: &str) -> Self {
        self.step(name, Capabilities::NONE)
    }

    /// Adds a grouping boundary.
    #[must_use]
    pub fn group_by(self, name: &str) -> Self {
        self.step(name, Capabilities::GATE)
    }

    /// Adds an aggregation over the current group.
    #[must_use]
    pub fn every(self, name: &str) -> Self {
        self.step(name, Capabilities::REDUCING)
    }

    /// Adds a terminal step, attached to the exit sentinel.
    #[must_use]
    pub fn sink(self, name: &str) -> Self {
        self.step(name, Capabilities::SINK)
    }

    /// Adds a step with explicit capabilities.
    #[must_use]
    pub fn step(mut self, name: &str, capabilities: Capabilities) -> Self {
        self.steps.push((name.to_string(), capabilities, false));
        self
    }

    /// Connects two steps with an edge.
    #[must_use]
    pub fn connect(mut self, from: &str, to: &str) -> Self {
        self.edges.push((from.to_string(), to.to_string()));
        self
    }

    /// Adds branches downstream of `from`; each branch is connected to it.
    #[must_use]
    pub fn fan_out<F>(mut self, from: &str, branches: F) -> Self
    where
        F: FnOnce(FanOutBuilder) -> FanOutBuilder,
    {
        let fan_out = branches(FanOutBuilder::default());
        for (name, capabilities) in fan_out.branches {
            self.edges.push((from.to_string(), name.clone()));
            self.steps.push((name, capabilities, false));
        }
        self
    }

    /// Validates and freezes the assembly.
    ///
    /// # Errors
    ///
    /// Returns `StreamGraphError::GraphConstruction` for duplicate names,
    /// edges naming unknown steps, and cycles. Returns
    /// `StreamGraphError::MalformedTopology` for an empty assembly, missing
    /// sources or sinks, sources with inputs, other steps without inputs,
    /// sinks with outputs, and aggregations that do not follow a grouping
    /// boundary or another aggregation.
    pub fn build(self) -> Result<Assembly, StreamGraphError> {
        if self.steps.is_empty() {
            return Err(StreamGraphError::MalformedTopology(
                "empty assembly: no steps".to_string(),
            ));
        }

        let mut name_index: FxHashMap<String, usize> = FxHashMap::default();
        let mut steps = Vec::with_capacity(self.steps.len());
        for (idx, (name, capabilities, source)) in self.steps.into_iter().enumerate() {
            if name_index.insert(name.clone(), idx).is_some() {
                return Err(StreamGraphError::GraphConstruction(format!(
                    "duplicate step name: {name}"
                )));
            }
            #[allow(clippy::cast_possible_truncation)]
            let id = StepId(idx as u32);
            steps.push(StepDecl {
                id,
                name,
                capabilities,
                source,
            });
        }

        let mut edges: Vec<(usize, usize)> = Vec::with_capacity(self.edges.len());
        for (from, to) in &self.edges {
            let lookup = |name: &str| {
                name_index.get(name).copied().ok_or_else(|| {
                    StreamGraphError::GraphConstruction(format!("step not found: {name}"))
                })
            };
            let pair = (lookup(from.as_str())?, lookup(to.as_str())?);
            if !edges.contains(&pair) {
                edges.push(pair);
            }
        }

        let assembly = Assembly { steps, edges };
        assembly.validate()?;
        Ok(assembly)
    }
}

/// Builder for the branches of a fan-out.
#[derive(Debug, Default)]
pub struct FanOutBuilder {
    branches: Vec<(String, Capabilities)>,
}

impl FanOutBuilder {
    /// Adds an ordinary branch.
    #[must_use]
    pub fn branch(mut self, name: &str) -> Self {
        self.branches.push((name.to_string(), Capabilities::NONE));
        self
    }

    /// Adds a grouping-boundary branch.
    #[must_use]
    pub fn group_by(mut self, name: &str) -> Self {
        self.branches.push((name.to_string(), Capabilities::GATE));
        self
    }

    /// Adds an aggregating branch.
    #[must_use]
    pub fn every(mut self, name: &str) -> Self {
        self.branches.push((name.to_string(), Capabilities::REDUCING));
        self
    }

    /// Adds a terminal branch.
    #[must_use]
    pub fn sink(mut self, name: &str) -> Self {
        self.branches.push((name.to_string(), Capabilities::SINK));
        self
    }
}

/// An immutable, validated logical assembly.
#[derive(Debug, Clone)]
pub struct Assembly {
    steps: Vec<StepDecl>,
    edges: Vec<(usize, usize)>,
}

impl Assembly {
    /// Returns the declared steps in declaration order.
    #[must_use]
    pub fn steps(&self) -> &[StepDecl] {
        &self.steps
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns the number of distinct edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Looks up a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&StepDecl> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Builds a fresh, unbound stream graph for one execution context.
    ///
    /// Stages are created in declaration order, sources are attached to the
    /// entry sentinel, then the declared edges are added, then sinks are
    /// attached to the exit sentinel.
    ///
    /// # Errors
    ///
    /// Propagates edge insertion errors from the graph.
    pub fn instantiate(&self, config: StreamGraphConfig) -> Result<StreamGraph, StreamGraphError> {
        let mut graph = StreamGraph::with_config(config);

        let ducts: Vec<_> = self
            .steps
            .iter()
            .map(|s| graph.add_stage(s.id, s.name.clone(), s.capabilities))
            .collect();

        for step in self.steps.iter().filter(|s| s.source) {
            graph.add_head(ducts[step.id.0 as usize])?;
        }
        for &(from, to) in &self.edges {
            graph.add_edge(ducts[from], ducts[to])?;
        }
        for step in self.steps.iter().filter(|s| s.capabilities.sink) {
            graph.add_tail(ducts[step.id.0 as usize])?;
        }

        tracing::debug!(
            steps = self.steps.len(),
            edges = graph.edge_count(),
            "instantiated stream graph"
        );
        Ok(graph)
    }

    fn validate(&self) -> Result<(), StreamGraphError> {
        let mut inputs: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        let mut outputs: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        for &(from, to) in &self.edges {
            outputs[from].push(to);
            inputs[to].push(from);
        }

        self.check_acyclic(&inputs, &outputs)?;

        if !self.steps.iter().any(|s| s.source) {
            return Err(StreamGraphError::MalformedTopology(
                "assembly has no source step".to_string(),
            ));
        }
        if !self.steps.iter().any(|s| s.capabilities.sink) {
            return Err(StreamGraphError::MalformedTopology(
                "assembly has no sink step".to_string(),
            ));
        }

        for (idx, step) in self.steps.iter().enumerate() {
            if step.source && !inputs[idx].is_empty() {
                return Err(StreamGraphError::MalformedTopology(format!(
                    "source step '{}' may not have inputs",
                    step.name
                )));
            }
            if !step.source && inputs[idx].is_empty() {
                return Err(StreamGraphError::MalformedTopology(format!(
                    "step '{}' is not a source and has no inputs",
                    step.name
                )));
            }
            if step.capabilities.sink && !outputs[idx].is_empty() {
                return Err(StreamGraphError::MalformedTopology(format!(
                    "sink step '{}' may not have outputs",
                    step.name
                )));
            }

            // A step that is its own grouping boundary opens its own window.
            if !step.capabilities.reducing || step.capabilities.gate {
                continue;
            }
            if step.source {
                return Err(StreamGraphError::MalformedTopology(format!(
                    "reducing step '{}' may not be a source",
                    step.name
                )));
            }
            for &upstream in &inputs[idx] {
                let caps = self.steps[upstream].capabilities;
                if !(caps.gate || caps.reducing) {
                    return Err(StreamGraphError::MalformedTopology(format!(
                        "reducing step '{}' cannot follow '{}'; it must follow a grouping boundary or another reducing step",
                        step.name, self.steps[upstream].name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Kahn's algorithm over step indices; any step left over sits on a cycle.
    fn check_acyclic(
        &self,
        inputs: &[Vec<usize>],
        outputs: &[Vec<usize>],
    ) -> Result<(), StreamGraphError> {
        let mut in_degree: Vec<usize> = inputs.iter().map(Vec::len).collect();
        let mut queue: VecDeque<usize> = (0..self.steps.len())
            .filter(|&idx| in_degree[idx] == 0)
            .collect();
        let mut processed = 0;
        while let Some(idx) = queue.pop_front() {
            processed += 1;
            for &next in &outputs[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }
        if processed < self.steps.len() {
            let culprit = in_degree
                .iter()
                .position(|&deg| deg > 0)
                .map_or("unknown", |idx| self.steps[idx].name.as_str());
            return Err(StreamGraphError::GraphConstruction(format!(
                "cycle detected involving step: {culprit}"
            )));
        }
        Ok(())
    }
}

/// Capability names used in the JSON form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Grouping boundary.
    Gate,
    /// Aggregation.
    Reducing,
    /// Terminal step.
    Sink,
}

/// JSON form of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    /// Unique step name.
    pub name: String,
    /// Attach to the entry sentinel.
    #[serde(default)]
    pub source: bool,
    /// Capability flags.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// JSON form of an assembly.
///
/// ```json
/// {
///   "steps": [
///     { "name": "lines", "source": true },
///     { "name": "by_word", "capabilities": ["gate"] },
///     { "name": "count", "capabilities": ["reducing"] },
///     { "name": "out", "capabilities": ["sink"] }
///   ],
///   "edges": [["lines", "by_word"], ["by_word", "count"], ["count", "out"]]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblySpec {
    /// Steps in declaration order.
    pub steps: Vec<StepSpec>,
    /// Edges as `[from, to]` name pairs.
    #[serde(default)]
    pub edges: Vec<(String, String)>,
}

impl AssemblySpec {
    /// Parses the JSON form.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Renders the JSON form.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validates this description into an [`Assembly`].
    ///
    /// # Errors
    ///
    /// See [`AssemblyBuilder::build`].
    pub fn build(&self) -> Result<Assembly, StreamGraphError> {
        let mut builder = AssemblyBuilder::new();
        for step in &self.steps {
            let mut caps = Capabilities::NONE;
            for capability in &step.capabilities {
                caps = match capability {
                    Capability::Gate => caps.with_gate(),
                    Capability::Reducing => caps.with_reducing(),
                    Capability::Sink => caps.with_sink(),
                };
            }
            builder = if step.source {
                builder.source_with(&step.name, caps)
            } else {
                builder.step(&step.name, caps)
            };
        }
        for (from, to) in &self.edges {
            builder = builder.connect(from, to);
        }
        builder.build()
    }
}
