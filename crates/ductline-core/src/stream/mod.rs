//! # Stream Graph Compiler
//!
//! Compiles a logical assembly (a DAG of named steps) into an executable
//! topology of ducts and drives it through its lifecycle.
//!
//! ## Overview
//!
//! - **`Duct`** / **`DuctKind`**: closed set of execution node variants
//! - **`StreamGraph`**: arena-backed topology with entry/exit sentinels and
//!   deterministic topological ordering
//! - **`StreamGraph::synthesize_next`**: inserts forks and window markers
//! - **`PipelineDriver`**: bind → prepare → run → cleanup state machine
//! - **`Assembly`** / **`AssemblyBuilder`**: immutable logical input, shared
//!   across execution contexts
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐ instantiate ┌─────────────┐  bind   ┌──────────────────┐
//! │   Assembly    │────────────▶│ StreamGraph │◀────────│  PipelineDriver  │
//! │ (shared, RO)  │  per context│ (arena)     │ prepare │ (borrows graph)  │
//! └───────────────┘             └─────────────┘ cleanup └──────────────────┘
//!                                      │
//!                          synthesize_next (Fork, OpenWindow,
//!                          OpenReducingWindow, CloseWindow)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ductline_core::stream::{Capabilities, DuctKind, NoopHooks, PipelineDriver, StepId, StreamGraph};
//!
//! let mut graph = StreamGraph::new();
//! let read = graph.add_stage(StepId(0), "read", Capabilities::NONE);
//! let group = graph.add_stage(StepId(1), "group", Capabilities::GATE);
//! let count = graph.add_stage(StepId(2), "count", Capabilities::REDUCING);
//! graph.add_head(read).unwrap();
//! graph.add_edge(read, group).unwrap();
//! graph.add_edge(group, count).unwrap();
//! graph.add_tail(count).unwrap();
//!
//! let mut driver = PipelineDriver::new(&mut graph, NoopHooks);
//! driver.bind().unwrap();
//!
//! let open = driver.graph().next_for(group).unwrap();
//! assert_eq!(
//!     driver.graph().duct(open).unwrap().kind,
//!     DuctKind::OpenReducingWindow { next: count }
//! );
//! ```

pub mod assembly;
mod compiler;
mod dot;
pub mod duct;
pub mod error;
pub mod graph;
pub mod lifecycle;


// Re-export key types
pub use assembly::{
    Assembly, AssemblyBuilder, AssemblySpec, Capability, FanOutBuilder, StepDecl, StepSpec,
};
pub use duct::{Branches, Capabilities, Duct, DuctId, DuctKind, Stage, StepId};
pub use error::{HookError, LifecyclePhase, LifecycleState, StreamGraphError};
pub use graph::{Edge, EdgeId, StreamGraph};
pub use lifecycle::{DuctHooks, NoopHooks, PipelineDriver};
