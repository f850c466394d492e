//! # `ductline` Core
//!
//! The stream-graph compiler for `ductline` pipelines.
//!
//! This crate provides:
//! - **Stream graph**: an arena-backed DAG of execution ducts with permanent
//!   entry/exit sentinels and deterministic topological ordering
//! - **Compiler**: synthesizes forks and grouping-window markers from each
//!   stage's structural context
//! - **Lifecycle**: bind, prepare (tail to head), cleanup (head to tail)
//! - **Assembly**: the immutable logical step graph a pipeline is built from
//!
//! ## Design Principles
//!
//! 1. **Closed variants** - every duct kind is matched exhaustively
//! 2. **Indices, not references** - ducts live in an arena keyed by `DuctId`
//! 3. **One graph per execution context** - assemblies are shared, graphs are not
//! 4. **Deterministic** - the same assembly always compiles to the same topology
//!
//! ## Example
//!
//! ```rust
//! use ductline_core::config::StreamGraphConfig;
//! use ductline_core::stream::{AssemblyBuilder, NoopHooks, PipelineDriver};
//!
//! let assembly = AssemblyBuilder::new()
//!     .source("lines")
//!     .sink("out")
//!     .connect("lines", "out")
//!     .build()?;
//!
//! let mut graph = assembly.instantiate(StreamGraphConfig::default())?;
//! let mut driver = PipelineDriver::new(&mut graph, NoopHooks);
//! driver.bind()?;
//! driver.prepare()?;
//! driver.cleanup()?;
//! # Ok::<(), ductline_core::Error>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod stream;

// Re-export key types
pub use config::StreamGraphConfig;
pub use stream::{Assembly, AssemblyBuilder, PipelineDriver, StreamGraph, StreamGraphError};

/// Result type for ductline-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ductline-core
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stream graph construction, compilation or lifecycle errors
    #[error("Stream graph error: {0}")]
    StreamGraph(#[from] StreamGraphError),

    /// Assembly description could not be parsed
    #[error("Assembly spec error: {0}")]
    AssemblySpec(#[from] serde_json::Error),

    /// Diagnostic output could not be written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
