//! Graphviz rendering of a stream graph, used for failure diagnostics.

use std::fmt::Write as _;
use std::path::Path;

use super::duct::{Duct, DuctKind};
use super::graph::StreamGraph;

impl StreamGraph {
    /// Renders the graph in DOT format.
    ///
    /// Graph edges are solid, bound next references dashed, and the targets
    /// of synthesized markers and forks dotted. Output is deterministic for a
    /// given sequence of construction calls.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph StreamGraph {\n");

        for duct in self.all_ducts().chain(self.synthesized_ducts()) {
            let _ = writeln!(
                out,
                "  {} [label=\"{}\" shape={}];",
                duct.id.0,
                escape(&duct.label()),
                shape(duct)
            );
        }

        for edge in self.all_edges() {
            let _ = writeln!(out, "  {} -> {};", edge.source.0, edge.target.0);
        }

        let mut bound: Vec<_> = self.bound_next.iter().collect();
        bound.sort_by_key(|(id, _)| **id);
        for (id, next) in bound {
            let _ = writeln!(out, "  {} -> {} [style=dashed];", id.0, next.0);
        }

        for duct in self.synthesized_ducts() {
            for target in duct.intrinsic_targets() {
                let _ = writeln!(out, "  {} -> {} [style=dotted];", duct.id.0, target.0);
            }
        }

        out.push_str("}\n");
        out
    }

    /// Writes the DOT rendering to `path`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing the file.
    pub fn print_graph(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        tracing::info!("writing stream graph to {}", path.display());
        std::fs::write(path, self.to_dot())
    }

    /// Best-effort dump to the configured error path. Failures are logged
    /// and swallowed so the original error reaches the caller.
    pub(crate) fn dump_on_error(&self) {
        let Some(path) = self.config().error_dot_file.as_ref() else {
            return;
        };
        if let Err(err) = self.print_graph(path) {
            tracing::warn!("failed writing stream graph to {}: {err}", path.display());
        }
    }
}

fn shape(duct: &Duct) -> &'static str {
    match &duct.kind {
        DuctKind::Entry | DuctKind::Exit => "point",
        DuctKind::Stage(stage) if stage.capabilities.gate => "diamond",
        DuctKind::Stage(_) => "box",
        DuctKind::Fork { .. } => "triangle",
        DuctKind::OpenWindow { .. }
        | DuctKind::OpenReducingWindow { .. }
        | DuctKind::CloseWindow { .. } => "ellipse",
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
