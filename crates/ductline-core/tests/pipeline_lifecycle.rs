//! End-to-end tests: JSON assembly → instantiated graph → lifecycle.

use std::collections::HashMap;

use ductline_core::config::{StreamGraphConfig, ERROR_DOT_FILE_PROPERTY};
use ductline_core::stream::{
    AssemblySpec, Duct, DuctHooks, DuctKind, HookError, LifecycleState, PipelineDriver,
    StreamGraph, StreamGraphError,
};

const WORD_COUNT: &str = r#"{
    "steps": [
        { "name": "lines", "source": true },
        { "name": "tokenize" },
        { "name": "by_word", "capabilities": ["gate"] },
        { "name": "count", "capabilities": ["reducing"] },
        { "name": "counts", "capabilities": ["sink"] },
        { "name": "trace", "capabilities": ["sink"] }
    ],
    "edges": [
        ["lines", "tokenize"],
        ["tokenize", "by_word"],
        ["by_word", "count"],
        ["count", "counts"],
        ["count", "trace"]
    ]
}"#;

/// Counts resources held; prepare acquires, cleanup releases.
#[derive(Default)]
struct ResourceTracker {
    open: Vec<String>,
    max_open: usize,
}

impl DuctHooks for ResourceTracker {
    fn prepare(&mut self, duct: &Duct, _graph: &StreamGraph) -> Result<(), HookError> {
        self.open.push(duct.label());
        self.max_open = self.max_open.max(self.open.len());
        Ok(())
    }

    fn cleanup(&mut self, duct: &Duct, _graph: &StreamGraph) -> Result<(), HookError> {
        let label = duct.label();
        let Some(pos) = self.open.iter().position(|l| *l == label) else {
            return Err(HookError::new(format!("{label} was never prepared")));
        };
        self.open.remove(pos);
        Ok(())
    }
}

#[test]
fn test_word_count_full_lifecycle() {
    let assembly = AssemblySpec::from_json(WORD_COUNT).unwrap().build().unwrap();
    let mut graph = assembly.instantiate(StreamGraphConfig::default()).unwrap();

    let mut tracker = ResourceTracker::default();
    let mut driver = PipelineDriver::new(&mut graph, &mut tracker);
    driver.bind().unwrap();
    driver.prepare().unwrap();
    let heads = driver.start().unwrap();
    driver.cleanup().unwrap();
    assert_eq!(driver.state(), LifecycleState::CleanedUp);

    let graph = driver.graph();
    assert_eq!(heads, vec![graph.find_stage("lines").unwrap()]);

    let by_word = graph.find_stage("by_word").unwrap();
    let count = graph.find_stage("count").unwrap();
    let open = graph.next_for(by_word).unwrap();
    assert_eq!(
        graph.duct(open).unwrap().kind,
        DuctKind::OpenReducingWindow { next: count }
    );

    let close = graph.next_for(count).unwrap();
    let DuctKind::CloseWindow { next: fork } = graph.duct(close).unwrap().kind.clone() else {
        panic!("count should close its window");
    };
    let fork = graph.duct(fork).unwrap();
    assert!(fork.is_fork());
    assert_eq!(fork.intrinsic_targets().len(), 2);

    assert!(tracker.open.is_empty());
    assert_eq!(tracker.max_open, 6);
}

#[test]
fn test_failed_bind_dumps_to_configured_property() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stream-graph.dot");
    let mut props = HashMap::new();
    props.insert(
        ERROR_DOT_FILE_PROPERTY.to_string(),
        path.display().to_string(),
    );
    let config = StreamGraphConfig::from_properties(&props);

    // Built by hand: an ordinary stage bound straight into the exit.
    let mut graph = StreamGraph::with_config(config);
    let only = graph.add_stage(
        ductline_core::stream::StepId(0),
        "only",
        ductline_core::stream::Capabilities::NONE,
    );
    graph.add_head(only).unwrap();
    graph.add_tail(only).unwrap();

    let mut driver = PipelineDriver::new(&mut graph, ductline_core::stream::NoopHooks);
    let err = driver.bind().unwrap_err();
    assert!(matches!(err, StreamGraphError::MalformedTopology(_)));
    assert!(err.to_string().contains("tail ducts should not bind to next"));

    let dump = std::fs::read_to_string(&path).unwrap();
    assert!(dump.starts_with("digraph StreamGraph {"));
    assert!(dump.contains("label=\"only\""));
}

#[test]
fn test_no_dump_without_configured_path() {
    let dir = tempfile::tempdir().unwrap();
    let mut graph = StreamGraph::new();
    assert!(graph.add_path(None, None).is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_crate_error_wraps_sources() {
    fn load(json: &str) -> ductline_core::Result<StreamGraph> {
        let spec = AssemblySpec::from_json(json)?;
        let assembly = spec.build()?;
        Ok(assembly.instantiate(StreamGraphConfig::default())?)
    }

    assert!(load(WORD_COUNT).is_ok());
    assert!(matches!(
        load("{ not json"),
        Err(ductline_core::Error::AssemblySpec(_))
    ));
    assert!(matches!(
        load(r#"{ "steps": [] }"#),
        Err(ductline_core::Error::StreamGraph(
            StreamGraphError::MalformedTopology(_)
        ))
    ));
}
